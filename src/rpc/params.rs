//! Strict, positional, type-asserted parameter parsing, mirroring the
//! `switch params[i].(type)` chains in the original interface layer: each
//! parameter has a required dynamic type, and a missing index or a type
//! mismatch both fail closed rather than falling back to a default.

use serde_json::Value;

use super::error::RpcError;

pub fn required(params: &[Value], index: usize) -> Result<&Value, RpcError> {
    params.get(index).ok_or(RpcError::Nil)
}

pub fn as_string(params: &[Value], index: usize) -> Result<String, RpcError> {
    match required(params, index)? {
        Value::String(s) => Ok(s.clone()),
        _ => Err(RpcError::InvalidParameter),
    }
}

pub fn as_f64(params: &[Value], index: usize) -> Result<f64, RpcError> {
    match required(params, index)? {
        Value::Number(n) => n.as_f64().ok_or(RpcError::InvalidParameter),
        _ => Err(RpcError::InvalidParameter),
    }
}

pub fn as_u32(params: &[Value], index: usize) -> Result<u32, RpcError> {
    let v = as_f64(params, index)?;
    if v < 0.0 || v > u32::MAX as f64 {
        return Err(RpcError::InvalidParameter);
    }
    Ok(v as u32)
}

pub fn as_bool(params: &[Value], index: usize) -> Result<bool, RpcError> {
    match required(params, index)? {
        Value::Bool(b) => Ok(*b),
        _ => Err(RpcError::InvalidParameter),
    }
}

pub fn as_array(params: &[Value], index: usize) -> Result<Vec<Value>, RpcError> {
    match required(params, index)? {
        Value::Array(a) => Ok(a.clone()),
        _ => Err(RpcError::InvalidParameter),
    }
}

/// One `(address, value)` pair in a `sendbatchouttransaction`-style `outs` array.
pub fn as_batch_out(item: &Value) -> Result<(String, String), RpcError> {
    let address = item.get("address").or_else(|| item.get("Address")).and_then(Value::as_str);
    let value = item.get("value").or_else(|| item.get("Value")).and_then(Value::as_str);
    match (address, value) {
        (Some(a), Some(v)) => Ok((a.to_owned(), v.to_owned())),
        _ => Err(RpcError::InvalidParameter),
    }
}

pub fn as_batch_outs(params: &[Value], index: usize) -> Result<Vec<(String, String)>, RpcError> {
    as_array(params, index)?.iter().map(as_batch_out).collect()
}
