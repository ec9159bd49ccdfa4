use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A fixed-point amount in units of 10^-8, the way ELA (and Bitcoin-derived chains
/// generally) represent balances without floating point.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Fixed64(i64);

pub const SCALE: i64 = 100_000_000;

#[derive(Debug)]
pub struct ParseFixed64Error;

impl fmt::Display for ParseFixed64Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid decimal amount")
    }
}

impl std::error::Error for ParseFixed64Error {}

impl Fixed64 {
    pub const ZERO: Fixed64 = Fixed64(0);

    pub fn from_raw(raw: i64) -> Self {
        Fixed64(raw)
    }

    pub fn raw(&self) -> i64 {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn checked_add(self, other: Fixed64) -> Option<Fixed64> {
        self.0.checked_add(other.0).map(Fixed64)
    }

    pub fn checked_sub(self, other: Fixed64) -> Option<Fixed64> {
        self.0.checked_sub(other.0).map(Fixed64)
    }
}

impl Add for Fixed64 {
    type Output = Fixed64;

    fn add(self, rhs: Fixed64) -> Fixed64 {
        Fixed64(self.0 + rhs.0)
    }
}

impl Sub for Fixed64 {
    type Output = Fixed64;

    fn sub(self, rhs: Fixed64) -> Fixed64 {
        Fixed64(self.0 - rhs.0)
    }
}

impl FromStr for Fixed64 {
    type Err = ParseFixed64Error;

    /// Parses a decimal string with up to 8 fractional digits, e.g. "1.5", "0.00000001", "12".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ParseFixed64Error);
        }

        let (sign, unsigned) = match s.strip_prefix('-') {
            Some(rest) => (-1_i64, rest),
            None => (1_i64, s),
        };

        let mut parts = unsigned.splitn(2, '.');
        let int_part = parts.next().unwrap_or("0");
        let frac_part = parts.next().unwrap_or("");

        if frac_part.len() > 8 || !int_part.chars().all(|c| c.is_ascii_digit()) {
            return Err(ParseFixed64Error);
        }
        if !frac_part.chars().all(|c| c.is_ascii_digit()) {
            return Err(ParseFixed64Error);
        }

        let int_val: i64 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| ParseFixed64Error)?
        };

        let mut frac_str = frac_part.to_owned();
        while frac_str.len() < 8 {
            frac_str.push('0');
        }
        let frac_val: i64 = if frac_str.is_empty() {
            0
        } else {
            frac_str.parse().map_err(|_| ParseFixed64Error)?
        };

        let raw = int_val
            .checked_mul(SCALE)
            .and_then(|v| v.checked_add(frac_val))
            .ok_or(ParseFixed64Error)?;

        Ok(Fixed64(sign * raw))
    }
}

impl fmt::Display for Fixed64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let neg = self.0 < 0;
        let abs = self.0.unsigned_abs();
        let int_part = abs / (SCALE as u64);
        let frac_part = abs % (SCALE as u64);

        if neg {
            write!(f, "-")?;
        }

        if frac_part == 0 {
            write!(f, "{}", int_part)
        } else {
            let frac_str = format!("{:08}", frac_part);
            let trimmed = frac_str.trim_end_matches('0');
            write!(f, "{}.{}", int_part, trimmed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_decimal_strings() {
        for s in ["0", "1", "1.5", "0.00000001", "1000.00000001", "-2.3"] {
            let parsed: Fixed64 = s.parse().unwrap();
            assert_eq!(parsed.to_string(), s);
        }
    }

    #[test]
    fn rejects_too_many_fractional_digits() {
        assert!("1.123456789".parse::<Fixed64>().is_err());
    }

    #[test]
    fn rejects_garbage() {
        assert!("".parse::<Fixed64>().is_err());
        assert!("abc".parse::<Fixed64>().is_err());
    }

    #[test]
    fn arithmetic_is_exact() {
        let a: Fixed64 = "1.0".parse().unwrap();
        let b: Fixed64 = "0.3".parse().unwrap();
        let c = a.checked_sub(b).unwrap();
        assert_eq!(c.to_string(), "0.7");
    }
}
