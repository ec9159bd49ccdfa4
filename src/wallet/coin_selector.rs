//! Sorts available coins into the order `TxBuilder` walks to cover a target value.

use std::collections::HashMap;

use super::{AddressType, Coin};
use crate::tx::UtxoInput;

/// Produces `(input, coin)` pairs for coins that are mature and of the requested
/// address type, sorted ascending by output value (spend minor coins first — a
/// dust-consolidating strategy traded off against larger resulting transactions).
/// Ties fall back to map iteration order, which callers must not depend on.
pub fn select(
    coins: &HashMap<UtxoInput, Coin>,
    addr_type: AddressType,
    best_height: u32,
) -> Vec<(UtxoInput, Coin)> {
    let mut eligible: Vec<(UtxoInput, Coin)> = coins
        .iter()
        .filter(|(_, coin)| coin.address_type == addr_type && coin.is_mature(best_height))
        .map(|(input, coin)| (*input, coin.clone()))
        .collect();

    eligible.sort_by(|a, b| a.1.output.value.cmp(&b.1.output.value));
    eligible
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed64::Fixed64;
    use crate::hash::{Hash168, Hash256};
    use crate::tx::TxOutput;

    fn coin(value: i64, height: u32, addr_type: AddressType) -> Coin {
        Coin {
            output: TxOutput {
                asset_id: Hash256::ZERO,
                value: Fixed64::from_raw(value),
                program_hash: Hash168::new(0x21, b"addr"),
                output_lock: 0,
            },
            height,
            address_type: addr_type,
        }
    }

    fn input(n: u16) -> UtxoInput {
        UtxoInput {
            refer_tx_hash: Hash256::sha256d(&n.to_le_bytes()),
            output_index: n,
            sequence: crate::tx::SEQUENCE_DEFAULT,
        }
    }

    #[test]
    fn sorts_ascending_by_value() {
        let mut coins = HashMap::new();
        coins.insert(input(0), coin(150_000_000, 0, AddressType::SingleSign));
        coins.insert(input(1), coin(30_000_000, 0, AddressType::SingleSign));
        coins.insert(input(2), coin(70_000_000, 0, AddressType::SingleSign));

        let sorted = select(&coins, AddressType::SingleSign, 0);
        let values: Vec<i64> = sorted.iter().map(|(_, c)| c.output.value.raw()).collect();
        assert_eq!(values, vec![30_000_000, 70_000_000, 150_000_000]);
    }

    #[test]
    fn excludes_immature_and_wrong_type() {
        let mut coins = HashMap::new();
        coins.insert(input(0), coin(10, 100, AddressType::SingleSign)); // immature
        coins.insert(input(1), coin(20, 0, AddressType::MultiSign)); // wrong type
        coins.insert(input(2), coin(30, 0, AddressType::SingleSign)); // eligible

        let sorted = select(&coins, AddressType::SingleSign, 50);
        assert_eq!(sorted.len(), 1);
        assert_eq!(sorted[0].1.output.value.raw(), 30);
    }
}
