//! Assembles transfer, multisig-transfer and script-transfer transactions from
//! wallet UTXO state, per the common skeleton all three strategies share.

use std::str::FromStr;

use rand::Rng;

use crate::fixed64::Fixed64;
use crate::hash::{Hash168, Hash256};
use crate::script;
use crate::wallet::{coin_selector, AddressType, Wallet};

use super::contract::{self, ContractContext};
use super::txbuilder_error::{ErrorKind, TxBuilderError, TxBuilderResult};
use super::{AttributeUsage, Payload, Program, SEQUENCE_TIMELOCK_SPEND, Transaction, TxAttribute, TxOutput, TxType};

pub struct TxBuilder<'a> {
    pub wallet: &'a Wallet,
    pub asset_id: Hash256,
    pub best_height: u32,
}

impl<'a> TxBuilder<'a> {
    pub fn new(wallet: &'a Wallet, asset_id: Hash256, best_height: u32) -> Self {
        TxBuilder {
            wallet,
            asset_id,
            best_height,
        }
    }

    /// Single-sig transfer: draws from every owned single-sig coin, change
    /// returns to the wallet's default account. `output_lock` sets the height
    /// below which the new outputs (not the change output) are unspendable —
    /// the `utxolock` parameter `sendtransaction`/`sendbatchouttransaction`
    /// accept.
    pub fn build_transfer(&self, fee: &str, outputs: &[(&str, &str)], output_lock: u32) -> TxBuilderResult<Transaction> {
        let change = self.wallet.get_default_account().ok_or_else(|| Box::new(ErrorKind::NoLocalSigner))?;
        self.build_and_sign(fee, outputs, None, change, true, output_lock)
    }

    /// Multisig transfer: coins must belong to `from`; change returns to `from`
    /// (funds stay under the same multisig). May produce a partially-signed
    /// transaction if this wallet doesn't hold every required signer.
    pub fn build_multisig_transfer(&self, from: Hash168, fee: &str, outputs: &[(&str, &str)]) -> TxBuilderResult<Transaction> {
        self.build_and_sign(fee, outputs, Some(from), from, false, 0)
    }

    /// Script transfer (deposit/withdraw/deposit-to-side): built like a multisig
    /// transfer, then the programs array is overwritten with a single manually
    /// constructed program whose code is `redeem_script` and whose parameter is
    /// the fixed zero-byte selector.
    pub fn build_script_transfer(
        &self,
        from: Hash168,
        fee: &str,
        outputs: &[(&str, &str)],
        redeem_script: Vec<u8>,
    ) -> TxBuilderResult<Transaction> {
        let mut tx = self.build_common(fee, outputs, Some(from), from, false, 0)?;
        tx.programs = vec![Program {
            code: redeem_script,
            parameter: vec![0u8],
        }];
        Ok(tx)
    }

    fn build_and_sign(
        &self,
        fee: &str,
        outputs: &[(&str, &str)],
        from_filter: Option<Hash168>,
        change: Hash168,
        set_lock_time: bool,
        output_lock: u32,
    ) -> TxBuilderResult<Transaction> {
        let mut tx = self.build_common(fee, outputs, from_filter, change, set_lock_time, output_lock)?;
        let required_hashes = self.distinct_input_program_hashes(&tx, from_filter);

        let mut ctx = ContractContext::new(&tx, required_hashes.clone(), self.wallet);
        for hash in &required_hashes {
            ctx.sign_with(self.wallet, hash)?;
        }

        // All required signatures present: attach the final programs. Otherwise
        // attach the redeem script plus whatever partial signatures this wallet
        // could contribute — `sign_multisig_transaction`/`complete_multisig_programs`
        // read these back out of the serialized transaction to add the next
        // signer's contribution (spec.md §4.3 step 7).
        tx.programs = match ctx.is_completed() {
            true => ctx.into_programs().expect("checked completed"),
            false => ctx.into_uncompleted_programs(),
        };

        Ok(tx)
    }

    /// `signmultisigntransaction`: completes whichever of a partially-signed
    /// transaction's programs this wallet holds a matching signer for, reading
    /// each program's own embedded redeem script (`parseTransactionCode`) rather
    /// than resolving program hashes through prior outputs. Returns the
    /// transaction unchanged if every program is already complete, and fails with
    /// `NoLocalSigner` if nothing could be advanced and something still needs a
    /// signature.
    pub fn sign_multisig_transaction(&self, mut tx: Transaction) -> TxBuilderResult<Transaction> {
        let changed = contract::complete_multisig_programs(self.wallet, &mut tx)
            .map_err(|_| Box::new(ErrorKind::NoLocalSigner) as TxBuilderError)?;

        let still_incomplete = tx.programs.iter().any(|p| match contract::parse_multisig_script(&p.code) {
            Some((m, _)) => script::parse_pushes(&p.parameter).map(|s| s.len()).unwrap_or(0) < m as usize,
            None => false,
        });

        if still_incomplete && !changed {
            return Err(Box::new(ErrorKind::NoLocalSigner));
        }

        Ok(tx)
    }

    /// The distinct program hashes the selected inputs require a signature for.
    /// For single-sig transfers this can span multiple owned accounts; for
    /// multisig/script transfers it is always the single `from` hash.
    fn distinct_input_program_hashes(&self, tx: &Transaction, from_filter: Option<Hash168>) -> Vec<Hash168> {
        if let Some(from) = from_filter {
            return vec![from];
        }

        let coins = self.wallet.get_coins();
        let mut hashes = Vec::new();
        for input in &tx.utxo_inputs {
            if let Some(coin) = coins.get(input) {
                if !hashes.contains(&coin.output.program_hash) {
                    hashes.push(coin.output.program_hash);
                }
            }
        }
        hashes
    }

    fn build_common(
        &self,
        fee: &str,
        outputs_req: &[(&str, &str)],
        from_filter: Option<Hash168>,
        change: Hash168,
        set_lock_time: bool,
        output_lock: u32,
    ) -> TxBuilderResult<Transaction> {
        if outputs_req.is_empty() {
            return Err(Box::new(ErrorKind::NilOutputs));
        }

        let fee: Fixed64 = fee.parse().map_err(|_| Box::new(ErrorKind::InvalidFee) as TxBuilderError)?;
        if !fee.is_positive() {
            return Err(Box::new(ErrorKind::InvalidFee));
        }

        let mut outputs = Vec::with_capacity(outputs_req.len());
        let mut expected = fee;
        for (addr, value) in outputs_req {
            let value: Fixed64 = value.parse().map_err(|_| Box::new(ErrorKind::InvalidFee) as TxBuilderError)?;
            let program_hash =
                Hash168::from_str(addr).map_err(|_| Box::new(ErrorKind::InvalidAddress((*addr).to_owned())) as TxBuilderError)?;
            expected = expected.checked_add(value).ok_or_else(|| Box::new(ErrorKind::InvalidFee))?;
            outputs.push(TxOutput {
                asset_id: self.asset_id,
                value,
                program_hash,
                output_lock,
            });
        }

        let addr_type = if from_filter.is_some() { AddressType::MultiSign } else { AddressType::SingleSign };
        let coins = self.wallet.get_coins();
        let sorted = coin_selector::select(&coins, addr_type, self.best_height);

        let mut inputs = Vec::new();
        for (mut input, coin) in sorted {
            if coin.output.asset_id != self.asset_id {
                continue;
            }
            if let Some(from) = from_filter {
                if coin.output.program_hash != from {
                    continue;
                }
            }
            if coin.output.output_lock > 0 && self.best_height < coin.output.output_lock {
                continue; // not yet unlockable
            }
            if coin.output.output_lock > 0 {
                input.sequence = SEQUENCE_TIMELOCK_SPEND;
            }
            inputs.push(input);

            let value = coin.output.value;
            if value.raw() > expected.raw() {
                outputs.push(TxOutput {
                    asset_id: self.asset_id,
                    value: value.checked_sub(expected).expect("checked above"),
                    program_hash: change,
                    output_lock: 0,
                });
                expected = Fixed64::ZERO;
                break;
            } else if value.raw() == expected.raw() {
                expected = Fixed64::ZERO;
                break;
            } else {
                expected = expected.checked_sub(value).expect("value < expected");
            }
        }

        if expected.raw() > 0 {
            return Err(Box::new(ErrorKind::InsufficientFunds));
        }

        let nonce: u64 = rand::thread_rng().gen::<u64>() & 0x7FFF_FFFF_FFFF_FFFF;
        let attributes = vec![TxAttribute {
            usage: AttributeUsage::Nonce,
            data: nonce.to_le_bytes().to_vec(),
        }];

        Ok(Transaction {
            tx_type: TxType::TransferAsset,
            payload_version: 0,
            payload: Payload::TransferAsset,
            attributes,
            utxo_inputs: inputs,
            balance_inputs: Vec::new(),
            outputs,
            programs: Vec::new(),
            lock_time: if set_lock_time { self.best_height } else { 0 },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tx::{UtxoInput, SEQUENCE_DEFAULT};
    use crate::wallet::Coin;

    fn deposit_coin(wallet: &Wallet, program_hash: Hash168, value: i64, idx: u16) {
        wallet.add_coin(
            UtxoInput {
                refer_tx_hash: Hash256::sha256d(&idx.to_le_bytes()),
                output_index: idx,
                sequence: SEQUENCE_DEFAULT,
            },
            Coin {
                output: TxOutput {
                    asset_id: Hash256::ZERO,
                    value: Fixed64::from_raw(value),
                    program_hash,
                    output_lock: 0,
                },
                height: 0,
                address_type: AddressType::SingleSign,
            },
        );
    }

    #[test]
    fn transfer_selects_ascending_and_produces_change() {
        let wallet = Wallet::new();
        let owner = wallet.create_account().unwrap();
        deposit_coin(&wallet, owner, 30_000_000, 0);
        deposit_coin(&wallet, owner, 70_000_000, 1);
        deposit_coin(&wallet, owner, 150_000_000, 2);

        let to_account = Wallet::new().create_account().unwrap();
        let builder = TxBuilder::new(&wallet, Hash256::ZERO, 0);
        let tx = builder
            .build_transfer("0.01", &[(&to_account.to_address(), "1.0")], 0)
            .unwrap();

        // inputs sum to outputs + fee exactly
        let coins = wallet.get_coins();
        let input_sum: i64 = tx.utxo_inputs.iter().map(|i| coins.get(i).unwrap().output.value.raw()).sum();
        let output_sum: i64 = tx.outputs.iter().map(|o| o.value.raw()).sum();
        assert_eq!(input_sum, output_sum + 1_000_000);
        assert_eq!(tx.outputs.len(), 2); // payment + change
        assert!(!tx.programs.is_empty());
    }

    #[test]
    fn insufficient_funds_is_reported() {
        let wallet = Wallet::new();
        let owner = wallet.create_account().unwrap();
        deposit_coin(&wallet, owner, 50_000_000, 0);

        let to_account = Wallet::new().create_account().unwrap();
        let builder = TxBuilder::new(&wallet, Hash256::ZERO, 0);
        let err = builder
            .build_transfer("0.01", &[(&to_account.to_address(), "1.0")], 0)
            .unwrap_err();
        assert!(matches!(*err, ErrorKind::InsufficientFunds));
    }

    #[test]
    fn timelocked_coin_is_skipped_until_mature_and_flagged_when_spent() {
        let wallet = Wallet::new();
        let owner = wallet.create_account().unwrap();
        wallet.add_coin(
            UtxoInput {
                refer_tx_hash: Hash256::sha256d(b"locked"),
                output_index: 0,
                sequence: SEQUENCE_DEFAULT,
            },
            Coin {
                output: TxOutput {
                    asset_id: Hash256::ZERO,
                    value: Fixed64::from_raw(200_000_000),
                    program_hash: owner,
                    output_lock: 100,
                },
                height: 0,
                address_type: AddressType::SingleSign,
            },
        );

        let to_account = Wallet::new().create_account().unwrap();
        let builder_before = TxBuilder::new(&wallet, Hash256::ZERO, 50);
        assert!(matches!(
            *builder_before.build_transfer("0.01", &[(&to_account.to_address(), "1.0")], 0).unwrap_err(),
            ErrorKind::InsufficientFunds
        ));

        let builder_after = TxBuilder::new(&wallet, Hash256::ZERO, 150);
        let tx = builder_after.build_transfer("0.01", &[(&to_account.to_address(), "1.0")], 0).unwrap();
        assert_eq!(tx.utxo_inputs[0].sequence, SEQUENCE_TIMELOCK_SPEND);
    }
}
