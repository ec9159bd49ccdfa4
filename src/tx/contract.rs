//! Redeem-script factories and the multi-party signing accumulator.
//!
//! The timelocked and two-key factories below (`create_unlock_script_redeem_script`
//! and friends) resolve an interpretive gap in the source material: the original
//! only names these factories and their call sites, not the exact opcode shape.
//! The chosen shapes — see DESIGN.md — pair each "unlock" variant with a
//! hash-preimage/timelock branch and each plain withdraw/deposit variant with a
//! signature check, which is the simplest script satisfying the documented call
//! signatures (a commitment hash, one or two pubkeys, a fixed timelock).

use crate::hash::{Hash168, Hash256, PREFIX_SCRIPT, PREFIX_SINGLE_SIG};
use crate::script::crypto::{Crypto, EcdsaCrypto};
use crate::script::{self, Program, OP_1, OP_16, OP_CHECKMULTISIG};
use crate::wallet::{AddressType, Contract, Wallet, WalletResult};

use super::Transaction;

pub const UNLOCK_TIMELOCK_BLOCKS: u32 = 100;
pub const WITHDRAW_TIMELOCK_BLOCKS: u32 = 1000;

/// `<pubkey> CHECKSIG` — the plain single-signature redeem script.
pub fn create_signature_redeem_script(pubkey: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    script::push_data(&mut out, pubkey);
    out.push(script::OP_CHECKSIG);
    out
}

/// `OP_m <pubkeys...> OP_n CHECKMULTISIG`.
pub fn create_multisig_redeem_script(m: u8, pubkeys: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    script::push_int(&mut out, m);
    for key in pubkeys {
        script::push_data(&mut out, key);
    }
    script::push_int(&mut out, pubkeys.len() as u8);
    out.push(script::OP_CHECKMULTISIG);
    out
}

/// `IF <commitment> HASH256 EQUALVERIFY <pubkey> CHECKSIG ELSE <lock> CHECKHEIGHT
/// VERIFY <pubkey> CHECKSIG ENDIF`. Selector `0x00` (the zero-byte parameter
/// `TxBuilder` always supplies for script-transfer outputs) takes the `ELSE`
/// branch: spendable once the chain reaches `lock`, under the same key.
fn timelock_redeem_script(commitment: &Hash256, pubkey: &[u8], lock: u32) -> Vec<u8> {
    let mut out = Vec::new();
    out.push(script::OP_IF);
    script::push_data(&mut out, &commitment.0);
    out.push(script::OP_HASH256);
    out.push(script::OP_EQUALVERIFY);
    script::push_data(&mut out, pubkey);
    out.push(script::OP_CHECKSIG);
    out.push(script::OP_ELSE);
    let mut lock_bytes = lock.to_le_bytes().to_vec();
    while lock_bytes.last() == Some(&0) && lock_bytes.len() > 1 {
        lock_bytes.pop();
    }
    script::push_data(&mut out, &lock_bytes);
    out.push(script::OP_CHECKHEIGHT);
    out.push(script::OP_VERIFY);
    script::push_data(&mut out, pubkey);
    out.push(script::OP_CHECKSIG);
    out.push(script::OP_ENDIF);
    out
}

/// Used by `depositunlocktransaction`: claim a deposit commitment after 100 blocks.
pub fn create_unlock_script_redeem_script(commitment: &Hash256, pubkey: &[u8]) -> Vec<u8> {
    timelock_redeem_script(commitment, pubkey, UNLOCK_TIMELOCK_BLOCKS)
}

/// Used by `withdrawunlocktransaction`: claim a withdraw commitment after 1000 blocks.
pub fn create_withdraw_unlock_script_redeem_script(commitment: &Hash256, pubkey: &[u8]) -> Vec<u8> {
    timelock_redeem_script(commitment, pubkey, WITHDRAW_TIMELOCK_BLOCKS)
}

/// Used by `withdrawtransaction`: a 2-of-2 script requiring both the owner and
/// the cross-chain arbitration key to sign.
pub fn create_withdraw_script_redeem_script(pubkey_owner: &[u8], pubkey_arbiter: &[u8]) -> Vec<u8> {
    create_multisig_redeem_script(2, &[pubkey_owner.to_vec(), pubkey_arbiter.to_vec()])
}

/// Used by `deposittransaction`/`deposittosidetransaction`: a plain single-key
/// script — depositing to the side chain needs no cross-chain cosigner.
pub fn create_deposit_script_redeem_script(pubkey: &[u8]) -> Vec<u8> {
    create_signature_redeem_script(pubkey)
}

/// Parses a multisig redeem script's embedded threshold and pubkey list directly
/// from its opcodes — `parseTransactionCode` in the original, used by multisig
/// completion to discover which signers a partially-signed program still needs
/// without any external UTXO lookup.
pub fn parse_multisig_script(code: &[u8]) -> Option<(u8, Vec<Vec<u8>>)> {
    let m = small_int(*code.first()?)?;
    let mut pc = 1;
    let mut pubkeys = Vec::new();
    loop {
        let op = *code.get(pc)?;
        if let Some(n) = small_int(op) {
            if code.get(pc + 1) != Some(&OP_CHECKMULTISIG) {
                return None;
            }
            return if n as usize == pubkeys.len() { Some((m, pubkeys)) } else { None };
        }
        let (item, next) = script::read_push(code, pc).ok()?;
        pubkeys.push(item);
        pc = next;
    }
}

fn small_int(op: u8) -> Option<u8> {
    if (OP_1..=OP_16).contains(&op) {
        Some(op - OP_1 + 1)
    } else {
        None
    }
}

/// Assigns each of `sigs` to the lowest-index not-yet-claimed key in `pubkeys`
/// it verifies under — the same greedy left-to-right assignment
/// `crypto::check_multisig` (`src/script/crypto.rs`) makes when verifying, so
/// the result reflects which key index each already-collected signature
/// actually belongs to rather than just its position in the parameter.
fn order_signatures_by_key_index(
    pubkeys: &[Vec<u8>],
    crypto: &dyn Crypto,
    hash: &Hash256,
    sigs: &[Vec<u8>],
) -> Vec<(usize, Vec<u8>)> {
    let mut used = vec![false; pubkeys.len()];
    let mut out = Vec::with_capacity(sigs.len());
    for sig in sigs {
        for (index, pubkey) in pubkeys.iter().enumerate() {
            if !used[index] && crypto.check_sig(pubkey, hash, sig) {
                used[index] = true;
                out.push((index, sig.clone()));
                break;
            }
        }
    }
    out
}

/// Completes whichever of `tx`'s programs this wallet can contribute a missing
/// signature to, reading each program's own embedded redeem script rather than
/// any externally-resolved program hash — mirrors `parseTransactionCode` +
/// `parseTransactionSig` + `AppendNewSignature` in the original. Programs that
/// aren't multisig scripts (single-sig, script-locked) are left untouched.
/// Returns whether any program was changed.
///
/// The new signature is spliced into the parameter in key order, not appended:
/// `crypto::check_multisig` consumes pubkeys strictly left to right, so a
/// parameter whose signatures aren't in ascending key-index order fails
/// verification even when every individual signature is valid.
pub fn complete_multisig_programs(wallet: &Wallet, tx: &mut Transaction) -> WalletResult<bool> {
    let hash = tx.signable_hash();
    let crypto = EcdsaCrypto;
    let mut changed = false;

    for program in &mut tx.programs {
        let (m, pubkeys) = match parse_multisig_script(&program.code) {
            Some(v) => v,
            None => continue,
        };

        let existing = script::parse_pushes(&program.parameter).unwrap_or_default();
        if existing.len() >= m as usize {
            continue;
        }

        let pubkey_index = match wallet.find_owned_pubkey(&pubkeys) {
            Some(i) => i,
            None => continue,
        };
        let pubkey = &pubkeys[pubkey_index];

        let mut ordered = order_signatures_by_key_index(&pubkeys, &crypto, &hash, &existing);
        if ordered.iter().any(|(index, _)| *index == pubkey_index) {
            continue; // this signer already contributed
        }

        let sig = match wallet.sign_by_pubkey(pubkey, &hash) {
            Some(result) => result?,
            None => continue,
        };

        ordered.push((pubkey_index, sig));
        ordered.sort_by_key(|(index, _)| *index);

        let mut parameter = Vec::new();
        for (_, sig) in &ordered {
            script::push_data(&mut parameter, sig);
        }
        program.parameter = parameter;
        changed = true;
    }

    Ok(changed)
}

/// Accumulates signatures for a transaction's distinct required program hashes.
/// Grounded on the original's `contract.NewContractContext`/`ctx.IsCompleted()`/
/// `ctx.GetUncompletedPrograms()`, generalized into an explicit accumulator object
/// rather than a mutable in-place transaction patch.
pub struct ContractContext<'a> {
    tx: &'a Transaction,
    program_hashes: Vec<Hash168>,
    contracts: Vec<Option<Contract>>,
    signed: Vec<Vec<(usize, Vec<u8>)>>,
}

impl<'a> ContractContext<'a> {
    pub fn new(tx: &'a Transaction, program_hashes: Vec<Hash168>, wallet: &Wallet) -> Self {
        let contracts = program_hashes.iter().map(|h| wallet.get_contract(h)).collect();
        let n = program_hashes.len();
        ContractContext {
            tx,
            program_hashes,
            contracts,
            signed: vec![Vec::new(); n],
        }
    }

    pub fn is_completed(&self) -> bool {
        (0..self.program_hashes.len()).all(|i| self.threshold_met(i))
    }

    pub fn get_uncompleted_program_hashes(&self) -> Vec<Hash168> {
        self.program_hashes
            .iter()
            .enumerate()
            .filter(|(i, _)| !self.threshold_met(*i))
            .map(|(_, h)| *h)
            .collect()
    }

    fn threshold(&self, index: usize) -> usize {
        match &self.contracts[index] {
            Some(Contract {
                address_type: AddressType::MultiSign,
                owner_pubkeys,
                ..
            }) => multisig_threshold(owner_pubkeys.len()),
            _ => 1,
        }
    }

    fn threshold_met(&self, index: usize) -> bool {
        self.signed[index].len() >= self.threshold(index)
    }

    /// Signs the slot for `program_hash` with whichever account `wallet` holds for
    /// it. Returns `Ok(true)` if a new signature was added, `Ok(false)` if this
    /// wallet has no matching account, leaving the transaction unchanged (idempotent
    /// re-signing: an account that already contributed is not signed again).
    pub fn sign_with(&mut self, wallet: &Wallet, program_hash: &Hash168) -> WalletResult<bool> {
        let index = match self.program_hashes.iter().position(|h| h == program_hash) {
            Some(i) => i,
            None => return Ok(false),
        };

        let contract = match &self.contracts[index] {
            Some(c) => c,
            None => return Ok(false),
        };

        let pubkey_index = match wallet.find_owned_pubkey(&contract.owner_pubkeys) {
            Some(i) => i,
            None => return Ok(false),
        };

        if self.signed[index].iter().any(|(i, _)| *i == pubkey_index) {
            return Ok(false);
        }

        let pubkey = &contract.owner_pubkeys[pubkey_index];
        let hash = self.tx.signable_hash();
        let sig = match wallet.sign_by_pubkey(pubkey, &hash) {
            Some(result) => result?,
            None => return Ok(false),
        };

        self.signed[index].push((pubkey_index, sig));
        Ok(true)
    }

    /// Builds the program for one slot: its redeem script plus whatever
    /// signatures have been accumulated so far, sorted by key index — the
    /// order `crypto::check_multisig` requires, since it consumes pubkeys
    /// strictly left to right. Used both when every slot is complete
    /// ([`into_programs`]) and when one isn't ([`into_uncompleted_programs`]).
    fn build_program(&self, index: usize) -> Option<Program> {
        let code = match &self.contracts[index] {
            Some(contract) => contract.redeem_script.clone(),
            None => return None,
        };

        let mut sigs = self.signed[index].clone();
        sigs.sort_by_key(|(i, _)| *i);

        let mut parameter = Vec::new();
        for (_, sig) in &sigs {
            script::push_data(&mut parameter, sig);
        }

        Some(Program { code, parameter })
    }

    /// Builds the final `Program` list if every slot has met its threshold.
    pub fn into_programs(self) -> Option<Vec<Program>> {
        if !self.is_completed() {
            return None;
        }

        let mut out = Vec::with_capacity(self.program_hashes.len());
        for (index, hash) in self.program_hashes.iter().enumerate() {
            let program = self.build_program(index)?;
            debug_assert!(matches!(hash.prefix(), PREFIX_SINGLE_SIG | PREFIX_SCRIPT));
            out.push(program);
        }
        Some(out)
    }

    /// Attaches whatever signatures have been accumulated so far, one program
    /// per required hash, for a transaction that isn't fully signed yet —
    /// mirrors the original's `ctx.GetUncompletedPrograms()`, which (despite
    /// the name) returns a program for every slot, complete or not, so later
    /// signers have the redeem script and partial signatures to build on via
    /// [`complete_multisig_programs`]. A slot this wallet has no contract for
    /// (so no redeem script to attach) is left with an empty program rather
    /// than omitted, so the result still has one entry per program hash.
    pub fn into_uncompleted_programs(self) -> Vec<Program> {
        (0..self.program_hashes.len())
            .map(|index| self.build_program(index).unwrap_or(Program { code: Vec::new(), parameter: Vec::new() }))
            .collect()
    }
}

fn multisig_threshold(n: usize) -> usize {
    n / 2 + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tx::{AttributeUsage, Payload, TxAttribute, TxType};

    fn empty_tx() -> Transaction {
        Transaction {
            tx_type: TxType::TransferAsset,
            payload_version: 0,
            payload: Payload::TransferAsset,
            attributes: vec![TxAttribute {
                usage: AttributeUsage::Nonce,
                data: vec![0; 8],
            }],
            utxo_inputs: vec![],
            balance_inputs: vec![],
            outputs: vec![],
            programs: vec![],
            lock_time: 0,
        }
    }

    #[test]
    fn single_sig_contract_completes_after_one_signature() {
        let wallet = Wallet::new();
        let hash = wallet.create_account().unwrap();
        let (pubkey, redeem) = wallet.get_account_by_program_hash(&hash).unwrap();
        wallet.create_contract(Contract {
            program_hash: hash,
            redeem_script: redeem,
            address_type: AddressType::SingleSign,
            owner_pubkeys: vec![pubkey],
        });

        let tx = empty_tx();
        let mut ctx = ContractContext::new(&tx, vec![hash], &wallet);
        assert!(!ctx.is_completed());
        assert!(ctx.sign_with(&wallet, &hash).unwrap());
        assert!(ctx.is_completed());
        assert!(ctx.into_programs().is_some());
    }

    #[test]
    fn resigning_with_same_account_is_idempotent() {
        let wallet = Wallet::new();
        let hash = wallet.create_account().unwrap();
        let (pubkey, redeem) = wallet.get_account_by_program_hash(&hash).unwrap();
        wallet.create_contract(Contract {
            program_hash: hash,
            redeem_script: redeem,
            address_type: AddressType::SingleSign,
            owner_pubkeys: vec![pubkey],
        });

        let tx = empty_tx();
        let mut ctx = ContractContext::new(&tx, vec![hash], &wallet);
        assert!(ctx.sign_with(&wallet, &hash).unwrap());
        assert!(!ctx.sign_with(&wallet, &hash).unwrap());
    }

    /// A 2-of-3 multisig transfer built by one signer, serialized, completed by a
    /// second signer out of key order, then verified end to end — regression test
    /// for the uncompleted-programs and key-index-ordering fixes above.
    #[test]
    fn multisig_transfer_completes_across_two_signers_and_verifies() {
        use ring::rand::SystemRandom;
        use ring::signature::{EcdsaKeyPair, ECDSA_P256_SHA256_ASN1_SIGNING};

        use crate::fixed64::Fixed64;
        use crate::tx::builder::TxBuilder;
        use crate::tx::{SigningContext, TxOutput, UtxoInput, SEQUENCE_DEFAULT};
        use crate::wallet::Coin;

        let rng = SystemRandom::new();
        let pkcs8_a = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &rng).unwrap();
        let pkcs8_b = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &rng).unwrap();
        let pkcs8_c = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &rng).unwrap();

        // `wallet_a` holds only signer A's key; `wallet_b` only signer B's — each
        // is a different party's local keystore, like two separate ELA wallets
        // cooperating on one multisig.
        let wallet_a = Wallet::new();
        let hash_a = wallet_a.import_account(pkcs8_a.as_ref()).unwrap();
        let (pubkey_a, _) = wallet_a.get_account_by_program_hash(&hash_a).unwrap();

        let wallet_b = Wallet::new();
        let hash_b = wallet_b.import_account(pkcs8_b.as_ref()).unwrap();
        let (pubkey_b, _) = wallet_b.get_account_by_program_hash(&hash_b).unwrap();

        let wallet_c = Wallet::new();
        let hash_c = wallet_c.import_account(pkcs8_c.as_ref()).unwrap();
        let (pubkey_c, _) = wallet_c.get_account_by_program_hash(&hash_c).unwrap();

        let owner_pubkeys = vec![pubkey_a.clone(), pubkey_b.clone(), pubkey_c];
        let redeem = create_multisig_redeem_script(2, &owner_pubkeys);
        let multisig_hash = Hash168::new(PREFIX_SCRIPT, &redeem);

        wallet_a.create_contract(Contract {
            program_hash: multisig_hash,
            redeem_script: redeem.clone(),
            address_type: AddressType::MultiSign,
            owner_pubkeys: owner_pubkeys.clone(),
        });
        wallet_a.add_coin(
            UtxoInput {
                refer_tx_hash: Hash256::sha256d(b"multisig-coin"),
                output_index: 0,
                sequence: SEQUENCE_DEFAULT,
            },
            Coin {
                output: TxOutput {
                    asset_id: Hash256::ZERO,
                    value: Fixed64::from_raw(200_000_000),
                    program_hash: multisig_hash,
                    output_lock: 0,
                },
                height: 0,
                address_type: AddressType::MultiSign,
            },
        );

        let payee = Wallet::new().create_account().unwrap();
        let builder_a = TxBuilder::new(&wallet_a, Hash256::ZERO, 0);
        let tx = builder_a
            .build_multisig_transfer(multisig_hash, "0.01", &[(&payee.to_address(), "1.0")])
            .unwrap();

        // Only one of two required signatures is present yet.
        assert_eq!(tx.programs.len(), 1);
        assert!(!tx.programs[0].parameter.is_empty());

        let raw = tx.to_bytes();
        let partially_signed = Transaction::from_bytes(&raw).unwrap();

        let builder_b = TxBuilder::new(&wallet_b, Hash256::ZERO, 0);
        let completed = builder_b.sign_multisig_transaction(partially_signed).unwrap();

        let ctx = SigningContext {
            tx: &completed,
            program_hashes: vec![multisig_hash],
        };
        script::verify_signable(&ctx, &EcdsaCrypto).unwrap();
    }
}
