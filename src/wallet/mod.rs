//! Wallet-side account, contract and coin bookkeeping.
//!
//! HD derivation, mnemonic schemes and any other key-derivation *policy* are out of
//! scope (see the crate-level Non-goals) — an `Account` here is a single keypair,
//! not a derivation path.

pub mod coin_selector;

use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, KeyPair, ECDSA_P256_SHA256_ASN1_SIGNING};
use serde::{Deserialize, Serialize};

use crate::hash::{Hash168, PREFIX_SINGLE_SIG};
use crate::tx::contract::create_signature_redeem_script;
use crate::tx::UtxoInput;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressType {
    SingleSign,
    MultiSign,
    Script,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub output: crate::tx::TxOutput,
    pub height: u32,
    pub address_type: AddressType,
}

impl Coin {
    pub fn is_mature(&self, best_height: u32) -> bool {
        self.height <= best_height
    }
}

#[derive(Debug)]
pub struct WalletError(pub &'static str);

impl fmt::Display for WalletError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for WalletError {}

pub type WalletResult<T> = Result<T, WalletError>;

/// A single-signature keypair plus its derived program hash and redeem script.
///
/// ELA's own account creation (`NewAccountWithPrivatekey`) accepts 32/96/104-byte
/// raw private keys from a hand-rolled secp256r1 implementation. `ring`'s safe API
/// has no equivalent raw-scalar import — only PKCS8 document import or fresh
/// generation — so [`Account::from_pkcs8`] takes a PKCS8 document rather than a raw
/// scalar. Supporting the original's raw-scalar form would mean either vendoring
/// an EC implementation or reaching through an unsafe FFI boundary; both are
/// key-derivation-policy concerns this crate doesn't take on.
pub struct Account {
    keypair: EcdsaKeyPair,
    pub public_key: Vec<u8>,
    pub redeem_script: Vec<u8>,
    pub program_hash: Hash168,
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account").field("program_hash", &self.program_hash).finish()
    }
}

impl Account {
    /// Generates a fresh keypair.
    pub fn new() -> WalletResult<Account> {
        let rng = SystemRandom::new();
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &rng)
            .map_err(|_| WalletError("key generation failed"))?;
        Account::from_pkcs8(pkcs8.as_ref())
    }

    pub fn from_pkcs8(pkcs8: &[u8]) -> WalletResult<Account> {
        let keypair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, pkcs8)
            .map_err(|_| WalletError("invalid private key encoding"))?;
        let public_key = keypair.public_key().as_ref().to_vec();
        let redeem_script = create_signature_redeem_script(&public_key);
        let program_hash = Hash168::new(PREFIX_SINGLE_SIG, &redeem_script);

        Ok(Account {
            keypair,
            public_key,
            redeem_script,
            program_hash,
        })
    }

    pub fn sign(&self, hash: &crate::hash::Hash256) -> WalletResult<Vec<u8>> {
        let rng = SystemRandom::new();
        self.keypair
            .sign(&rng, &hash.0)
            .map(|sig| sig.as_ref().to_vec())
            .map_err(|_| WalletError("signing failed"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contract {
    pub program_hash: Hash168,
    pub redeem_script: Vec<u8>,
    pub address_type: AddressType,
    pub owner_pubkeys: Vec<Vec<u8>>,
}

struct WalletState {
    accounts: Vec<Account>,
    contracts: HashMap<Hash168, Contract>,
    coins: HashMap<UtxoInput, Coin>,
}

/// Process-wide wallet state: key store, known script contracts, and the UTXO set
/// `TxBuilder` draws from. Guarded by a single reader-writer lock at the wallet
/// boundary — mutation (account/contract/coin bookkeeping) is serialized against
/// concurrent RPC reads, per the crate's concurrency model.
pub struct Wallet {
    state: RwLock<WalletState>,
}

impl Wallet {
    pub fn new() -> Wallet {
        Wallet {
            state: RwLock::new(WalletState {
                accounts: Vec::new(),
                contracts: HashMap::new(),
                coins: HashMap::new(),
            }),
        }
    }

    pub fn create_account(&self) -> WalletResult<Hash168> {
        let account = Account::new()?;
        self.insert_account(account)
    }

    pub fn import_account(&self, pkcs8: &[u8]) -> WalletResult<Hash168> {
        let account = Account::from_pkcs8(pkcs8)?;
        self.insert_account(account)
    }

    /// Registers `account` and its matching single-sig [`Contract`] in one step —
    /// every owned account needs a contract entry so [`ContractContext`] can
    /// resolve its redeem script during signing.
    ///
    /// [`ContractContext`]: crate::tx::contract::ContractContext
    fn insert_account(&self, account: Account) -> WalletResult<Hash168> {
        let hash = account.program_hash;
        let contract = Contract {
            program_hash: hash,
            redeem_script: account.redeem_script.clone(),
            address_type: AddressType::SingleSign,
            owner_pubkeys: vec![account.public_key.clone()],
        };

        let mut state = self.state.write().unwrap();
        state.accounts.push(account);
        state.contracts.insert(hash, contract);
        Ok(hash)
    }

    pub fn delete_account(&self, program_hash: &Hash168) -> bool {
        let mut state = self.state.write().unwrap();
        let before = state.accounts.len();
        state.accounts.retain(|a| &a.program_hash != program_hash);
        state.contracts.remove(program_hash);
        state.accounts.len() != before
    }

    pub fn create_contract(&self, contract: Contract) {
        let mut state = self.state.write().unwrap();
        state.contracts.insert(contract.program_hash, contract);
    }

    pub fn delete_contract(&self, program_hash: &Hash168) -> bool {
        self.state.write().unwrap().contracts.remove(program_hash).is_some()
    }

    pub fn delete_coins_data(&self, program_hash: &Hash168) {
        let mut state = self.state.write().unwrap();
        state.coins.retain(|_, coin| coin.output.program_hash != *program_hash);
    }

    pub fn add_coin(&self, input: UtxoInput, coin: Coin) {
        self.state.write().unwrap().coins.insert(input, coin);
    }

    pub fn remove_coin(&self, input: &UtxoInput) {
        self.state.write().unwrap().coins.remove(input);
    }

    pub fn get_coins(&self) -> HashMap<UtxoInput, Coin> {
        self.state.read().unwrap().coins.clone()
    }

    pub fn get_account_by_program_hash(&self, program_hash: &Hash168) -> Option<(Vec<u8>, Vec<u8>)> {
        self.state
            .read()
            .unwrap()
            .accounts
            .iter()
            .find(|a| &a.program_hash == program_hash)
            .map(|a| (a.public_key.clone(), a.redeem_script.clone()))
    }

    /// Signs `hash` with whichever held account owns `program_hash`, if any.
    pub fn sign_with(&self, program_hash: &Hash168, hash: &crate::hash::Hash256) -> Option<WalletResult<Vec<u8>>> {
        let state = self.state.read().unwrap();
        state
            .accounts
            .iter()
            .find(|a| &a.program_hash == program_hash)
            .map(|a| a.sign(hash))
    }

    /// Finds the position in `candidates` matching a public key this wallet holds
    /// the private key for, used to locate this wallet's slot in a multisig or
    /// script contract's owner key list.
    pub fn find_owned_pubkey(&self, candidates: &[Vec<u8>]) -> Option<usize> {
        let state = self.state.read().unwrap();
        candidates
            .iter()
            .position(|candidate| state.accounts.iter().any(|a| &a.public_key == candidate))
    }

    /// Signs `hash` with the account whose public key is `pubkey`, if held.
    pub fn sign_by_pubkey(&self, pubkey: &[u8], hash: &crate::hash::Hash256) -> Option<WalletResult<Vec<u8>>> {
        let state = self.state.read().unwrap();
        state
            .accounts
            .iter()
            .find(|a| a.public_key == pubkey)
            .map(|a| a.sign(hash))
    }

    pub fn get_default_account(&self) -> Option<Hash168> {
        self.state.read().unwrap().accounts.first().map(|a| a.program_hash)
    }

    pub fn get_contract(&self, program_hash: &Hash168) -> Option<Contract> {
        self.state.read().unwrap().contracts.get(program_hash).cloned()
    }
}

impl Default for Wallet {
    fn default() -> Self {
        Wallet::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_delete_account() {
        let wallet = Wallet::new();
        let hash = wallet.create_account().unwrap();
        assert!(wallet.get_default_account().is_some());
        assert!(wallet.delete_account(&hash));
        assert!(wallet.get_default_account().is_none());
    }

    #[test]
    fn sign_with_owned_account_round_trips_through_verification() {
        let wallet = Wallet::new();
        let hash = wallet.create_account().unwrap();
        let msg = crate::hash::Hash256::sha256d(b"payload");
        let sig = wallet.sign_with(&hash, &msg).unwrap().unwrap();
        let (pubkey, _redeem) = wallet.get_account_by_program_hash(&hash).unwrap();

        let crypto = crate::script::crypto::EcdsaCrypto;
        use crate::script::crypto::Crypto;
        assert!(crypto.check_sig(&pubkey, &msg, &sig));
    }
}
