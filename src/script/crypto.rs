use ring::signature::{self, UnparsedPublicKey, ECDSA_P256_SHA256_ASN1};

use crate::hash::Hash256;

/// Cryptographic primitive boundary for the script VM's `CHECKSIG`/`CHECKMULTISIG`
/// opcodes. Kept as a trait rather than a direct `ring` call so the engine can be
/// exercised with a fake signer/verifier in tests, and so a different curve or
/// signature scheme can be swapped in without touching the interpreter.
pub trait Crypto {
    /// Verifies `sig` over `hash` under `pubkey`. Returns `false` on any malformed
    /// input rather than propagating a parse error — the VM treats a bad signature
    /// exactly like a failed one.
    fn check_sig(&self, pubkey: &[u8], hash: &Hash256, sig: &[u8]) -> bool;
}

/// Production `Crypto` implementation over `ring`'s ECDSA P-256 verifier.
#[derive(Debug, Default, Clone, Copy)]
pub struct EcdsaCrypto;

impl Crypto for EcdsaCrypto {
    fn check_sig(&self, pubkey: &[u8], hash: &Hash256, sig: &[u8]) -> bool {
        let key = UnparsedPublicKey::new(&ECDSA_P256_SHA256_ASN1, pubkey);
        key.verify(&hash.0, sig).is_ok()
    }
}

/// Verifies an m-of-n multisig: each of `sigs` must match a distinct key in
/// `pubkeys`, in order, with at least `m` matches. Keys are consumed left to
/// right so a single key cannot be credited against two signatures.
pub fn check_multisig(crypto: &dyn Crypto, pubkeys: &[Vec<u8>], m: usize, hash: &Hash256, sigs: &[Vec<u8>]) -> bool {
    if sigs.len() < m || sigs.len() > pubkeys.len() {
        return false;
    }

    let mut key_idx = 0;
    let mut matched = 0;

    for sig in sigs {
        let mut found = false;
        while key_idx < pubkeys.len() {
            let pubkey = &pubkeys[key_idx];
            key_idx += 1;
            if crypto.check_sig(pubkey, hash, sig) {
                found = true;
                matched += 1;
                break;
            }
        }
        if !found {
            return false;
        }
    }

    matched >= m
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// A `Crypto` fake that accepts signatures matching `sig == pubkey` byte-for-byte,
    /// letting VM/tx-builder tests exercise CHECKSIG paths without real key material.
    #[derive(Debug, Default)]
    pub struct FakeCrypto;

    impl Crypto for FakeCrypto {
        fn check_sig(&self, pubkey: &[u8], _hash: &Hash256, sig: &[u8]) -> bool {
            pubkey == sig
        }
    }
}
