//! BIP-39 mnemonic handling and SLIP-10 Ed25519 key derivation shared by the
//! two chain bridges. Only hardened derivation exists for Ed25519, so paths
//! are plain index lists and the hardened offset is applied here.

use bip39::{Language, Mnemonic};
use ed25519_dalek::SigningKey;
use hmac::{Hmac, Mac as _};
use sha2::Sha512;
use zeroize::Zeroize as _;

use super::BridgeError;

const HARDENED: u32 = 0x8000_0000;

/// Generate a fresh English mnemonic of the given word count (12 or 24) from
/// OS entropy.
pub fn generate_mnemonic(word_count: usize) -> Result<Mnemonic, BridgeError> {
    use rand_core::{OsRng, RngCore as _};

    let entropy_len = match word_count {
        12 => 16,
        24 => 32,
        other => {
            return Err(BridgeError::InvalidInput(format!(
                "unsupported mnemonic length: {other} words"
            )));
        }
    };

    let mut entropy = [0u8; 32];
    OsRng.fill_bytes(&mut entropy[..entropy_len]);

    let mnemonic = Mnemonic::from_entropy(&entropy[..entropy_len])
        .map_err(|e| BridgeError::InvalidInput(format!("mnemonic from entropy: {e}")))?;
    entropy.zeroize();
    Ok(mnemonic)
}

/// Parse and validate a mnemonic phrase (wordlist membership + checksum),
/// requiring the chain's expected word count.
pub fn parse_mnemonic(phrase: &str, expected_words: usize) -> Result<Mnemonic, BridgeError> {
    let mnemonic = Mnemonic::parse_in(Language::English, phrase)
        .map_err(|e| BridgeError::InvalidInput(format!("invalid seed phrase: {e}")))?;
    let words = mnemonic.word_count();
    if words != expected_words {
        return Err(BridgeError::InvalidInput(format!(
            "seed phrase must be {expected_words} words, got {words}"
        )));
    }
    Ok(mnemonic)
}

/// SLIP-10 hardened Ed25519 derivation from a BIP-39 seed.
pub fn derive_ed25519(seed: &[u8], path: &[u32]) -> Result<SigningKey, BridgeError> {
    let mut mac = Hmac::<Sha512>::new_from_slice(b"ed25519 seed")
        .map_err(|e| BridgeError::InvalidInput(format!("hmac init: {e}")))?;
    mac.update(seed);
    let digest = mac.finalize().into_bytes();

    let mut key = [0u8; 32];
    let mut chain_code = [0u8; 32];
    key.copy_from_slice(&digest[..32]);
    chain_code.copy_from_slice(&digest[32..]);

    for index in path {
        let hardened_index = index | HARDENED;
        let mut mac = Hmac::<Sha512>::new_from_slice(&chain_code)
            .map_err(|e| BridgeError::InvalidInput(format!("hmac init: {e}")))?;
        mac.update(&[0x00]);
        mac.update(&key);
        mac.update(&hardened_index.to_be_bytes());
        let digest = mac.finalize().into_bytes();

        key.copy_from_slice(&digest[..32]);
        chain_code.copy_from_slice(&digest[32..]);
    }

    let signing_key = SigningKey::from_bytes(&key);
    key.zeroize();
    chain_code.zeroize();
    Ok(signing_key)
}
