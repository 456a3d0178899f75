//! Solana custodial key material: 24-word BIP-39 mnemonics, SLIP-10 Ed25519
//! derivation on the standard Solana path, base58 address encoding.

use std::str::FromStr as _;

use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;

use crate::bridge::slip10;
use crate::bridge::{BridgeError, GeneratedKeys, RestoredKeys, Secret};

pub const MNEMONIC_WORDS: usize = 24;
const DERIVATION_PATH: [u32; 4] = [44, 501, 0, 0];

pub fn generate() -> Result<GeneratedKeys, BridgeError> {
    let mnemonic = slip10::generate_mnemonic(MNEMONIC_WORDS)?;
    let restored = keys_from_mnemonic(&mnemonic)?;
    Ok(GeneratedKeys {
        public_key: restored.public_key,
        secret_key: restored.secret_key,
        seed_phrase: Secret::new(mnemonic.to_string()),
    })
}

pub fn restore(seed_phrase: &str) -> Result<RestoredKeys, BridgeError> {
    let mnemonic = slip10::parse_mnemonic(seed_phrase, MNEMONIC_WORDS)?;
    keys_from_mnemonic(&mnemonic)
}

fn keys_from_mnemonic(mnemonic: &bip39::Mnemonic) -> Result<RestoredKeys, BridgeError> {
    let seed = mnemonic.to_seed("");
    let signing_key = slip10::derive_ed25519(&seed, &DERIVATION_PATH)?;

    // solana-sdk keypair bytes are secret || public.
    let mut keypair_bytes = [0u8; 64];
    keypair_bytes[..32].copy_from_slice(&signing_key.to_bytes());
    keypair_bytes[32..].copy_from_slice(&signing_key.verifying_key().to_bytes());

    Ok(RestoredKeys {
        public_key: hex::encode(signing_key.verifying_key().to_bytes()),
        secret_key: Secret::new(hex::encode(keypair_bytes)),
    })
}

pub fn keypair_from_secret(secret: &Secret) -> Result<Keypair, BridgeError> {
    let bytes = hex::decode(secret.expose())
        .map_err(|_| BridgeError::InvalidInput("malformed solana key material".to_string()))?;
    Keypair::from_bytes(&bytes)
        .map_err(|_| BridgeError::InvalidInput("malformed solana key material".to_string()))
}

/// Base58 encoding of the 32 public key bytes. Pure derivation, no I/O.
pub fn address_from_public_key(public_key_hex: &str) -> Result<String, BridgeError> {
    let bytes = hex::decode(public_key_hex)
        .map_err(|e| BridgeError::InvalidInput(format!("public key hex: {e}")))?;
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| BridgeError::InvalidInput("public key must be 32 bytes".to_string()))?;
    Ok(Pubkey::new_from_array(bytes).to_string())
}

pub fn is_valid_address(address: &str) -> bool {
    Pubkey::from_str(address).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::signer::Signer as _;

    #[test]
    fn restore_matches_generated_account() {
        let generated = generate().unwrap();
        let restored = restore(generated.seed_phrase.expose()).unwrap();
        assert_eq!(generated.public_key, restored.public_key);
        assert_eq!(
            generated.secret_key.expose(),
            restored.secret_key.expose()
        );
    }

    #[test]
    fn restore_rejects_invalid_phrase() {
        assert!(matches!(
            restore("abandon abandon abandon"),
            Err(BridgeError::InvalidInput(_))
        ));
    }

    #[test]
    fn derived_address_matches_keypair() {
        let generated = generate().unwrap();
        let address = address_from_public_key(&generated.public_key).unwrap();
        let keypair = keypair_from_secret(&generated.secret_key).unwrap();
        assert_eq!(address, keypair.pubkey().to_string());
        assert!(is_valid_address(&address));
    }

    #[test]
    fn address_validation_rejects_junk() {
        assert!(!is_valid_address("not-an-address"));
        assert!(!is_valid_address("account_rdx1abc"));
    }
}
