//! Radix custodial key material: 12-word BIP-39 mnemonics, SLIP-10 Ed25519
//! derivation on the Babylon account path, bech32m virtual-account address
//! derivation.

use bech32::{Bech32m, Hrp};
use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest as _};
use ed25519_dalek::SigningKey;

use crate::bridge::slip10;
use crate::bridge::{BridgeError, GeneratedKeys, RestoredKeys, Secret};
use crate::radix::RadixNetwork;

pub const MNEMONIC_WORDS: usize = 12;
const DERIVATION_PATH: [u32; 6] = [44, 1022, 0, 525, 1460, 0];

// Entity discriminator for an Ed25519 virtual account.
const VIRTUAL_ACCOUNT_PREFIX: u8 = 0x51;

type Blake2b256 = Blake2b<U32>;

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
    Ok(RestoredKeys {
        public_key: hex::encode(signing_key.verifying_key().to_bytes()),
        secret_key: Secret::new(hex::encode(signing_key.to_bytes())),
    })
}

pub fn signing_key_from_secret(secret: &Secret) -> Result<SigningKey, BridgeError> {
    let bytes = hex::decode(secret.expose())
        .map_err(|_| BridgeError::InvalidInput("malformed radix key material".to_string()))?;
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| BridgeError::InvalidInput("malformed radix key material".to_string()))?;
    Ok(SigningKey::from_bytes(&bytes))
}

/// Virtual-account address: bech32m over the entity discriminator byte plus
/// the trailing 29 bytes of blake2b-256 of the public key, with the network
/// HRP. Pure derivation, no I/O.
pub fn address_from_public_key(
    public_key_hex: &str,
    network: RadixNetwork,
) -> Result<String, BridgeError> {
    let bytes = hex::decode(public_key_hex)
        .map_err(|e| BridgeError::InvalidInput(format!("public key hex: {e}")))?;
    if bytes.len() != 32 {
        return Err(BridgeError::InvalidInput(
            "public key must be 32 bytes".to_string(),
        ));
    }

    let digest = Blake2b256::digest(&bytes);
    let mut data = Vec::with_capacity(30);
    data.push(VIRTUAL_ACCOUNT_PREFIX);
    data.extend_from_slice(&digest[3..]);

    let hrp = Hrp::parse(network.account_hrp())
        .map_err(|e| BridgeError::InvalidInput(format!("account hrp: {e}")))?;
    bech32::encode::<Bech32m>(hrp, &data)
        .map_err(|e| BridgeError::InvalidInput(format!("encode account address: {e}")))
}

pub fn is_valid_address(address: &str, network: RadixNetwork) -> bool {
    if !address.starts_with("account_") {
        return false;
    }
    match bech32::decode(address) {
        Ok((hrp, data)) => hrp.to_string() == network.account_hrp() && data.len() == 30,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restore_matches_generated_account() {
        let generated = generate().unwrap();
        let restored = restore(generated.seed_phrase.expose()).unwrap();
        assert_eq!(generated.public_key, restored.public_key);
        assert_eq!(generated.secret_key.expose(), restored.secret_key.expose());
    }

    #[test]
    fn restore_rejects_wrong_word_count() {
        let phrase = slip10::generate_mnemonic(24).unwrap().to_string();
        assert!(matches!(
            restore(&phrase),
            Err(BridgeError::InvalidInput(_))
        ));
    }

    #[test]
    fn address_derivation_is_deterministic_and_network_scoped() {
        let generated = generate().unwrap();
        let mainnet =
            address_from_public_key(&generated.public_key, RadixNetwork::Mainnet).unwrap();
        let stokenet =
            address_from_public_key(&generated.public_key, RadixNetwork::Stokenet).unwrap();

        assert!(mainnet.starts_with("account_rdx1"));
        assert!(stokenet.starts_with("account_tdx_2_1"));
        assert_ne!(mainnet, stokenet);
        assert_eq!(
            mainnet,
            address_from_public_key(&generated.public_key, RadixNetwork::Mainnet).unwrap()
        );

        assert!(is_valid_address(&mainnet, RadixNetwork::Mainnet));
        assert!(!is_valid_address(&mainnet, RadixNetwork::Stokenet));
        assert!(!is_valid_address("account_rdx1notbech32", RadixNetwork::Mainnet));
        assert!(!is_valid_address(
            "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU",
            RadixNetwork::Mainnet
        ));
    }
}
