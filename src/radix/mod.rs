pub mod bridge;
pub mod gateway;
pub mod keys;

/// Radix network selector. Drives the gateway endpoint choice at the config
/// layer and the account-address HRP during derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadixNetwork {
    Mainnet,
    Stokenet,
}

impl RadixNetwork {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "mainnet" | "main" => RadixNetwork::Mainnet,
            _ => RadixNetwork::Stokenet,
        }
    }

    pub fn account_hrp(&self) -> &'static str {
        match self {
            RadixNetwork::Mainnet => "account_rdx",
            RadixNetwork::Stokenet => "account_tdx_2_",
        }
    }
}
