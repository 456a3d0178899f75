pub mod bridge;
pub mod logging;
pub mod order;
pub mod radix;
pub mod retry;
pub mod solana;
