pub mod bridge;
pub mod keys;
