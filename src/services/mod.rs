//! Clients for the external surfaces: relay, chain RPC, Safe derivation

pub mod balance;
pub mod relay;
pub mod relay_errors;
pub mod safe_proxy;

pub use balance::BalanceClient;
pub use relay::RelayClient;
pub use relay_errors::RelayError;
