mod balance_config;

pub use balance_config::{BalanceConfig, BalanceMethod, DomainTarget};
