pub mod analysis;
pub mod corpus;
pub mod domain;
pub mod operations;

pub use analysis::*;
pub use corpus::*;
pub use domain::*;
