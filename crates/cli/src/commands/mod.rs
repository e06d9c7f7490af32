//! Command handlers

mod backup;
mod card_operations;
mod data_management;
mod key_operations;

pub use backup::*;
pub use card_operations::*;
pub use data_management::*;
pub use key_operations::*;
