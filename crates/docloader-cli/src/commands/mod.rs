//! CLI command implementations

pub mod delete;
pub mod load;
pub mod status;
