//! CLI command implementations.

pub mod init;
pub mod load;
pub mod run;
pub mod show;
