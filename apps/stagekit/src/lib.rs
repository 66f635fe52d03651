//! # stagekit
//!
//! The command line front end of the staging engine: manifest loading,
//! the CLI, and the copy executor. All planning lives in `stagekit-core`.

pub mod cli;
pub mod executor;
pub mod manifest;
