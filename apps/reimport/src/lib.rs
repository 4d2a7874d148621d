//! # reimport
//!
//! Command-line front end of `reimport-core`: argument parsing, the TOML
//! configuration file, and the command implementations.

pub mod cli;
pub mod config;
