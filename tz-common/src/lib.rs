//! # TicketZen Common Library
//!
//! Shared code for the TicketZen client crates:
//! - Error type and `Result` alias
//! - Configuration loading (TOML file, environment, compiled defaults)
//! - Tracing initialisation

pub mod config;
pub mod error;
pub mod logging;

pub use error::{Error, Result};
