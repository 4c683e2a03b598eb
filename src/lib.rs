//! spinwatch library
//!
//! Exposes the session pieces for the binary and for integration testing

pub mod config;
pub mod errors;
pub mod reporter;
pub mod session;
pub mod steps;

pub use config::{ConfigError, LogFormat, Settings};
pub use errors::{ExitStatus, SessionError};
pub use reporter::{Level, Reporter};
pub use session::Session;
