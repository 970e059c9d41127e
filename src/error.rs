//! CLI Error Types

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A CLI error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for CLI operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("could not load configuration")]
    Config,
    #[display("configuration file not found: {}", _0.display())]
    ConfigNotFound(#[error(not(source))] PathBuf),
    #[display("could not open texture: {}", _0.display())]
    Open(#[error(not(source))] PathBuf),
    #[display("could not read texture data")]
    Read,
    #[display("could not write output")]
    Output,
}
