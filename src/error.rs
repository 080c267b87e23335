//! Error types for the ledgerlimit service.

use thiserror::Error;

use crate::ledger::LedgerError;

/// Main error type for ledgerlimit operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The caller supplied a malformed request
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation requires an identity and none was presented
    #[error("Unauthenticated")]
    Unauthenticated,

    /// A credential was presented but could not be verified or issued
    #[error("Token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    /// The backing ledger failed
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// A guarded action was refused by the limiter
    #[error("Rate limit exceeded for {action}, resets at {reset_at}")]
    RateLimited { action: String, reset_at: i64 },

    /// gRPC transport errors
    #[error("gRPC error: {0}")]
    Grpc(#[from] tonic::transport::Error),

    /// gRPC call failures seen by the client
    #[error("gRPC status: {0}")]
    Status(#[from] tonic::Status),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for ledgerlimit operations.
pub type Result<T> = std::result::Result<T, Error>;
