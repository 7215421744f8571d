// Centralized error handling for the engine

use thiserror::Error;

/// Errors raised while authenticating a user
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AuthError {
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("User account is disabled")]
    AccountDisabled,

    #[error("User not found")]
    UserNotFound,
}

/// Errors raised during session handling
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("Invalid or expired session token")]
    InvalidToken,

    #[error("No active session")]
    NotLoggedIn,
}

/// Errors raised while validating caller input
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Username must be at least {min} characters")]
    UsernameTooShort { min: usize },

    #[error("Password must be at least {min} characters")]
    PasswordTooShort { min: usize },

    #[error("Username is already taken")]
    DuplicateUsername,

    #[error("Administrator accounts cannot be removed")]
    ProtectedAccount,
}

/// Local write failures. Fatal for the failing operation only,
/// never for the process.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Failed to read table '{table}': {source}")]
    Read {
        table: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to write table '{table}': {source}")]
    Write {
        table: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Malformed record in table '{table}': {reason}")]
    MalformedRecord { table: String, reason: String },
}

/// Umbrella error for engine operations that can fail in more than one way
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}
