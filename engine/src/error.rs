//! The error vocabulary shared by every layer of the kernel. The
//! dispatcher collapses any variant other than [`CoreError::Io`] straight
//! to a NACK; `Io` instead terminates the connection's service task.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// The requested operation is not valid given the current state of the
    /// entity involved (e.g. sending a second LOGIN, moving in a game that
    /// is already over).
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// A referenced entity (user, invitation id, game) does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The operation conflicts with something that already holds the
    /// resource (e.g. a username already in use by another logged-in
    /// client).
    #[error("conflict: {0}")]
    Conflict(String),

    /// A game move was syntactically or semantically invalid.
    #[error("illegal move: {0}")]
    IllegalMove(String),

    /// A registry has reached its configured capacity.
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// The underlying connection failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
