//! The two sides of a two-player game.

use std::fmt;

/// Which side of a game a client is playing. There is no "none" variant
/// here; contexts that need to say "no role" (a NACK header, a draw
/// notification) use `Option<Role>` or the raw wire byte
/// [`protocol::role::NONE`] directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    First,
    Second,
}

impl Role {
    /// The other side of the board.
    pub fn opponent(self) -> Role {
        match self {
            Role::First => Role::Second,
            Role::Second => Role::First,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::First => write!(f, "first player"),
            Role::Second => write!(f, "second player"),
        }
    }
}

impl From<Role> for u8 {
    fn from(role: Role) -> u8 {
        match role {
            Role::First => protocol::role::FIRST_PLAYER,
            Role::Second => protocol::role::SECOND_PLAYER,
        }
    }
}

impl TryFrom<u8> for Role {
    type Error = ();

    fn try_from(value: u8) -> Result<Role, ()> {
        match value {
            protocol::role::FIRST_PLAYER => Ok(Role::First),
            protocol::role::SECOND_PLAYER => Ok(Role::Second),
            _ => Err(()),
        }
    }
}
