//! Core abstraction for pluggable game logic.
//!
//! A [`GameEngine`] is a synchronous, single-threaded board: it knows how
//! to parse a move from the text a client sends, apply it, report whether
//! the natural end of the game has been reached and who (if anyone) won,
//! and render its state back to text for the client.
//! [`Game`](crate::game::Game) wraps a `Box<dyn GameEngine>` together with
//! the turn-order and resignation bookkeeping that is common to any
//! two-player game, so a new game only has to implement the board itself.
//!
//! # Lifecycle
//!
//! ```text
//! GameEngine::new()
//!       │
//!       ▼
//! ┌───────────────────────────────────────────┐
//! │  loop, driven by the invitation's Game:    │
//! │    parse_move(text) ──► apply_move(role)   │
//! │    is_over / winner re-checked after each  │
//! │    apply_move and after every resign()     │
//! └───────────────────────────────────────────┘
//!       │
//!       ▼ is_over() == true
//! unparse_state() sent to both clients, game discarded
//! ```
//!
//! # Implementing a Game
//!
//! ```ignore
//! impl GameEngine for MyBoard {
//!     fn parse_move(&self, role: Role, text: &str) -> Result<i64, CoreError> { /* ... */ }
//!     fn apply_move(&mut self, role: Role, mv: i64) -> Result<(), CoreError> { /* ... */ }
//!     // ...
//! }
//! ```

use crate::error::CoreError;
use crate::role::Role;

/// The result of checking whether a game has concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    InProgress,
    Draw,
    Won(Role),
}

/// The capability set a board game must expose to be playable through the
/// session layer: parse and apply a move, report whether and how the game
/// ended on the board alone, and render state to text. Turn order and
/// resignation are handled generically by [`Game`](crate::game::Game), so
/// an engine only answers questions about the board itself.
///
/// Moves are represented as `i64` rather than an associated type so that
/// `Game` can hold engines behind a `Box<dyn GameEngine>` without needing
/// a game-specific generic parameter threaded through the client registry,
/// invitation and dispatcher layers. For tic-tac-toe a move is simply the
/// 1-9 board position; a richer game would pack a larger move description
/// into the same integer.
pub trait GameEngine: Send {
    /// Parses the text payload of a MOVE request into a move value, without
    /// checking whether the move is legal against the current board (that
    /// happens in [`apply_move`](Self::apply_move)). `role` is the mover's
    /// role, passed through so an engine whose move syntax carries an
    /// optional role suffix (tic-tac-toe's trailing `<-X`/`<-O`) can reject
    /// a suffix that disagrees with it. Returns [`CoreError::IllegalMove`]
    /// if the text cannot be parsed at all.
    fn parse_move(&self, role: Role, text: &str) -> Result<i64, CoreError>;

    /// Applies `mv` as a move by `role`. Rejects the move with
    /// [`CoreError::IllegalMove`] if the move is out of range or the
    /// square is occupied. `Game` has already verified it is `role`'s
    /// turn and that the game is not over before calling this.
    fn apply_move(&mut self, role: Role, mv: i64) -> Result<(), CoreError>;

    /// Whether the board itself has reached a terminal state (a win or a
    /// full board). Does not account for resignation, which `Game` tracks
    /// separately.
    fn is_over(&self) -> bool;

    /// The board's own winner, if [`is_over`](Self::is_over) is `true`.
    /// `None` means a draw.
    fn winner(&self) -> Option<Role>;

    /// Whose turn it is. Meaningless once the game is over.
    fn turn(&self) -> Role;

    /// Renders the full board state as the human-readable text the
    /// protocol sends in ACCEPTED/MOVED/ENDED payloads.
    fn unparse_state(&self) -> String;
}
