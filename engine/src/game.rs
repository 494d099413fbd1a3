//! The game-independent half of a game: turn order and resignation,
//! layered on top of a [`GameEngine`] board.

use crate::error::CoreError;
use crate::role::Role;
use crate::traits::{GameEngine, Outcome};

/// A live game between two clients, wrapping a pluggable board behind
/// [`GameEngine`].
///
/// Resignation is tracked here rather than inside the engine because the
/// ordering in which it is resolved against a concurrently-resigning
/// opponent is a property of the two-player contract, not of any
/// particular board: if both sides resign in short succession, the first
/// player's resignation is always the one that decides the outcome, so
/// that `winner()` is a pure function of state rather than of timing.
pub struct Game {
    engine: Box<dyn GameEngine>,
    first_player_resigned: bool,
    second_player_resigned: bool,
}

impl Game {
    pub fn new(engine: Box<dyn GameEngine>) -> Self {
        Game {
            engine,
            first_player_resigned: false,
            second_player_resigned: false,
        }
    }

    pub fn parse_move(&self, role: Role, text: &str) -> Result<i64, CoreError> {
        self.engine.parse_move(role, text)
    }

    pub fn apply_move(&mut self, role: Role, mv: i64) -> Result<(), CoreError> {
        if self.is_over() {
            return Err(CoreError::IllegalState("the game is already over".into()));
        }
        if role != self.engine.turn() {
            return Err(CoreError::IllegalMove(format!("it is not {role}'s turn")));
        }
        self.engine.apply_move(role, mv)
    }

    pub fn resign(&mut self, role: Role) {
        match role {
            Role::First => self.first_player_resigned = true,
            Role::Second => self.second_player_resigned = true,
        }
    }

    pub fn is_over(&self) -> bool {
        self.first_player_resigned || self.second_player_resigned || self.engine.is_over()
    }

    /// The game's outcome. Only meaningful once [`is_over`](Self::is_over)
    /// is `true`.
    ///
    /// A resignation is checked before the underlying board, and the first
    /// player's resignation is checked before the second's, so that a
    /// client resigning the losing side of an otherwise-finished game can
    /// never flip the recorded result.
    pub fn outcome(&self) -> Outcome {
        if self.first_player_resigned {
            return Outcome::Won(Role::Second);
        }
        if self.second_player_resigned {
            return Outcome::Won(Role::First);
        }
        if !self.engine.is_over() {
            return Outcome::InProgress;
        }
        match self.engine.winner() {
            Some(role) => Outcome::Won(role),
            None => Outcome::Draw,
        }
    }

    pub fn turn(&self) -> Role {
        self.engine.turn()
    }

    /// Renders the game state as the text the protocol sends back to
    /// clients: the live board while play continues, or a short result
    /// line once the game is over (whether by resignation or by the board
    /// reaching a natural conclusion).
    pub fn unparse_state(&self) -> String {
        match self.outcome() {
            Outcome::InProgress => self.engine.unparse_state(),
            Outcome::Draw => "Game is over\nThe game was drawn\n".to_string(),
            Outcome::Won(Role::First) => "Game is over\nPlayer 1 has won\n".to_string(),
            Outcome::Won(Role::Second) => "Game is over\nPlayer 2 has won\n".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubBoard {
        turn: Role,
        over: bool,
        winner: Option<Role>,
    }

    impl GameEngine for StubBoard {
        fn parse_move(&self, _role: Role, text: &str) -> Result<i64, CoreError> {
            text.parse().map_err(|_| CoreError::IllegalMove(text.into()))
        }
        fn apply_move(&mut self, _role: Role, _mv: i64) -> Result<(), CoreError> {
            Ok(())
        }
        fn is_over(&self) -> bool {
            self.over
        }
        fn winner(&self) -> Option<Role> {
            self.winner
        }
        fn turn(&self) -> Role {
            self.turn
        }
        fn unparse_state(&self) -> String {
            String::new()
        }
    }

    #[test]
    fn first_resignation_wins_for_second_player_regardless_of_order() {
        let mut game = Game::new(Box::new(StubBoard {
            turn: Role::First,
            over: false,
            winner: None,
        }));
        game.resign(Role::First);
        game.resign(Role::Second);
        assert_eq!(game.outcome(), Outcome::Won(Role::Second));
    }

    #[test]
    fn rejects_move_out_of_turn() {
        let mut game = Game::new(Box::new(StubBoard {
            turn: Role::First,
            over: false,
            winner: None,
        }));
        assert!(game.apply_move(Role::Second, 5).is_err());
    }

    #[test]
    fn rejects_move_once_game_is_over() {
        let mut game = Game::new(Box::new(StubBoard {
            turn: Role::First,
            over: true,
            winner: Some(Role::First),
        }));
        assert!(game.apply_move(Role::First, 5).is_err());
    }
}
