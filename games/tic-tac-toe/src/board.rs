//! The 3x3 board itself: move legality, win/draw detection, and the
//! textual board rendering used while a game is in progress.

use engine::{CoreError, GameEngine, Role};

/// Board cell contents. `0` is empty, `1` is the first player's mark,
/// `2` is the second player's mark — the same small-integer convention
/// the original board used.
#[derive(Debug, Clone)]
pub struct Board {
    cells: [[u8; 3]; 3],
    turn: Role,
}

impl Default for Board {
    fn default() -> Self {
        Board {
            cells: [[0; 3]; 3],
            turn: Role::First,
        }
    }
}

impl Board {
    pub fn new() -> Self {
        Board::default()
    }

    fn mark_for(role: Role) -> u8 {
        match role {
            Role::First => 1,
            Role::Second => 2,
        }
    }

    /// Checks whether every cell in some row, column or diagonal holds
    /// `mark`.
    fn check_for(&self, mark: u8) -> bool {
        (0..3).any(|row| (0..3).all(|col| self.cells[row][col] == mark))
            || (0..3).any(|col| (0..3).all(|row| self.cells[row][col] == mark))
            || (0..3).all(|i| self.cells[i][i] == mark)
            || (0..3).all(|i| self.cells[i][2 - i] == mark)
    }

    fn is_full(&self) -> bool {
        self.cells.iter().flatten().all(|&cell| cell != 0)
    }
}

impl GameEngine for Board {
    /// Accepts the decimal string `"1"`..`"9"`, optionally followed by a
    /// `<-X` or `<-O` role suffix. When present, the suffix must name
    /// `role`'s own mark (`<-X` for [`Role::First`], `<-O` for
    /// [`Role::Second`]); a suffix naming the other mark is rejected
    /// outright rather than silently ignored.
    fn parse_move(&self, role: Role, text: &str) -> Result<i64, CoreError> {
        let text = text.trim();
        let (digits, suffix) = match text.split_once("<-") {
            Some((digits, suffix)) => (digits, Some(suffix)),
            None => (text, None),
        };

        if let Some(suffix) = suffix {
            let suffix_role = match suffix {
                "X" => Role::First,
                "O" => Role::Second,
                _ => {
                    return Err(CoreError::IllegalMove(format!(
                        "unrecognized role suffix in move {text:?}"
                    )));
                }
            };
            if suffix_role != role {
                return Err(CoreError::IllegalMove(format!(
                    "move {text:?} names a role suffix that disagrees with the mover's role"
                )));
            }
        }

        digits
            .parse::<i64>()
            .map_err(|_| CoreError::IllegalMove(format!("not a valid move: {text:?}")))
    }

    fn apply_move(&mut self, role: Role, mv: i64) -> Result<(), CoreError> {
        if !(1..=9).contains(&mv) {
            return Err(CoreError::IllegalMove(format!(
                "move {mv} is out of the board's 1-9 range"
            )));
        }
        let position = (mv - 1) as usize;
        let (row, col) = (position / 3, position % 3);
        if self.cells[row][col] != 0 {
            return Err(CoreError::IllegalMove(format!(
                "position {mv} is already occupied"
            )));
        }
        self.cells[row][col] = Board::mark_for(role);
        self.turn = role.opponent();
        Ok(())
    }

    fn is_over(&self) -> bool {
        self.check_for(1) || self.check_for(2) || self.is_full()
    }

    fn winner(&self) -> Option<Role> {
        if self.check_for(1) {
            Some(Role::First)
        } else if self.check_for(2) {
            Some(Role::Second)
        } else {
            None
        }
    }

    fn turn(&self) -> Role {
        self.turn
    }

    fn unparse_state(&self) -> String {
        let mark = |v: u8| match v {
            1 => 'X',
            2 => 'O',
            _ => ' ',
        };
        let mut out = String::new();
        for row in 0..3 {
            out.push_str(&format!(
                "{}|{}|{}\n",
                mark(self.cells[row][0]),
                mark(self.cells[row][1]),
                mark(self.cells[row][2])
            ));
            if row < 2 {
                out.push_str("-----\n");
            }
        }
        out.push_str(match self.turn {
            Role::First => "X to move\n",
            Role::Second => "O to move\n",
        });
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_a_row_win() {
        let mut board = Board::new();
        board.apply_move(Role::First, 1).unwrap(); // X . .
        board.apply_move(Role::Second, 4).unwrap(); // O . .
        board.apply_move(Role::First, 2).unwrap(); // X X .
        board.apply_move(Role::Second, 5).unwrap(); // O O .
        board.apply_move(Role::First, 3).unwrap(); // X X X -> win
        assert!(board.is_over());
        assert_eq!(board.winner(), Some(Role::First));
    }

    #[test]
    fn detects_a_draw() {
        let mut board = Board::new();
        // X O X
        // X O O
        // O X X
        let moves = [
            (Role::First, 1),
            (Role::Second, 2),
            (Role::First, 3),
            (Role::Second, 5),
            (Role::First, 4),
            (Role::Second, 6),
            (Role::First, 8),
            (Role::Second, 7),
            (Role::First, 9),
        ];
        for (role, mv) in moves {
            board.apply_move(role, mv).unwrap();
        }
        assert!(board.is_over());
        assert_eq!(board.winner(), None);
    }

    #[test]
    fn rejects_move_on_occupied_square() {
        let mut board = Board::new();
        board.apply_move(Role::First, 5).unwrap();
        assert!(board.apply_move(Role::Second, 5).is_err());
    }

    #[test]
    fn rejects_move_out_of_range() {
        let board = Board::new();
        let mut board = board;
        assert!(board.apply_move(Role::First, 0).is_err());
        assert!(board.apply_move(Role::First, 10).is_err());
    }

    #[test]
    fn parses_a_move_with_an_agreeing_role_suffix() {
        let board = Board::new();
        assert_eq!(board.parse_move(Role::First, "5<-X").unwrap(), 5);
        assert_eq!(board.parse_move(Role::Second, "5<-O").unwrap(), 5);
    }

    #[test]
    fn rejects_a_move_whose_role_suffix_disagrees() {
        let board = Board::new();
        assert!(board.parse_move(Role::First, "5<-O").is_err());
        assert!(board.parse_move(Role::Second, "5<-X").is_err());
    }

    #[test]
    fn parses_a_bare_move_with_no_suffix() {
        let board = Board::new();
        assert_eq!(board.parse_move(Role::First, "7").unwrap(), 7);
    }
}
