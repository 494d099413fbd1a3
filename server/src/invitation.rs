//! The invitation state machine binding two clients: OPEN (issued, not yet
//! answered), ACCEPTED (a game is in progress), CLOSED (revoked, declined,
//! or the bound game has ended).

use std::sync::{Arc, Mutex};

use engine::{CoreError, Game, GameEngine, Role};

use crate::client::Client;

/// Constructs a fresh board for a newly-accepted invitation. Stored as a
/// trait object rather than calling `tic_tac_toe::Board::new()` directly
/// so that `Invitation` depends only on the game-agnostic `engine` crate;
/// the server binary is the only place that names a concrete game.
pub type GameFactory = Arc<dyn Fn() -> Box<dyn GameEngine> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvitationState {
    Open,
    Accepted,
    Closed,
}

/// Why an invitation is being closed, passed to [`Invitation::close`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Revoke or decline: only legal while still OPEN and no game exists.
    NotStarted,
    /// `role` resigns from the in-progress game, if any.
    Resign(Role),
    /// The game reached a natural conclusion (win or draw); nobody
    /// resigned.
    Completed,
}

struct Inner {
    state: InvitationState,
    game: Option<Game>,
}

pub struct Invitation {
    source: Arc<Client>,
    target: Arc<Client>,
    source_role: Role,
    target_role: Role,
    inner: Mutex<Inner>,
}

impl Invitation {
    /// Creates a new OPEN invitation from `source` to `target`. Rejects
    /// self-invitations.
    pub fn new(
        source: Arc<Client>,
        target: Arc<Client>,
        source_role: Role,
        target_role: Role,
    ) -> Result<Arc<Invitation>, CoreError> {
        if Arc::ptr_eq(&source, &target) {
            return Err(CoreError::IllegalState(
                "a client cannot invite itself".into(),
            ));
        }
        Ok(Arc::new(Invitation {
            source,
            target,
            source_role,
            target_role,
            inner: Mutex::new(Inner {
                state: InvitationState::Open,
                game: None,
            }),
        }))
    }

    pub fn source(&self) -> &Arc<Client> {
        &self.source
    }

    pub fn target(&self) -> &Arc<Client> {
        &self.target
    }

    pub fn source_role(&self) -> Role {
        self.source_role
    }

    pub fn target_role(&self) -> Role {
        self.target_role
    }

    /// The role `client` plays in this invitation, or `None` if `client` is
    /// neither the source nor the target.
    pub fn role_of(&self, client: &Arc<Client>) -> Option<Role> {
        if Arc::ptr_eq(client, &self.source) {
            Some(self.source_role)
        } else if Arc::ptr_eq(client, &self.target) {
            Some(self.target_role)
        } else {
            None
        }
    }

    /// The other endpoint of this invitation relative to `client`.
    pub fn opponent_of(&self, client: &Arc<Client>) -> Option<&Arc<Client>> {
        if Arc::ptr_eq(client, &self.source) {
            Some(&self.target)
        } else if Arc::ptr_eq(client, &self.target) {
            Some(&self.source)
        } else {
            None
        }
    }

    pub fn state(&self) -> InvitationState {
        self.inner.lock().unwrap().state
    }

    pub fn has_game(&self) -> bool {
        self.inner.lock().unwrap().game.is_some()
    }

    /// Accepts an OPEN invitation, starting a game built by `factory`.
    pub fn accept(&self, factory: &GameFactory) -> Result<(), CoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.state != InvitationState::Open {
            return Err(CoreError::IllegalState(
                "invitation is not open to be accepted".into(),
            ));
        }
        inner.game = Some(Game::new(factory()));
        inner.state = InvitationState::Accepted;
        Ok(())
    }

    /// Closes the invitation. Every caller that can close one — revoke,
    /// decline, resignation, the natural end of a game, and the logout
    /// cascade — goes through this one check-then-set point, so the
    /// ACCEPTED/OPEN → CLOSED transition happens at most once no matter how
    /// many of those paths race: a caller's post-close work (notifying the
    /// peer, posting a rating update) can never run twice for the same
    /// invitation, which is what makes a concurrent resign-while-the-game-
    /// just-ended-naturally harmless rather than a double rating update.
    pub fn close(&self, reason: CloseReason) -> Result<(), CoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == InvitationState::Closed {
            return Err(CoreError::IllegalState(
                "invitation is already closed".into(),
            ));
        }
        match reason {
            CloseReason::NotStarted => {
                if inner.game.is_some() {
                    return Err(CoreError::IllegalState(
                        "invitation already has a game in progress".into(),
                    ));
                }
            }
            CloseReason::Resign(role) => {
                if let Some(game) = inner.game.as_mut() {
                    game.resign(role);
                }
            }
            CloseReason::Completed => {}
        }
        inner.state = InvitationState::Closed;
        Ok(())
    }

    /// Runs `f` against the invitation's game, if one exists.
    pub fn with_game<T>(&self, f: impl FnOnce(&Game) -> T) -> Result<T, CoreError> {
        let inner = self.inner.lock().unwrap();
        let game = inner
            .game
            .as_ref()
            .ok_or_else(|| CoreError::IllegalState("no game in progress".into()))?;
        Ok(f(game))
    }

    /// Runs `f` against the invitation's game mutably, if one exists.
    pub fn with_game_mut<T>(&self, f: impl FnOnce(&mut Game) -> T) -> Result<T, CoreError> {
        let mut inner = self.inner.lock().unwrap();
        let game = inner
            .game
            .as_mut()
            .ok_or_else(|| CoreError::IllegalState("no game in progress".into()))?;
        Ok(f(game))
    }
}
