//! Library half of the "Jeux" game server: the session and game-coordination
//! kernel described in the crate-level docs on `main.rs`. Split into a
//! library so the binary entry point and the integration tests in `tests/`
//! share one copy of the client/invitation/dispatcher machinery.

pub mod client;
pub mod client_registry;
pub mod dispatcher;
pub mod invitation;
pub mod player;
pub mod player_registry;
pub mod server_state;
