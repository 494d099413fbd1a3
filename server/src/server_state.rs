//! The handful of objects shared by every connection's service task:
//! the two registries and the factory used to build a fresh board when an
//! invitation is accepted.

use crate::client_registry::ClientRegistry;
use crate::invitation::GameFactory;
use crate::player_registry::PlayerRegistry;

pub struct ServerState {
    pub clients: ClientRegistry,
    pub players: PlayerRegistry,
    pub game_factory: GameFactory,
}

impl ServerState {
    pub fn new(max_clients: usize, game_factory: GameFactory) -> Self {
        ServerState {
            clients: ClientRegistry::new(max_clients),
            players: PlayerRegistry::new(),
            game_factory,
        }
    }
}
