//! Maps player names to the single [`Player`] registered under that name,
//! creating it on first use. Unlike a client registry entry, a player
//! lives for as long as the server runs: logging out and back in under the
//! same name returns the same rating.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::player::Player;

#[derive(Default)]
pub struct PlayerRegistry {
    players: Mutex<HashMap<String, Arc<Player>>>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        PlayerRegistry::default()
    }

    /// Returns the existing player registered under `name`, or creates and
    /// registers a new one.
    pub fn register(&self, name: &str) -> Arc<Player> {
        let mut players = self.players.lock().unwrap();
        if let Some(existing) = players.get(name) {
            return existing.clone();
        }
        let player = Player::new(name);
        players.insert(name.to_string(), player.clone());
        player
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registering_the_same_name_twice_returns_the_same_player() {
        let registry = PlayerRegistry::new();
        let a = registry.register("alice");
        let b = registry.register("alice");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn distinct_names_get_distinct_players() {
        let registry = PlayerRegistry::new();
        let a = registry.register("alice");
        let b = registry.register("bob");
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
