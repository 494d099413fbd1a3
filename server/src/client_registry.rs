//! Tracks every currently-connected client, enforces the configured
//! connection cap, and supports the shutdown handshake used by graceful
//! termination: shut down every read side, then wait for the registry to
//! drain to zero as each connection's own service task notices EOF and
//! unregisters itself.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::net::TcpStream;
use tokio::sync::Notify;

use engine::CoreError;

use crate::client::Client;
use crate::player::Player;
use crate::player_registry::PlayerRegistry;

pub struct ClientRegistry {
    max_clients: usize,
    next_id: AtomicU64,
    clients: Mutex<HashMap<u64, Arc<Client>>>,
    empty: Notify,
}

impl ClientRegistry {
    pub fn new(max_clients: usize) -> Self {
        ClientRegistry {
            max_clients,
            next_id: AtomicU64::new(1),
            clients: Mutex::new(HashMap::new()),
            empty: Notify::new(),
        }
    }

    /// Registers a new connection, returning the newly-created `Client` if
    /// the registry is not already at capacity.
    pub fn register(&self, stream: Arc<TcpStream>, peer_addr: SocketAddr) -> Result<Arc<Client>, CoreError> {
        let mut clients = self.clients.lock().unwrap();
        if clients.len() >= self.max_clients {
            return Err(CoreError::CapacityExceeded(format!(
                "server is at its limit of {} connections",
                self.max_clients
            )));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let client = Client::new(id, stream, peer_addr);
        clients.insert(id, client.clone());
        Ok(client)
    }

    /// Removes `client` from the registry. The caller (the connection's own
    /// service task) is responsible for having already logged it out.
    pub fn unregister(&self, client: &Arc<Client>) {
        let mut clients = self.clients.lock().unwrap();
        clients.remove(&client.id());
        if clients.is_empty() {
            self.empty.notify_waiters();
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().unwrap().len()
    }

    /// All currently logged-in players, one entry per distinct client
    /// (a player can only be logged in from one client at a time, so this
    /// is also one entry per distinct player).
    pub fn all_players(&self) -> Vec<Arc<Player>> {
        self.clients
            .lock()
            .unwrap()
            .values()
            .filter_map(|client| client.player())
            .collect()
    }

    /// The client currently logged in under `name`, if any.
    pub fn lookup_by_name(&self, name: &str) -> Option<Arc<Client>> {
        self.clients
            .lock()
            .unwrap()
            .values()
            .find(|client| client.player().is_some_and(|p| p.name() == name))
            .cloned()
    }

    /// Atomically checks that `name` is not already claimed by some other
    /// live client and, if not, binds `client` to the player `players`
    /// returns for that name. The whole check-then-bind runs under the
    /// registry's single mutex — the lock §4.5 already says `register`,
    /// `unregister`, `lookup_by_username`, and friends serialize on — so
    /// two concurrent LOGIN requests for the same name can never both
    /// observe it as unclaimed and both succeed.
    pub fn login(
        &self,
        client: &Arc<Client>,
        name: &str,
        players: &PlayerRegistry,
    ) -> Result<(), CoreError> {
        let clients = self.clients.lock().unwrap();
        if client.is_logged_in() {
            return Err(CoreError::IllegalState(
                "this connection is already logged in".into(),
            ));
        }
        let already_claimed = clients
            .values()
            .any(|other| !Arc::ptr_eq(other, client) && other.player().is_some_and(|p| p.name() == name));
        if already_claimed {
            return Err(CoreError::Conflict(format!(
                "user {name:?} is already logged in from another connection"
            )));
        }
        let player = players.register(name);
        client.login(player)
    }

    /// Shuts down the read side of every currently registered connection.
    /// This function does **not** unregister or otherwise tear down the
    /// clients itself: each connection's own service task is expected to
    /// observe the resulting EOF, run its normal logout/unregister path,
    /// and exit on its own.
    pub fn shutdown_all(&self) {
        let snapshot: Vec<Arc<Client>> = self.clients.lock().unwrap().values().cloned().collect();
        for client in snapshot {
            client.shutdown_read();
        }
    }

    /// Waits until the registry has drained to zero clients. May be called
    /// concurrently by any number of tasks.
    pub async fn wait_for_empty(&self) {
        loop {
            let notified = self.empty.notified();
            if self.clients.lock().unwrap().is_empty() {
                return;
            }
            notified.await;
        }
    }
}
