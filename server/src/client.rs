//! Per-connection session state: login status, the set of invitations a
//! client currently holds (each under a small locally-assigned id), and
//! the serialized outbound half of the connection.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use socket2::SockRef;
use tokio::net::TcpStream;
use tokio::sync::Mutex as AsyncMutex;

use engine::CoreError;
use protocol::Frame;

use crate::invitation::Invitation;
use crate::player::Player;

/// One entry in a client's invitation list: the small id the wire protocol
/// uses to refer to this invitation from this client's point of view, plus
/// the invitation itself. Each side of an invitation keeps its own id for
/// it, assigned independently, so the same `Invitation` can appear under
/// different ids at its two endpoints.
#[derive(Clone)]
pub struct LocalInvitation {
    pub id: u8,
    pub invitation: Arc<Invitation>,
}

struct ClientState {
    player: Option<Arc<Player>>,
    invitations: Vec<LocalInvitation>,
}

/// A single client connection. `id` is a stable, monotonically-assigned
/// identifier used as a total lock order between two clients (see
/// [`crate::client_registry`]), distinct from the wire-level invitation ids
/// stored in `LocalInvitation`.
pub struct Client {
    id: u64,
    peer_addr: SocketAddr,
    stream: Arc<TcpStream>,
    write_lock: AsyncMutex<()>,
    state: Mutex<ClientState>,
}

impl Client {
    pub fn new(id: u64, stream: Arc<TcpStream>, peer_addr: SocketAddr) -> Arc<Client> {
        Arc::new(Client {
            id,
            peer_addr,
            stream,
            write_lock: AsyncMutex::new(()),
            state: Mutex::new(ClientState {
                player: None,
                invitations: Vec::new(),
            }),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Sends one frame. Sends from the same client are serialized against
    /// each other, independently of the client's session-state lock, so
    /// that a notification delivered from another connection's task can
    /// never interleave bytes with a reply this connection's own task is
    /// writing.
    pub async fn send(&self, frame: Frame) -> Result<(), CoreError> {
        let _guard = self.write_lock.lock().await;
        let mut writer = &*self.stream;
        protocol::write_frame(&mut writer, &frame)
            .await
            .map_err(|_| CoreError::Io(std::io::Error::other("send failed")))
    }

    /// Reads one frame. Only the connection's own service task ever reads,
    /// so no lock is needed here.
    pub async fn recv(&self) -> Result<Frame, protocol::ProtoError> {
        let mut reader = &*self.stream;
        protocol::read_frame(&mut reader).await
    }

    /// Half-closes the read side of the underlying socket so that a
    /// blocked read in this client's service task observes EOF, without
    /// forcibly severing the connection. Used by
    /// [`crate::client_registry::ClientRegistry::shutdown_all`].
    pub fn shutdown_read(&self) {
        let _ = SockRef::from(self.stream.as_ref()).shutdown(std::net::Shutdown::Read);
    }

    pub fn player(&self) -> Option<Arc<Player>> {
        self.state.lock().unwrap().player.clone()
    }

    pub fn is_logged_in(&self) -> bool {
        self.state.lock().unwrap().player.is_some()
    }

    /// Binds `player` to this connection. Fails if this connection is
    /// already logged in, or if some other currently-registered client is
    /// already logged in under the same player.
    pub fn login(&self, player: Arc<Player>) -> Result<(), CoreError> {
        let mut state = self.state.lock().unwrap();
        if state.player.is_some() {
            return Err(CoreError::IllegalState(
                "this connection is already logged in".into(),
            ));
        }
        state.player = Some(player);
        Ok(())
    }

    /// Clears the login state, returning the player that was logged in, if
    /// any. Logout proper (deciding what happens to outstanding
    /// invitations) is orchestrated by the dispatcher, which needs a
    /// stable snapshot of the invitation list before tearing anything
    /// down.
    pub fn logout(&self) -> Option<Arc<Player>> {
        self.state.lock().unwrap().player.take()
    }

    /// Assigns the smallest non-negative id not currently in use by this
    /// client's invitation list and records `invitation` under it.
    pub fn add_invitation(&self, invitation: Arc<Invitation>) -> u8 {
        let mut state = self.state.lock().unwrap();
        let mut id: u8 = 0;
        while state.invitations.iter().any(|entry| entry.id == id) {
            id += 1;
        }
        state.invitations.push(LocalInvitation { id, invitation });
        id
    }

    pub fn find_invitation(&self, id: u8) -> Option<Arc<Invitation>> {
        let state = self.state.lock().unwrap();
        state
            .invitations
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| entry.invitation.clone())
    }

    pub fn remove_invitation(&self, id: u8) -> Option<Arc<Invitation>> {
        let mut state = self.state.lock().unwrap();
        let index = state.invitations.iter().position(|entry| entry.id == id)?;
        Some(state.invitations.remove(index).invitation)
    }

    /// The id this client knows `invitation` under, if it is present in
    /// this client's own list. Used to address a notification to its
    /// recipient using that recipient's own id, never the sender's.
    pub fn local_id_of(&self, invitation: &Arc<Invitation>) -> Option<u8> {
        let state = self.state.lock().unwrap();
        state
            .invitations
            .iter()
            .find(|entry| Arc::ptr_eq(&entry.invitation, invitation))
            .map(|entry| entry.id)
    }

    /// A stable snapshot of this client's current invitations, taken under
    /// the state lock and then released. Logout walks this snapshot
    /// rather than the live list, so that revoking/declining/resigning one
    /// invitation along the way can never invalidate the iteration.
    pub fn invitations_snapshot(&self) -> Vec<LocalInvitation> {
        self.state.lock().unwrap().invitations.clone()
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .finish()
    }
}
