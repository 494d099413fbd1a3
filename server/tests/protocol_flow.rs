//! End-to-end protocol tests driving real TCP connections through the full
//! accept/dispatch/notify path, matching the scenarios spec.md §8 lays out
//! literally (S1 login/users, S2 invite/revoke, S3 accept with the target
//! moving first, S4 a full game plus rating change, S5 the logout cascade,
//! S6 rejecting a move played out of turn).

use std::sync::Arc;
use std::time::Duration;

use engine::GameEngine;
use protocol::{Frame, packet_type, read_frame, role as wire_role, write_frame};
use server::invitation::GameFactory;
use server::server_state::ServerState;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

fn tic_tac_toe_factory() -> GameFactory {
    Arc::new(|| Box::new(tic_tac_toe::Board::new()) as Box<dyn GameEngine>)
}

/// Starts a server on an ephemeral loopback port and returns its address
/// plus the shared state, so a test can also inspect ratings directly.
async fn start_server(max_clients: usize) -> (std::net::SocketAddr, Arc<ServerState>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = Arc::new(ServerState::new(max_clients, tic_tac_toe_factory()));

    let accept_state = state.clone();
    tokio::spawn(async move {
        loop {
            let (stream, peer_addr) = match listener.accept().await {
                Ok(pair) => pair,
                Err(_) => return,
            };
            match accept_state.clients.register(Arc::new(stream), peer_addr) {
                Ok(client) => {
                    let state = accept_state.clone();
                    tokio::spawn(async move {
                        server::dispatcher::serve_connection(state, client).await;
                    });
                }
                Err(_) => continue,
            }
        }
    });

    (addr, state)
}

async fn connect(addr: std::net::SocketAddr) -> TcpStream {
    TcpStream::connect(addr).await.unwrap()
}

async fn send(stream: &mut TcpStream, frame: Frame) {
    write_frame(stream, &frame).await.unwrap();
}

async fn recv(stream: &mut TcpStream) -> Frame {
    timeout(Duration::from_secs(2), read_frame(stream))
        .await
        .expect("timed out waiting for a frame")
        .unwrap()
}

async fn login(stream: &mut TcpStream, name: &str) {
    send(stream, Frame::text(packet_type::LOGIN, 0, wire_role::NONE, name)).await;
    let reply = recv(stream).await;
    assert_eq!(reply.header.packet_type, packet_type::ACK, "login as {name:?} should succeed");
}

async fn mv(stream: &mut TcpStream, id: u8, text: &str) {
    send(stream, Frame::text(packet_type::MOVE, id, wire_role::NONE, text)).await;
}

#[tokio::test]
async fn s1_login_and_users() {
    let (addr, _state) = start_server(64).await;

    let mut a = connect(addr).await;
    login(&mut a, "alice").await;

    send(&mut a, Frame::empty(packet_type::USERS, 0, wire_role::NONE)).await;
    let reply = recv(&mut a).await;
    assert_eq!(reply.header.packet_type, packet_type::ACK);
    assert_eq!(reply.payload_str(), "alice\t1500\n");

    let mut b = connect(addr).await;
    // "alice" is still logged in on connection `a` -> NACK for `b`.
    send(&mut b, Frame::text(packet_type::LOGIN, 0, wire_role::NONE, "alice")).await;
    let reply = recv(&mut b).await;
    assert_eq!(reply.header.packet_type, packet_type::NACK);

    login(&mut b, "bob").await;

    send(&mut a, Frame::empty(packet_type::USERS, 0, wire_role::NONE)).await;
    let reply = recv(&mut a).await;
    let listing = reply.payload_str().into_owned();
    assert!(listing.contains("alice\t1500\n"));
    assert!(listing.contains("bob\t1500\n"));
}

#[tokio::test]
async fn s2_invite_then_revoke() {
    let (addr, _state) = start_server(64).await;
    let mut a = connect(addr).await;
    let mut b = connect(addr).await;
    login(&mut a, "alice").await;
    login(&mut b, "bob").await;

    send(&mut a, Frame::text(packet_type::INVITE, 0, wire_role::FIRST_PLAYER, "bob")).await;
    let ack = recv(&mut a).await;
    assert_eq!(ack.header.packet_type, packet_type::ACK);
    assert_eq!(ack.header.id, 0);

    let invited = recv(&mut b).await;
    assert_eq!(invited.header.packet_type, packet_type::INVITED);
    assert_eq!(invited.header.role, wire_role::SECOND_PLAYER);
    let b_id = invited.header.id;

    send(&mut a, Frame::empty(packet_type::REVOKE, 0, wire_role::NONE)).await;
    let ack = recv(&mut a).await;
    assert_eq!(ack.header.packet_type, packet_type::ACK);

    let revoked = recv(&mut b).await;
    assert_eq!(revoked.header.packet_type, packet_type::REVOKED);
    assert_eq!(revoked.header.id, b_id);
}

/// S3: Alice invites herself as SECOND_PLAYER, so Bob (the target) plays
/// FIRST and moves first once he accepts. Also covers S6: a second MOVE
/// from Bob before Alice has replied is out of turn and must be rejected
/// without a MOVED reaching Alice.
#[tokio::test]
async fn s3_accept_with_target_moving_first_then_reject_out_of_turn_move() {
    let (addr, _state) = start_server(64).await;
    let mut a = connect(addr).await;
    let mut b = connect(addr).await;
    login(&mut a, "alice").await;
    login(&mut b, "bob").await;

    send(&mut a, Frame::text(packet_type::INVITE, 0, wire_role::SECOND_PLAYER, "bob")).await;
    recv(&mut a).await; // ACK
    let invited = recv(&mut b).await;
    assert_eq!(invited.header.role, wire_role::FIRST_PLAYER);
    let b_id = invited.header.id;

    send(&mut b, Frame::empty(packet_type::ACCEPT, b_id, wire_role::NONE)).await;
    let ack = recv(&mut b).await;
    assert_eq!(ack.header.packet_type, packet_type::ACK);
    assert!(ack.payload_str().contains("X to move"));

    let accepted = recv(&mut a).await;
    assert_eq!(accepted.header.packet_type, packet_type::ACCEPTED);
    assert_eq!(accepted.payload_len(), 0);

    mv(&mut b, b_id, "1").await;
    let ack = recv(&mut b).await;
    assert_eq!(ack.header.packet_type, packet_type::ACK);
    let moved = recv(&mut a).await;
    assert_eq!(moved.header.packet_type, packet_type::MOVED);

    // Bob tries to move again immediately; it is Alice's turn now.
    mv(&mut b, b_id, "2").await;
    let ack = recv(&mut b).await;
    assert_eq!(
        ack.header.packet_type,
        packet_type::NACK,
        "a second consecutive move by the same side must be rejected"
    );
}

/// S4: plays a full game to completion and checks both the ENDED
/// notifications and the resulting rating change (equal starting ratings,
/// so the winner gains and the loser loses the same amount).
#[tokio::test]
async fn s4_full_game_ends_with_a_winner_and_updates_ratings() {
    let (addr, state) = start_server(64).await;
    let mut a = connect(addr).await;
    let mut b = connect(addr).await;
    login(&mut a, "alice").await;
    login(&mut b, "bob").await;

    // Alice invites herself as FIRST_PLAYER (X), so she moves first.
    send(&mut a, Frame::text(packet_type::INVITE, 0, wire_role::FIRST_PLAYER, "bob")).await;
    recv(&mut a).await; // ACK, id 0 for alice
    let invited = recv(&mut b).await;
    let b_id = invited.header.id;

    send(&mut b, Frame::empty(packet_type::ACCEPT, b_id, wire_role::NONE)).await;
    let ack = recv(&mut b).await;
    assert_eq!(ack.header.packet_type, packet_type::ACK);
    assert_eq!(ack.payload_len(), 0, "target does not move first here");
    let accepted = recv(&mut a).await;
    assert_eq!(accepted.header.packet_type, packet_type::ACCEPTED);
    assert!(accepted.payload_str().contains("X to move"));
    let a_id = 0u8;

    // Alice (X) completes the top row 1-2-3 on her third move; nobody
    // plays into that row in between so it only completes on her move.
    let sequence: [(bool, &str); 5] = [
        (true, "1"),  // alice
        (false, "4"), // bob
        (true, "2"),  // alice
        (false, "5"), // bob
        (true, "3"),  // alice wins
    ];

    let last = sequence.len() - 1;
    for (i, (is_alice, text)) in sequence.into_iter().enumerate() {
        let (mover, mover_id, watcher) = if is_alice {
            (&mut a, a_id, &mut b)
        } else {
            (&mut b, b_id, &mut a)
        };
        mv(mover, mover_id, text).await;

        if i == last {
            // The winning move: the mover's own ENDED (queued ahead of its
            // ACK by `finish_game`) arrives before the ACK; the watcher's
            // MOVED arrives before its own ENDED.
            let ended_for_mover = recv(mover).await;
            assert_eq!(ended_for_mover.header.packet_type, packet_type::ENDED);
            assert_eq!(ended_for_mover.header.role, wire_role::FIRST_PLAYER);
            assert_eq!(ended_for_mover.payload_len(), 0, "ENDED carries no payload");
            let ack = recv(mover).await;
            assert_eq!(ack.header.packet_type, packet_type::ACK);

            let moved = recv(watcher).await;
            assert_eq!(moved.header.packet_type, packet_type::MOVED);
            let ended_for_watcher = recv(watcher).await;
            assert_eq!(ended_for_watcher.header.packet_type, packet_type::ENDED);
            assert_eq!(ended_for_watcher.header.role, wire_role::FIRST_PLAYER);
            assert_eq!(ended_for_watcher.payload_len(), 0, "ENDED carries no payload");
        } else {
            let ack = recv(mover).await;
            assert_eq!(ack.header.packet_type, packet_type::ACK, "move {text:?} should be accepted");
            let moved = recv(watcher).await;
            assert_eq!(moved.header.packet_type, packet_type::MOVED);
        }
    }

    let players = state.clients.all_players();
    let alice = players.iter().find(|p| p.name() == "alice").unwrap();
    let bob = players.iter().find(|p| p.name() == "bob").unwrap();
    assert_eq!(alice.rating(), 1500 + 16);
    assert_eq!(bob.rating(), 1500 - 16);
}

/// S5: a client that is the source of one OPEN invitation and party to one
/// ACCEPTED game disconnects. The open invitation's target gets REVOKED;
/// the game opponent gets RESIGNED and their rating rises.
#[tokio::test]
async fn s5_disconnect_revokes_open_invitations_and_resigns_active_games() {
    let (addr, state) = start_server(64).await;
    let mut a = connect(addr).await;
    let mut b = connect(addr).await;
    let mut c = connect(addr).await;
    login(&mut a, "alice").await;
    login(&mut b, "bob").await;
    login(&mut c, "carol").await;

    // A -> B: still OPEN.
    send(&mut a, Frame::text(packet_type::INVITE, 0, wire_role::FIRST_PLAYER, "bob")).await;
    recv(&mut a).await;
    let invited_b = recv(&mut b).await;
    let b_id = invited_b.header.id;

    // A -> C: accepted into a live game, C (target) moves first.
    send(&mut a, Frame::text(packet_type::INVITE, 0, wire_role::SECOND_PLAYER, "carol")).await;
    recv(&mut a).await;
    let invited_c = recv(&mut c).await;
    let c_id = invited_c.header.id;
    send(&mut c, Frame::empty(packet_type::ACCEPT, c_id, wire_role::NONE)).await;
    recv(&mut c).await;
    recv(&mut a).await; // ACCEPTED

    drop(a);

    let revoked = recv(&mut b).await;
    assert_eq!(revoked.header.packet_type, packet_type::REVOKED);
    assert_eq!(revoked.header.id, b_id);

    let resigned = recv(&mut c).await;
    assert_eq!(resigned.header.packet_type, packet_type::RESIGNED);
    assert_eq!(resigned.header.id, c_id);

    // Give the disconnecting task a moment to finish its logout cascade
    // before asserting on registry-wide state.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let carol = state
        .clients
        .all_players()
        .into_iter()
        .find(|p| p.name() == "carol")
        .unwrap();
    assert!(carol.rating() > 1500, "carol should have won by alice's resignation");
}
