//! The per-connection protocol loop: decode one frame at a time, check it
//! against the connection's login state, perform the requested operation,
//! and reply with ACK (success) or NACK (failure) plus whatever
//! asynchronous notifications the operation produces for other clients.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use engine::{CoreError, Role};
use protocol::{Frame, ProtoError, packet_type, role as wire_role};

use crate::client::Client;
use crate::invitation::{CloseReason, InvitationState};
use crate::player::{self, MatchResult};
use crate::server_state::ServerState;

/// Runs the protocol loop for one connection until EOF, a fatal I/O error,
/// or the connection is shut down from outside (graceful server
/// shutdown). Always performs the logout cascade and unregisters the
/// client before returning, regardless of how the loop ended.
#[instrument(skip(server, client), fields(client_id = client.id(), peer = %client.peer_addr()))]
pub async fn serve_connection(server: Arc<ServerState>, client: Arc<Client>) {
    info!("client connected");
    loop {
        match client.recv().await {
            Ok(frame) => {
                if let Err(err) = handle_frame(&server, &client, frame).await {
                    warn!(%err, "fatal i/o error servicing client, closing connection");
                    break;
                }
            }
            Err(ProtoError::Eof) => {
                debug!("client disconnected");
                break;
            }
            Err(err) => {
                warn!(%err, "protocol error reading frame, closing connection");
                break;
            }
        }
    }

    logout_cascade(&client);
    server.clients.unregister(&client);
    info!("client unregistered");
}

async fn handle_frame(
    server: &Arc<ServerState>,
    client: &Arc<Client>,
    frame: Frame,
) -> Result<(), CoreError> {
    let id = frame.header.id;
    let result = match frame.header.packet_type {
        packet_type::LOGIN => handle_login(server, client, &frame).await,
        packet_type::USERS => handle_users(server, client).await,
        packet_type::INVITE => handle_invite(server, client, &frame).await,
        packet_type::REVOKE => handle_revoke(client, id).await,
        packet_type::DECLINE => handle_decline(client, id).await,
        packet_type::ACCEPT => handle_accept(server, client, id).await,
        packet_type::MOVE => handle_move(client, &frame).await,
        packet_type::RESIGN => handle_resign(client, id).await,
        other => {
            warn!(packet_type = other, "rejecting unrecognized packet type");
            Err(CoreError::IllegalState(format!(
                "unrecognized packet type {other}"
            )))
        }
    };

    match result {
        Ok(None) => Ok(()),
        Ok(Some(reply)) => client.send(reply).await,
        Err(CoreError::Io(io_err)) => Err(CoreError::Io(io_err)),
        Err(err) => {
            debug!(%err, "request rejected");
            client
                .send(Frame::empty(packet_type::NACK, id, wire_role::NONE))
                .await
        }
    }
}

fn require_logged_in(client: &Arc<Client>) -> Result<(), CoreError> {
    if client.is_logged_in() {
        Ok(())
    } else {
        Err(CoreError::IllegalState("not logged in".into()))
    }
}

async fn handle_login(
    server: &Arc<ServerState>,
    client: &Arc<Client>,
    frame: &Frame,
) -> Result<Option<Frame>, CoreError> {
    let name = frame.payload_str().trim().to_string();
    if name.is_empty() {
        return Err(CoreError::IllegalState("user name must not be empty".into()));
    }
    server.clients.login(client, &name, &server.players)?;
    info!(user = %name, "login succeeded");
    Ok(Some(Frame::empty(packet_type::ACK, 0, wire_role::NONE)))
}

async fn handle_users(server: &Arc<ServerState>, client: &Arc<Client>) -> Result<Option<Frame>, CoreError> {
    require_logged_in(client)?;
    let mut listing = String::new();
    for player in server.clients.all_players() {
        listing.push_str(&format!("{}\t{}\n", player.name(), player.rating()));
    }
    Ok(Some(Frame::text(packet_type::ACK, 0, wire_role::NONE, listing)))
}

async fn handle_invite(
    server: &Arc<ServerState>,
    client: &Arc<Client>,
    frame: &Frame,
) -> Result<Option<Frame>, CoreError> {
    require_logged_in(client)?;
    let source_role = Role::try_from(frame.header.role)
        .map_err(|_| CoreError::IllegalState("invite role must be first or second player".into()))?;
    let target_name = frame.payload_str().trim().to_string();
    let target = server
        .clients
        .lookup_by_name(&target_name)
        .ok_or_else(|| CoreError::NotFound(format!("no user named {target_name:?} is logged in")))?;

    let invitation = crate::invitation::Invitation::new(
        client.clone(),
        target.clone(),
        source_role,
        source_role.opponent(),
    )?;

    let source_id = client.add_invitation(invitation.clone());
    let target_id = target.add_invitation(invitation.clone());

    target
        .send(Frame::empty(packet_type::INVITED, target_id, source_role.opponent().into()))
        .await?;

    info!(target = %target_name, "invitation sent");
    Ok(Some(Frame::empty(packet_type::ACK, source_id, wire_role::NONE)))
}

async fn handle_revoke(client: &Arc<Client>, id: u8) -> Result<Option<Frame>, CoreError> {
    require_logged_in(client)?;
    let invitation = client
        .find_invitation(id)
        .ok_or_else(|| CoreError::NotFound(format!("no invitation with id {id}")))?;
    if invitation.role_of(client) != Some(invitation.source_role()) {
        return Err(CoreError::IllegalState(
            "only the inviting client can revoke an invitation".into(),
        ));
    }
    invitation.close(CloseReason::NotStarted)?;
    client.remove_invitation(id);

    let target = invitation.target();
    if let Some(target_id) = target.local_id_of(&invitation) {
        target.remove_invitation(target_id);
        let _ = target
            .send(Frame::empty(packet_type::REVOKED, target_id, wire_role::NONE))
            .await;
    }

    Ok(Some(Frame::empty(packet_type::ACK, id, wire_role::NONE)))
}

async fn handle_decline(client: &Arc<Client>, id: u8) -> Result<Option<Frame>, CoreError> {
    require_logged_in(client)?;
    let invitation = client
        .find_invitation(id)
        .ok_or_else(|| CoreError::NotFound(format!("no invitation with id {id}")))?;
    if invitation.role_of(client) != Some(invitation.target_role()) {
        return Err(CoreError::IllegalState(
            "only the invited client can decline an invitation".into(),
        ));
    }
    invitation.close(CloseReason::NotStarted)?;
    client.remove_invitation(id);

    let source = invitation.source();
    if let Some(source_id) = source.local_id_of(&invitation) {
        source.remove_invitation(source_id);
        let _ = source
            .send(Frame::empty(packet_type::DECLINED, source_id, wire_role::NONE))
            .await;
    }

    Ok(Some(Frame::empty(packet_type::ACK, id, wire_role::NONE)))
}

async fn handle_accept(
    server: &Arc<ServerState>,
    client: &Arc<Client>,
    id: u8,
) -> Result<Option<Frame>, CoreError> {
    require_logged_in(client)?;
    let invitation = client
        .find_invitation(id)
        .ok_or_else(|| CoreError::NotFound(format!("no invitation with id {id}")))?;
    if invitation.role_of(client) != Some(invitation.target_role()) {
        return Err(CoreError::IllegalState(
            "only the invited client can accept an invitation".into(),
        ));
    }
    invitation.accept(&server.game_factory)?;

    let state_text = invitation.with_game(|game| game.unparse_state())?;
    let mover_role = invitation.with_game(|game| game.turn())?;

    let source = invitation.source();
    let source_id = source
        .local_id_of(&invitation)
        .ok_or_else(|| CoreError::IllegalState("source lost track of its own invitation".into()))?;

    // Whichever side moves first is handed the initial board text in its
    // own immediate reply channel: the accepting client gets it in the ACK
    // to its ACCEPT request, the inviting client gets it in the ACCEPTED
    // notification.
    let (ack_payload, accepted_payload) = if mover_role == invitation.source_role() {
        (String::new(), state_text)
    } else {
        (state_text, String::new())
    };

    let _ = source
        .send(Frame::text(packet_type::ACCEPTED, source_id, wire_role::NONE, accepted_payload))
        .await;

    info!("invitation accepted, game started");
    Ok(Some(Frame::text(packet_type::ACK, id, wire_role::NONE, ack_payload)))
}

async fn handle_move(client: &Arc<Client>, frame: &Frame) -> Result<Option<Frame>, CoreError> {
    require_logged_in(client)?;
    let id = frame.header.id;
    let invitation = client
        .find_invitation(id)
        .ok_or_else(|| CoreError::NotFound(format!("no invitation with id {id}")))?;
    let role = invitation
        .role_of(client)
        .ok_or_else(|| CoreError::IllegalState("not a party to this invitation".into()))?;

    let move_text = frame.payload_str().to_string();
    let mv = invitation.with_game(|game| game.parse_move(role, &move_text))??;
    invitation.with_game_mut(|game| game.apply_move(role, mv))??;

    let state_text = invitation.with_game(|game| game.unparse_state())?;
    let now_over = invitation.with_game(|game| game.is_over())?;

    if let Some(opponent) = invitation.opponent_of(client) {
        if let Some(opponent_id) = opponent.local_id_of(&invitation) {
            let _ = opponent
                .send(Frame::text(packet_type::MOVED, opponent_id, wire_role::NONE, state_text.clone()))
                .await;
        }
    }

    if now_over {
        finish_game(&invitation).await?;
    }

    Ok(Some(Frame::empty(packet_type::ACK, id, wire_role::NONE)))
}

async fn handle_resign(client: &Arc<Client>, id: u8) -> Result<Option<Frame>, CoreError> {
    require_logged_in(client)?;
    let invitation = client
        .find_invitation(id)
        .ok_or_else(|| CoreError::NotFound(format!("no invitation with id {id}")))?;
    let role = invitation
        .role_of(client)
        .ok_or_else(|| CoreError::IllegalState("not a party to this invitation".into()))?;
    if !invitation.has_game() {
        return Err(CoreError::IllegalState("no game in progress to resign".into()));
    }

    invitation.close(CloseReason::Resign(role))?;

    if let Some(opponent) = invitation.opponent_of(client) {
        if let Some(opponent_id) = opponent.local_id_of(&invitation) {
            let _ = opponent
                .send(Frame::empty(packet_type::RESIGNED, opponent_id, role.into()))
                .await;
        }
    }

    settle_rating(&invitation);
    client.remove_invitation(id);
    if let Some(opponent) = invitation.opponent_of(client) {
        if let Some(opponent_id) = opponent.local_id_of(&invitation) {
            opponent.remove_invitation(opponent_id);
        }
    }

    Ok(Some(Frame::empty(packet_type::ACK, id, wire_role::NONE)))
}

/// Shared tail of a move that ended the game naturally: notify both
/// endpoints with their own local ids, post the rating update, and drop
/// the invitation from both client's lists. Goes through the same
/// [`CloseReason::Completed`] check-then-set as every other close path, so
/// if the opponent's own RESIGN raced this and closed the invitation
/// first, this becomes a no-op rather than a second notification and a
/// second rating update for the same game.
async fn finish_game(invitation: &Arc<crate::invitation::Invitation>) -> Result<(), CoreError> {
    if invitation.close(CloseReason::Completed).is_err() {
        return Ok(());
    }

    let outcome = invitation.with_game(|game| game.outcome())?;

    let winner_role_byte = match outcome {
        engine::Outcome::Won(role) => role.into(),
        _ => wire_role::NONE,
    };

    for endpoint in [invitation.source(), invitation.target()] {
        if let Some(local_id) = endpoint.local_id_of(invitation) {
            let _ = endpoint
                .send(Frame::empty(packet_type::ENDED, local_id, winner_role_byte))
                .await;
        }
    }

    settle_rating(invitation);

    let source = invitation.source();
    let target = invitation.target();
    if let Some(id) = source.local_id_of(invitation) {
        source.remove_invitation(id);
    }
    if let Some(id) = target.local_id_of(invitation) {
        target.remove_invitation(id);
    }

    Ok(())
}

fn settle_rating(invitation: &Arc<crate::invitation::Invitation>) {
    let outcome = match invitation.with_game(|game| game.outcome()) {
        Ok(outcome) => outcome,
        Err(_) => return,
    };
    let (Some(source_player), Some(target_player)) =
        (invitation.source().player(), invitation.target().player())
    else {
        return;
    };

    let source_role = invitation.source_role();
    let result = match outcome {
        engine::Outcome::Draw => MatchResult::Draw,
        engine::Outcome::Won(role) if role == source_role => MatchResult::FirstWon,
        engine::Outcome::Won(_) => MatchResult::SecondWon,
        engine::Outcome::InProgress => return,
    };
    player::post_result(&source_player, &target_player, result);
}

/// Cleans up every invitation this client is holding, as part of
/// disconnect. Takes a stable snapshot first so that closing one
/// invitation (which may remove entries from other lists, never this
/// one) cannot invalidate the iteration.
fn logout_cascade(client: &Arc<Client>) {
    if client.logout().is_none() {
        return;
    }

    for entry in client.invitations_snapshot() {
        let invitation = entry.invitation;
        let Some(role) = invitation.role_of(client) else {
            continue;
        };
        match invitation.state() {
            InvitationState::Open => {
                if invitation.close(CloseReason::NotStarted).is_ok() {
                    notify_peer_of_close(client, &invitation, role);
                }
            }
            InvitationState::Accepted => {
                if invitation.close(CloseReason::Resign(role)).is_ok() {
                    settle_rating(&invitation);
                    notify_peer_of_resignation(client, &invitation, role);
                }
            }
            InvitationState::Closed => {}
        }
        client.remove_invitation(entry.id);
    }
}

fn notify_peer_of_close(client: &Arc<Client>, invitation: &Arc<crate::invitation::Invitation>, role: Role) {
    let Some(peer) = invitation.opponent_of(client) else {
        return;
    };
    let Some(peer_id) = peer.local_id_of(invitation) else {
        return;
    };
    peer.remove_invitation(peer_id);
    let packet = if role == invitation.source_role() {
        packet_type::REVOKED
    } else {
        packet_type::DECLINED
    };
    let peer = peer.clone();
    tokio::spawn(async move {
        let _ = peer.send(Frame::empty(packet, peer_id, wire_role::NONE)).await;
    });
}

fn notify_peer_of_resignation(client: &Arc<Client>, invitation: &Arc<crate::invitation::Invitation>, role: Role) {
    let Some(peer) = invitation.opponent_of(client) else {
        return;
    };
    let Some(peer_id) = peer.local_id_of(invitation) else {
        return;
    };
    peer.remove_invitation(peer_id);
    let peer = peer.clone();
    tokio::spawn(async move {
        let _ = peer
            .send(Frame::empty(packet_type::RESIGNED, peer_id, role.into()))
            .await;
    });
}
