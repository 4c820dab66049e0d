use crate::avatars::AvatarRegistry;
use log::{debug, error, info, warn};
use shared::{Player, PlayerId, ServerMessage};
use std::collections::HashMap;

/// What applying a server message did, for the caller to surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    /// Join succeeded; the replica was replaced and rendering may start.
    Joined,
    /// The replica changed (or the message was a harmless no-op).
    Updated,
    /// Players were added or removed.
    RosterChanged,
    JoinRejected(String),
    ServerError(String),
    Ignored,
}

/// Client-local replica of the shared world.
#[derive(Debug, Default)]
pub struct GameState {
    pub local_id: Option<PlayerId>,
    pub players: HashMap<PlayerId, Player>,
    pub avatars: AvatarRegistry,
}

impl GameState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one inbound message. Messages must be applied in arrival order.
    pub fn apply(&mut self, message: ServerMessage) -> Applied {
        match message {
            ServerMessage::JoinAccepted {
                player_id,
                players,
                avatars,
            } => {
                info!(
                    "Joined as {} ({} players, {} avatars)",
                    player_id,
                    players.len(),
                    avatars.len()
                );
                self.local_id = Some(player_id);
                self.players = players
                    .into_iter()
                    .map(|(id, mut player)| {
                        if player.id.is_empty() {
                            player.id.clone_from(&id);
                        }
                        (id, player)
                    })
                    .collect();
                self.avatars.replace_all(&avatars);
                Applied::Joined
            }

            ServerMessage::JoinRejected { error } => {
                warn!("Join rejected: {}", error);
                Applied::JoinRejected(error)
            }

            ServerMessage::PlayersMoved { players } => {
                for (id, patch) in &players {
                    match self.players.get_mut(id) {
                        Some(player) => patch.apply_to(player),
                        None => debug!("Ignoring movement for unknown player {}", id),
                    }
                }
                Applied::Updated
            }

            ServerMessage::PlayerJoined { player, avatar } => {
                let avatar_id = if avatar.name.is_empty() {
                    player.avatar.clone()
                } else {
                    avatar.name.clone()
                };
                if !self.avatars.contains(&avatar_id) {
                    self.avatars.register(&avatar_id, &avatar);
                }

                info!("{} joined", player.username);
                self.players.insert(player.id.clone(), player);
                Applied::RosterChanged
            }

            ServerMessage::PlayerLeft { player_id } => match self.players.remove(&player_id) {
                Some(player) => {
                    info!("{} left", player.username);
                    Applied::RosterChanged
                }
                None => Applied::Updated,
            },

            ServerMessage::Failure { error } => {
                error!("Server error: {}", error);
                Applied::ServerError(error)
            }

            ServerMessage::Ignored { action } => {
                debug!("Ignoring message with action {:?}", action);
                Applied::Ignored
            }
        }
    }

    pub fn local_player(&self) -> Option<&Player> {
        self.local_id.as_ref().and_then(|id| self.players.get(id))
    }

    /// Display names of every player, sorted.
    pub fn roster(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .players
            .values()
            .map(|player| player.username.as_str())
            .collect();
        names.sort_unstable();
        names
    }
}
