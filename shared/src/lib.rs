//! Wire protocol and data model shared by the world viewer.
//!
//! Every message is a single JSON object. Outbound messages carry an `action`
//! tag; inbound messages are discriminated by `action` and, for failures, by
//! `success: false`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

pub type PlayerId = String;
pub type AvatarId = String;

/// Direction a player sprite is oriented, as reported by the server.
///
/// The wire uses compass names; screen names are accepted as aliases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    #[serde(alias = "up")]
    North,
    #[default]
    #[serde(alias = "down")]
    South,
    #[serde(alias = "right")]
    East,
    #[serde(alias = "left")]
    West,
}

impl Facing {
    pub const ALL: [Facing; 4] = [Facing::North, Facing::South, Facing::East, Facing::West];

    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "north" | "up" => Some(Facing::North),
            "south" | "down" => Some(Facing::South),
            "east" | "right" => Some(Facing::East),
            "west" | "left" => Some(Facing::West),
            _ => None,
        }
    }

    /// West is drawn by flipping art horizontally instead of storing it separately.
    pub fn is_mirrored(self) -> bool {
        self == Facing::West
    }

    /// The stored direction whose frames stand in for this one when it has none.
    pub fn mirror_source(self) -> Option<Self> {
        match self {
            Facing::West => Some(Facing::East),
            _ => None,
        }
    }
}

/// Logical movement direction carried by outbound `move` intents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    #[serde(default)]
    pub id: PlayerId,
    #[serde(default)]
    pub username: String,
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub avatar: AvatarId,
    #[serde(default)]
    pub facing: Facing,
    #[serde(default)]
    pub animation_frame: u32,
}

impl Player {
    pub fn new(id: &str, username: &str, avatar: &str, x: f32, y: f32) -> Self {
        Self {
            id: id.to_string(),
            username: username.to_string(),
            x,
            y,
            avatar: avatar.to_string(),
            facing: Facing::default(),
            animation_frame: 0,
        }
    }
}

/// Partial player update from `players_moved`; absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facing: Option<Facing>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub animation_frame: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<AvatarId>,
}

impl PlayerPatch {
    pub fn apply_to(&self, player: &mut Player) {
        if let Some(x) = self.x {
            player.x = x;
        }
        if let Some(y) = self.y {
            player.y = y;
        }
        if let Some(facing) = self.facing {
            player.facing = facing;
        }
        if let Some(frame) = self.animation_frame {
            player.animation_frame = frame;
        }
        if let Some(username) = &self.username {
            player.username.clone_from(username);
        }
        if let Some(avatar) = &self.avatar {
            player.avatar.clone_from(avatar);
        }
    }
}

/// Avatar as delivered on the wire: encoded image payloads keyed by facing name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AvatarPayload {
    #[serde(default)]
    pub name: AvatarId,
    #[serde(default)]
    pub frames: HashMap<String, Vec<String>>,
}

impl AvatarPayload {
    /// Frame payloads for every recognised facing; unknown keys are skipped.
    pub fn frames_by_facing(&self) -> impl Iterator<Item = (Facing, &[String])> {
        self.frames
            .iter()
            .filter_map(|(key, frames)| Facing::from_wire(key).map(|f| (f, frames.as_slice())))
    }
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("message is not a JSON object")]
    NotAnObject,
    #[error("join acknowledgement is missing `{0}`")]
    MissingField(&'static str),
}

/// Messages sent from the viewer to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientMessage {
    JoinGame { username: String },
    Move { direction: Direction },
    Stop,
}

impl ClientMessage {
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Messages received from the server, closed over the kinds the viewer acts on.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    JoinAccepted {
        player_id: PlayerId,
        players: HashMap<PlayerId, Player>,
        avatars: HashMap<AvatarId, AvatarPayload>,
    },
    JoinRejected {
        error: String,
    },
    PlayersMoved {
        players: HashMap<PlayerId, PlayerPatch>,
    },
    PlayerJoined {
        player: Player,
        avatar: AvatarPayload,
    },
    PlayerLeft {
        player_id: PlayerId,
    },
    Failure {
        error: String,
    },
    /// Unrecognised kind, kept so callers can log it instead of dropping silently.
    Ignored {
        action: Option<String>,
    },
}

#[derive(Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum Envelope {
    JoinGame(JoinReply),
    PlayersMoved {
        #[serde(default)]
        players: HashMap<PlayerId, PlayerPatch>,
    },
    PlayerJoined {
        player: Player,
        avatar: AvatarPayload,
    },
    PlayerLeft {
        #[serde(rename = "playerId")]
        player_id: PlayerId,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JoinReply {
    success: bool,
    player_id: Option<PlayerId>,
    #[serde(default)]
    players: HashMap<PlayerId, Player>,
    #[serde(default)]
    avatars: HashMap<AvatarId, AvatarPayload>,
    error: Option<String>,
}

const UNKNOWN_ERROR: &str = "unknown error";

impl ServerMessage {
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let object = value.as_object().ok_or(ProtocolError::NotAnObject)?;

        let failed = object.get("success") == Some(&Value::Bool(false));
        let error = object
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or(UNKNOWN_ERROR)
            .to_string();
        let action = object
            .get("action")
            .and_then(Value::as_str)
            .map(str::to_string);

        if object.get("action").is_none() {
            return Ok(if failed {
                ServerMessage::Failure { error }
            } else {
                ServerMessage::Ignored { action: None }
            });
        }

        let message = match serde_json::from_value::<Envelope>(value)? {
            Envelope::JoinGame(reply) if reply.success => ServerMessage::JoinAccepted {
                player_id: reply.player_id.ok_or(ProtocolError::MissingField("playerId"))?,
                players: reply.players,
                avatars: reply.avatars,
            },
            Envelope::JoinGame(reply) => ServerMessage::JoinRejected {
                error: reply.error.unwrap_or_else(|| UNKNOWN_ERROR.to_string()),
            },
            Envelope::PlayersMoved { players } => ServerMessage::PlayersMoved { players },
            Envelope::PlayerJoined { player, avatar } => {
                ServerMessage::PlayerJoined { player, avatar }
            }
            Envelope::PlayerLeft { player_id } => ServerMessage::PlayerLeft { player_id },
            Envelope::Other if failed => ServerMessage::Failure { error },
            Envelope::Other => ServerMessage::Ignored { action },
        };

        Ok(message)
    }
}
