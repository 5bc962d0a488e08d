//! Wire messages shared between the buzzer server and its clients.
//!
//! Every frame is a JSON object carrying an integer `MessageType`
//! discriminator next to PascalCase payload fields, e.g.
//! `{"MessageType":5,"UserId":42,"Buzzing":true}`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Player identifiers are positive 31-bit integers.
pub type PlayerId = i32;

/// Name of the discriminator field present in every message.
pub const MESSAGE_TYPE_FIELD: &str = "MessageType";

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("message has no MessageType")]
    MissingType,
    #[error("unknown MessageType {0}")]
    UnknownType(i64),
    #[error("unexpected {0:?} message")]
    UnexpectedType(MessageType),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum MessageType {
    Init = 0,
    Connected = 1,
    Error = 2,
    GameStatus = 3,
    PlayerStatus = 4,
    BuzzAction = 5,
    Admin = 6,
    Quit = 7,
    KickPlayer = 8,
    Ping = 9,
}

impl TryFrom<i64> for MessageType {
    type Error = ProtocolError;

    fn try_from(value: i64) -> Result<Self, ProtocolError> {
        Ok(match value {
            0 => MessageType::Init,
            1 => MessageType::Connected,
            2 => MessageType::Error,
            3 => MessageType::GameStatus,
            4 => MessageType::PlayerStatus,
            5 => MessageType::BuzzAction,
            6 => MessageType::Admin,
            7 => MessageType::Quit,
            8 => MessageType::KickPlayer,
            9 => MessageType::Ping,
            other => return Err(ProtocolError::UnknownType(other)),
        })
    }
}

impl MessageType {
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// Game variants a client can ask for in its Init message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameType {
    Buzzer,
}

impl TryFrom<i32> for GameType {
    type Error = i32;

    fn try_from(value: i32) -> Result<Self, i32> {
        match value {
            0 => Ok(GameType::Buzzer),
            other => Err(other),
        }
    }
}

impl GameType {
    pub fn code(self) -> i32 {
        match self {
            GameType::Buzzer => 0,
        }
    }
}

/// Moderator commands carried by [`AdminMessage::command`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminCommand {
    /// Score the current buzzer and start the next round.
    Award,
    /// Lock the current buzzer out for the rest of the round.
    LockOut,
    NextRound,
    Reset,
    ClearBuzz,
}

impl TryFrom<i32> for AdminCommand {
    type Error = i32;

    fn try_from(value: i32) -> Result<Self, i32> {
        match value {
            0 => Ok(AdminCommand::Award),
            1 => Ok(AdminCommand::LockOut),
            2 => Ok(AdminCommand::NextRound),
            3 => Ok(AdminCommand::Reset),
            4 => Ok(AdminCommand::ClearBuzz),
            other => Err(other),
        }
    }
}

impl AdminCommand {
    pub fn code(self) -> i32 {
        match self {
            AdminCommand::Award => 0,
            AdminCommand::LockOut => 1,
            AdminCommand::NextRound => 2,
            AdminCommand::Reset => 3,
            AdminCommand::ClearBuzz => 4,
        }
    }
}

// Snapshot payloads

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BuzzStatus {
    pub buzzing: bool,
    pub locked_out: bool,
    pub score: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UserInfo {
    pub user_id: PlayerId,
    pub player_name: String,
    pub active: bool,
}

/// One roster row of a [`GameStatusMessage`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PlayerEntry {
    pub user_info: UserInfo,
    pub buzz_status: BuzzStatus,
}

// Client -> server

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct InitMessage {
    pub message_type: i32,
    pub server_id: String,
    pub game_type: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<PlayerId>,
    pub player_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct BuzzActionMessage {
    pub message_type: i32,
    pub user_id: PlayerId,
    pub buzzing: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct AdminMessage {
    pub message_type: i32,
    pub admin_id: String,
    pub command: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct KickPlayerMessage {
    pub message_type: i32,
    pub admin_id: String,
    pub user_id: PlayerId,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct QuitMessage {
    pub message_type: i32,
    pub user_id: PlayerId,
}

// Server -> client

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConnectedMessage {
    pub message_type: i32,
    pub user_id: PlayerId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ErrorMessage {
    pub message_type: i32,
    pub message_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GameStatusMessage {
    pub message_type: i32,
    pub status: Vec<PlayerEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PlayerStatusMessage {
    pub message_type: i32,
    pub status: BuzzStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PingMessage {
    pub message_type: i32,
}

/// Messages a client may send.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Init(InitMessage),
    BuzzAction(BuzzActionMessage),
    Admin(AdminMessage),
    KickPlayer(KickPlayerMessage),
    Quit(QuitMessage),
}

impl ClientMessage {
    /// Decodes a text frame by its `MessageType` tag.
    ///
    /// Server-only tags are rejected with [`ProtocolError::UnexpectedType`].
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let (message_type, value) = decode_tagged(text)?;
        Ok(match message_type {
            MessageType::Init => ClientMessage::Init(from_value(value)?),
            MessageType::BuzzAction => ClientMessage::BuzzAction(from_value(value)?),
            MessageType::Admin => ClientMessage::Admin(from_value(value)?),
            MessageType::KickPlayer => ClientMessage::KickPlayer(from_value(value)?),
            MessageType::Quit => ClientMessage::Quit(from_value(value)?),
            other => return Err(ProtocolError::UnexpectedType(other)),
        })
    }

    pub fn init(server_id: &str, game_type: GameType, user_id: Option<PlayerId>, name: &str) -> Self {
        ClientMessage::Init(InitMessage {
            message_type: MessageType::Init.code(),
            server_id: server_id.to_string(),
            game_type: game_type.code(),
            user_id,
            player_name: name.to_string(),
        })
    }

    pub fn buzz(user_id: PlayerId, buzzing: bool) -> Self {
        ClientMessage::BuzzAction(BuzzActionMessage {
            message_type: MessageType::BuzzAction.code(),
            user_id,
            buzzing,
        })
    }

    pub fn admin(admin_id: &str, command: i32) -> Self {
        ClientMessage::Admin(AdminMessage {
            message_type: MessageType::Admin.code(),
            admin_id: admin_id.to_string(),
            command,
        })
    }

    pub fn kick(admin_id: &str, user_id: PlayerId) -> Self {
        ClientMessage::KickPlayer(KickPlayerMessage {
            message_type: MessageType::KickPlayer.code(),
            admin_id: admin_id.to_string(),
            user_id,
        })
    }

    pub fn quit(user_id: PlayerId) -> Self {
        ClientMessage::Quit(QuitMessage {
            message_type: MessageType::Quit.code(),
            user_id,
        })
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        let text = match self {
            ClientMessage::Init(m) => serde_json::to_string(m)?,
            ClientMessage::BuzzAction(m) => serde_json::to_string(m)?,
            ClientMessage::Admin(m) => serde_json::to_string(m)?,
            ClientMessage::KickPlayer(m) => serde_json::to_string(m)?,
            ClientMessage::Quit(m) => serde_json::to_string(m)?,
        };
        Ok(text)
    }
}

/// Messages the server sends.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Connected(ConnectedMessage),
    Error(ErrorMessage),
    GameStatus(GameStatusMessage),
    PlayerStatus(PlayerStatusMessage),
    Ping(PingMessage),
}

impl ServerMessage {
    pub fn connected(user_id: PlayerId) -> Self {
        ServerMessage::Connected(ConnectedMessage {
            message_type: MessageType::Connected.code(),
            user_id,
        })
    }

    pub fn error(text: impl Into<String>) -> Self {
        ServerMessage::Error(ErrorMessage {
            message_type: MessageType::Error.code(),
            message_text: text.into(),
        })
    }

    pub fn game_status(status: Vec<PlayerEntry>) -> Self {
        ServerMessage::GameStatus(GameStatusMessage {
            message_type: MessageType::GameStatus.code(),
            status,
        })
    }

    pub fn player_status(status: BuzzStatus) -> Self {
        ServerMessage::PlayerStatus(PlayerStatusMessage {
            message_type: MessageType::PlayerStatus.code(),
            status,
        })
    }

    pub fn ping() -> Self {
        ServerMessage::Ping(PingMessage {
            message_type: MessageType::Ping.code(),
        })
    }

    pub fn message_type(&self) -> MessageType {
        match self {
            ServerMessage::Connected(_) => MessageType::Connected,
            ServerMessage::Error(_) => MessageType::Error,
            ServerMessage::GameStatus(_) => MessageType::GameStatus,
            ServerMessage::PlayerStatus(_) => MessageType::PlayerStatus,
            ServerMessage::Ping(_) => MessageType::Ping,
        }
    }

    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let (message_type, value) = decode_tagged(text)?;
        Ok(match message_type {
            MessageType::Connected => ServerMessage::Connected(from_value(value)?),
            MessageType::Error => ServerMessage::Error(from_value(value)?),
            MessageType::GameStatus => ServerMessage::GameStatus(from_value(value)?),
            MessageType::PlayerStatus => ServerMessage::PlayerStatus(from_value(value)?),
            MessageType::Ping => ServerMessage::Ping(from_value(value)?),
            other => return Err(ProtocolError::UnexpectedType(other)),
        })
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        let text = match self {
            ServerMessage::Connected(m) => serde_json::to_string(m)?,
            ServerMessage::Error(m) => serde_json::to_string(m)?,
            ServerMessage::GameStatus(m) => serde_json::to_string(m)?,
            ServerMessage::PlayerStatus(m) => serde_json::to_string(m)?,
            ServerMessage::Ping(m) => serde_json::to_string(m)?,
        };
        Ok(text)
    }
}

fn decode_tagged(text: &str) -> Result<(MessageType, serde_json::Value), ProtocolError> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    let tag = value
        .get(MESSAGE_TYPE_FIELD)
        .and_then(serde_json::Value::as_i64)
        .ok_or(ProtocolError::MissingType)?;
    Ok((MessageType::try_from(tag)?, value))
}

fn from_value<T: DeserializeOwned>(value: serde_json::Value) -> Result<T, ProtocolError> {
    Ok(serde_json::from_value(value)?)
}
