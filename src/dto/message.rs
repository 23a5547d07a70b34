//! Wire vocabulary exchanged over a machine topic.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::dto::ids::{SessionToken, SlotId};

/// Slot driven by every key outside of [`KEY_SLOT_TABLE`].
pub const PRIMARY_SLOT: SlotId = 1;

/// Fixed letter to slot assignment used by letter-driven games.
pub const KEY_SLOT_TABLE: [(char, SlotId); 3] = [('A', 1), ('L', 2), ('M', 3)];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
/// Messages flowing between phones and the kiosk host.
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameMessage {
    /// Claim or re-affirm a player slot.
    Join {
        #[serde(rename = "playerId")]
        player_id: SlotId,
        #[serde(
            rename = "sessionId",
            default,
            skip_serializing_if = "SessionToken::is_anonymous"
        )]
        #[schema(value_type = Option<String>)]
        session_id: SessionToken,
    },
    /// Logical button press.
    Keydown {
        key: String,
        #[serde(
            rename = "sessionId",
            default,
            skip_serializing_if = "SessionToken::is_anonymous"
        )]
        #[schema(value_type = Option<String>)]
        session_id: SessionToken,
    },
    /// Rapid-repeat input for the tap race.
    Tap {
        #[serde(rename = "playerId")]
        player_id: SlotId,
        #[serde(
            rename = "sessionId",
            default,
            skip_serializing_if = "SessionToken::is_anonymous"
        )]
        #[schema(value_type = Option<String>)]
        session_id: SessionToken,
    },
    /// Request to leave the lobby.
    Start {
        #[serde(
            rename = "sessionId",
            default,
            skip_serializing_if = "SessionToken::is_anonymous"
        )]
        #[schema(value_type = Option<String>)]
        session_id: SessionToken,
    },
    /// Authoritative state broadcast, or a reply filtered by `sessionId`.
    StateChange {
        state: RemoteState,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        game: Option<ControlLayout>,
        #[serde(rename = "paymentUrl", default, skip_serializing_if = "Option::is_none")]
        payment_url: Option<String>,
        #[serde(
            rename = "sessionId",
            default,
            skip_serializing_if = "SessionToken::is_anonymous"
        )]
        #[schema(value_type = Option<String>)]
        session_id: SessionToken,
    },
    /// Round ended.
    GameOver,
    /// Round ended on inactivity.
    Timeout,
}

impl GameMessage {
    /// Broadcast a state to every listener of the topic.
    pub fn broadcast_state(state: RemoteState, game: Option<ControlLayout>) -> Self {
        Self::StateChange {
            state,
            game,
            payment_url: None,
            session_id: SessionToken::Anonymous,
        }
    }

    /// Reply addressed to `session` (every other phone filters it out).
    pub fn reply(state: RemoteState, session: SessionToken) -> Self {
        Self::StateChange {
            state,
            game: None,
            payment_url: None,
            session_id: session,
        }
    }

    /// Wire name of the message type, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Join { .. } => "JOIN",
            Self::Keydown { .. } => "KEYDOWN",
            Self::Tap { .. } => "TAP",
            Self::Start { .. } => "START",
            Self::StateChange { .. } => "STATE_CHANGE",
            Self::GameOver => "GAME_OVER",
            Self::Timeout => "TIMEOUT",
        }
    }
}

/// States a phone can be told to display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemoteState {
    Ready,
    ConnectionSuccess,
    Paying,
    PaymentApproved,
    Playing,
    Waiting,
    WaitingSelection,
    Busy,
}

/// Control layout a phone should render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlLayout {
    Menu,
    Trivia,
    Roulette,
    Balloon,
    Simon,
    Penalties,
    Taprace,
    TapraceSetup,
}

/// Anything published on a machine topic.
///
/// Topics are shared with listeners outside the joystick protocol, so frames
/// of an unknown `type` are carried through verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChannelFrame {
    /// A joystick protocol message.
    Game(GameMessage),
    /// Any other JSON payload.
    Foreign(serde_json::Value),
}

impl ChannelFrame {
    /// Parse a JSON text frame.
    pub fn from_json_str(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    /// Borrow the joystick message, if this frame carries one.
    pub fn as_game(&self) -> Option<&GameMessage> {
        match self {
            Self::Game(message) => Some(message),
            Self::Foreign(_) => None,
        }
    }
}

impl From<GameMessage> for ChannelFrame {
    fn from(value: GameMessage) -> Self {
        Self::Game(value)
    }
}

/// Simon pad colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PadColor {
    Red,
    Green,
    Blue,
    Yellow,
}

/// Decoded value of a `KEYDOWN` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalKey {
    /// Menu or answer letter, always uppercase.
    Letter(char),
    /// Simon pad.
    Color(PadColor),
    /// Penalty kick.
    Shoot,
}

/// Error returned for keys outside of the vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown key `{0}`")]
pub struct UnknownKey(pub String);

impl LogicalKey {
    /// Slot that owns this key according to the fixed key table.
    pub fn slot(&self) -> SlotId {
        match self {
            Self::Letter(letter) => KEY_SLOT_TABLE
                .iter()
                .find(|(key, _)| key == letter)
                .map(|(_, slot)| *slot)
                .unwrap_or(PRIMARY_SLOT),
            Self::Color(_) | Self::Shoot => PRIMARY_SLOT,
        }
    }
}

impl FromStr for LogicalKey {
    type Err = UnknownKey;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let key = raw.trim().to_ascii_uppercase();
        let mut chars = key.chars();
        if let (Some(letter), None) = (chars.next(), chars.next()) {
            if letter.is_ascii_alphabetic() {
                return Ok(Self::Letter(letter));
            }
        }
        match key.as_str() {
            "RED" => Ok(Self::Color(PadColor::Red)),
            "GREEN" => Ok(Self::Color(PadColor::Green)),
            "BLUE" => Ok(Self::Color(PadColor::Blue)),
            "YELLOW" => Ok(Self::Color(PadColor::Yellow)),
            "SHOOT" => Ok(Self::Shoot),
            _ => Err(UnknownKey(raw.to_string())),
        }
    }
}

impl fmt::Display for LogicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Letter(letter) => write!(f, "{letter}"),
            Self::Color(PadColor::Red) => f.write_str("RED"),
            Self::Color(PadColor::Green) => f.write_str("GREEN"),
            Self::Color(PadColor::Blue) => f.write_str("BLUE"),
            Self::Color(PadColor::Yellow) => f.write_str("YELLOW"),
            Self::Shoot => f.write_str("SHOOT"),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::dto::ids::SessionId;

    #[test]
    fn join_uses_camel_case_fields() {
        let message = GameMessage::Join {
            player_id: 2,
            session_id: SessionId::new("s-1").into(),
        };
        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({"type": "JOIN", "playerId": 2, "sessionId": "s-1"})
        );
    }

    #[test]
    fn missing_session_decodes_as_anonymous() {
        let frame = ChannelFrame::from_json_str(r#"{"type":"TAP","playerId":1}"#).unwrap();
        assert_eq!(
            frame,
            ChannelFrame::Game(GameMessage::Tap {
                player_id: 1,
                session_id: SessionToken::Anonymous,
            })
        );
    }

    #[test]
    fn anonymous_session_is_omitted_when_encoding() {
        let message =
            GameMessage::broadcast_state(RemoteState::Ready, Some(ControlLayout::Taprace));
        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({"type": "STATE_CHANGE", "state": "READY", "game": "TAPRACE"})
        );
    }

    #[test]
    fn state_change_with_payment_url_decodes() {
        let frame = ChannelFrame::from_json_str(
            r#"{"type":"STATE_CHANGE","state":"PAYING","paymentUrl":"https://pay.example/x"}"#,
        )
        .unwrap();
        match frame {
            ChannelFrame::Game(GameMessage::StateChange {
                state, payment_url, ..
            }) => {
                assert_eq!(state, RemoteState::Paying);
                assert_eq!(payment_url.as_deref(), Some("https://pay.example/x"));
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[test]
    fn unit_messages_round_trip_through_tag() {
        let frame = ChannelFrame::from_json_str(r#"{"type":"GAME_OVER"}"#).unwrap();
        assert_eq!(frame, ChannelFrame::Game(GameMessage::GameOver));
        let frame = ChannelFrame::from_json_str(r#"{"type":"TIMEOUT"}"#).unwrap();
        assert_eq!(frame, ChannelFrame::Game(GameMessage::Timeout));
    }

    #[test]
    fn unknown_types_are_kept_as_foreign_frames() {
        let raw = r#"{"type":"AD_CHANGED","adId":12}"#;
        let frame = ChannelFrame::from_json_str(raw).unwrap();
        assert!(frame.as_game().is_none());
        assert_eq!(
            serde_json::to_value(&frame).unwrap(),
            json!({"type": "AD_CHANGED", "adId": 12})
        );
    }

    #[test]
    fn keys_parse_case_insensitively() {
        assert_eq!("a".parse::<LogicalKey>().unwrap(), LogicalKey::Letter('A'));
        assert_eq!(
            "Yellow".parse::<LogicalKey>().unwrap(),
            LogicalKey::Color(PadColor::Yellow)
        );
        assert_eq!("SHOOT".parse::<LogicalKey>().unwrap(), LogicalKey::Shoot);
        assert!("JUMP".parse::<LogicalKey>().is_err());
        assert!("7".parse::<LogicalKey>().is_err());
    }

    #[test]
    fn key_table_is_fixed() {
        assert_eq!(LogicalKey::Letter('A').slot(), 1);
        assert_eq!(LogicalKey::Letter('L').slot(), 2);
        assert_eq!(LogicalKey::Letter('M').slot(), 3);
        assert_eq!(LogicalKey::Letter('C').slot(), PRIMARY_SLOT);
        assert_eq!(LogicalKey::Shoot.slot(), PRIMARY_SLOT);
    }
}
