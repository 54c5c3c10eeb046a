//! Message shapes for the OBS WebSocket v5 protocol.
//!
//! Every frame is a JSON envelope `{"op": <opcode>, "d": <payload>}`. Only the
//! handshake and request/response opcodes are modelled; events are never
//! subscribed to and are skipped if they arrive anyway.

use crate::error::{ObsError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

pub const RPC_VERSION: u32 = 1;

/// Close code OBS sends when the Identify authentication string is wrong.
pub const CLOSE_AUTHENTICATION_FAILED: u16 = 4009;

pub const GET_CURRENT_PROGRAM_SCENE: &str = "GetCurrentProgramScene";
pub const SET_CURRENT_PROGRAM_SCENE: &str = "SetCurrentProgramScene";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Hello = 0,
    Identify = 1,
    Identified = 2,
    Event = 5,
    Request = 6,
    RequestResponse = 7,
}

impl OpCode {
    pub fn from_u8(op: u8) -> Option<Self> {
        match op {
            0 => Some(OpCode::Hello),
            1 => Some(OpCode::Identify),
            2 => Some(OpCode::Identified),
            5 => Some(OpCode::Event),
            6 => Some(OpCode::Request),
            7 => Some(OpCode::RequestResponse),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    op: u8,
    d: Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hello {
    #[serde(default)]
    pub obs_web_socket_version: Option<String>,
    pub rpc_version: u32,
    #[serde(default)]
    pub authentication: Option<AuthChallenge>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthChallenge {
    pub challenge: String,
    pub salt: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Identify {
    pub rpc_version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authentication: Option<String>,
    pub event_subscriptions: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identified {
    pub negotiated_rpc_version: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub request_type: String,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_data: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestResponse {
    pub request_type: String,
    pub request_id: String,
    pub request_status: RequestStatus,
    #[serde(default)]
    pub response_data: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequestStatus {
    pub result: bool,
    pub code: u16,
    #[serde(default)]
    pub comment: Option<String>,
}

/// Wrap a payload in its opcode envelope.
pub fn encode<T: Serialize>(op: OpCode, payload: &T) -> Result<String> {
    let envelope = Envelope {
        op: op as u8,
        d: serde_json::to_value(payload)?,
    };
    Ok(serde_json::to_string(&envelope)?)
}

/// Split a text frame into its opcode and raw payload.
pub fn decode(text: &str) -> Result<(OpCode, Value)> {
    let envelope: Envelope = serde_json::from_str(text)?;
    let op = OpCode::from_u8(envelope.op)
        .ok_or_else(|| ObsError::Protocol(format!("unknown opcode {}", envelope.op)))?;
    Ok((op, envelope.d))
}

/// `base64(sha256(base64(sha256(password + salt)) + challenge))`
pub fn authentication_string(password: &str, salt: &str, challenge: &str) -> String {
    let secret = STANDARD.encode(Sha256::digest(format!("{}{}", password, salt).as_bytes()));
    STANDARD.encode(Sha256::digest(format!("{}{}", secret, challenge).as_bytes()))
}
