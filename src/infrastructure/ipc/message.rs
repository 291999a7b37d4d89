//! Wire messages exchanged with agents.
//!
//! Every frame is one JSON object on one line:
//! `{"type": ..., "agent_id"?: ..., "task_id"?: ..., "timestamp": <epoch ms>, "data"?: ...}`.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use super::error::{TransportError, TransportResult};
use crate::domain::models::Task;

/// Message kinds understood by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Auth,
    AuthResponse,
    Heartbeat,
    Task,
    TaskResponse,
    Ping,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::AuthResponse => "auth_response",
            Self::Heartbeat => "heartbeat",
            Self::Task => "task",
            Self::TaskResponse => "task_response",
            Self::Ping => "ping",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One framed message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpcMessage {
    #[serde(rename = "type")]
    pub kind: MessageType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,

    #[serde(default = "Utc::now", with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl IpcMessage {
    pub fn new(kind: MessageType) -> Self {
        Self {
            kind,
            agent_id: None,
            task_id: None,
            timestamp: Utc::now(),
            data: None,
        }
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn with_payload<T: Serialize>(mut self, payload: &T) -> TransportResult<Self> {
        self.data = Some(serde_json::to_value(payload)?);
        Ok(self)
    }

    pub fn task(task: &Task) -> TransportResult<Self> {
        Self::new(MessageType::Task)
            .with_agent(&task.agent)
            .with_task_id(&task.task_id)
            .with_payload(task)
    }

    pub fn auth_response(agent_id: Option<&str>, success: bool, error: Option<String>) -> Self {
        let mut msg = Self::new(MessageType::AuthResponse);
        msg.agent_id = agent_id.map(str::to_string);
        msg.data = serde_json::to_value(AuthResponsePayload { success, error }).ok();
        msg
    }

    pub fn ping(reply: bool) -> Self {
        let mut msg = Self::new(MessageType::Ping);
        msg.data = serde_json::to_value(PingPayload { reply }).ok();
        msg
    }

    /// Decode `data` into a typed payload; a missing `data` reads as `{}`.
    pub fn payload<T: DeserializeOwned>(&self) -> TransportResult<T> {
        let data = self
            .data
            .clone()
            .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
        serde_json::from_value(data).map_err(|e| TransportError::InvalidPayload {
            kind: self.kind.to_string(),
            reason: e.to_string(),
        })
    }

    /// Whether this is an `auth_response` reporting success.
    pub fn is_successful_auth_response(&self) -> bool {
        self.kind == MessageType::AuthResponse
            && self
                .payload::<AuthResponsePayload>()
                .is_ok_and(|p| p.success)
    }
}

/// Serialize a message as one newline-terminated frame.
pub fn encode(msg: &IpcMessage) -> TransportResult<Vec<u8>> {
    let mut frame = serde_json::to_vec(msg)?;
    frame.push(b'\n');
    Ok(frame)
}

/// Parse one frame (without its trailing newline).
pub fn decode(frame: &[u8]) -> TransportResult<IpcMessage> {
    serde_json::from_slice(frame).map_err(|e| TransportError::MalformedFrame(e.to_string()))
}

/// `auth.data`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AuthPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,

    #[serde(default)]
    pub version: String,

    #[serde(default)]
    pub capabilities: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrent_tasks: Option<bool>,
}

/// `auth_response.data`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResponsePayload {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome an agent reports for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Completed,
    Failed,
}

/// `task_response.data`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResponsePayload {
    pub status: ResponseStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `ping.data`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PingPayload {
    #[serde(default)]
    pub reply: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::TaskContext;

    #[test]
    fn test_decode_agent_auth_frame() {
        let frame = br#"{"type":"auth","agent_id":"security","timestamp":1700000000000,"data":{"version":"2.1.0","capabilities":["sast"],"concurrent_tasks":false}}"#;
        let msg = decode(frame).unwrap();

        assert_eq!(msg.kind, MessageType::Auth);
        assert_eq!(msg.agent_id.as_deref(), Some("security"));
        assert_eq!(msg.timestamp.timestamp_millis(), 1_700_000_000_000);

        let auth: AuthPayload = msg.payload().unwrap();
        assert_eq!(auth.version, "2.1.0");
        assert_eq!(auth.concurrent_tasks, Some(false));
    }

    #[test]
    fn test_missing_timestamp_defaults_to_now() {
        let msg = decode(br#"{"type":"heartbeat"}"#).unwrap();
        assert!(msg.timestamp <= Utc::now());
    }

    #[test]
    fn test_unknown_type_is_malformed() {
        assert!(matches!(
            decode(br#"{"type":"shutdown","timestamp":1}"#),
            Err(TransportError::MalformedFrame(_))
        ));
        assert!(decode(b"not json").is_err());
    }

    #[test]
    fn test_task_frame_shape() {
        let task = Task::new(
            "quality",
            vec!["src/lib.rs".to_string()],
            TaskContext::new("/repo"),
            "/tmp/quality.json",
        );
        let frame = encode(&IpcMessage::task(&task).unwrap()).unwrap();
        assert_eq!(frame.last(), Some(&b'\n'));

        let value: Value = serde_json::from_slice(&frame).unwrap();
        assert_eq!(value["type"], "task");
        assert_eq!(value["task_id"], task.task_id.as_str());
        assert_eq!(value["data"]["scope"][0], "src/lib.rs");
        assert_eq!(value["data"]["context"]["repo_root"], "/repo");
        assert!(value["timestamp"].is_i64());
    }

    #[test]
    fn test_auth_response_detection() {
        assert!(IpcMessage::auth_response(Some("quality"), true, None).is_successful_auth_response());
        assert!(!IpcMessage::auth_response(None, false, Some("missing agent_id".into()))
            .is_successful_auth_response());
        assert!(!IpcMessage::ping(false).is_successful_auth_response());
    }

    #[test]
    fn test_ping_payload_defaults() {
        let msg = decode(br#"{"type":"ping","timestamp":5}"#).unwrap();
        let ping: PingPayload = msg.payload().unwrap();
        assert!(!ping.reply);
    }

    #[test]
    fn test_task_response_payload() {
        let msg = decode(
            br#"{"type":"task_response","task_id":"t-1","timestamp":5,"data":{"status":"failed","error":"lint crashed"}}"#,
        )
        .unwrap();
        let response: TaskResponsePayload = msg.payload().unwrap();
        assert_eq!(response.status, ResponseStatus::Failed);
        assert_eq!(response.error.as_deref(), Some("lint crashed"));
    }
}
