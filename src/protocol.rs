use crate::bus::BusHandle;
use crate::codec::{describe, FrameDescription};
use crate::frame_log::FrameLogStats;
use crate::vehicle::store::VehicleCommand;
use crate::vehicle::{CommandEffect, StoreStats, VehicleState};
use arrayvec::ArrayString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub const MAX_REQUEST_SIZE: usize = 512;
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024;

pub const DEFAULT_LOG_FRAMES: usize = 20;
/// Upper bound on frames returned by one `get_log` request.
pub const MAX_LOG_FRAMES: usize = 50;

pub type RequestBuffer = ArrayString<MAX_REQUEST_SIZE>;
pub type MessageBuffer = ArrayString<MAX_MESSAGE_SIZE>;

/// One line from a client: `{"id": 7, "request": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub id: u32,
    pub request: BusRequest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusRequest {
    Vehicle(VehicleCommand),
    PauseLog,
    ResumeLog,
    ClearLog,
    GetState,
    GetLog {
        #[serde(default)]
        limit: Option<usize>,
    },
    GetStats,
    Ping,
    /// Start streaming every logged frame to this client.
    Subscribe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseStatus {
    Success,
    /// Request understood but had no effect, or was not understood at all.
    Ignored,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResponseBody {
    Pong,
    State {
        state: VehicleState,
        check_engine: bool,
    },
    Log {
        paused: bool,
        message_count: usize,
        frames: Vec<FrameDescription>,
    },
    Stats {
        store: StoreStats,
        log: FrameLogStats,
        uptime_ms: u64,
    },
    EngineStartScheduled {
        delay_ms: u64,
    },
    Subscribed,
    Message {
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusResponse {
    pub id: u32,
    pub timestamp_ms: u64,
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<ResponseBody>,
}

impl BusResponse {
    pub fn success(id: u32, timestamp_ms: u64, body: Option<ResponseBody>) -> Self {
        Self {
            id,
            timestamp_ms,
            status: ResponseStatus::Success,
            body,
        }
    }

    pub fn ignored(id: u32, timestamp_ms: u64, reason: impl Into<String>) -> Self {
        Self {
            id,
            timestamp_ms,
            status: ResponseStatus::Ignored,
            body: Some(ResponseBody::Message {
                message: reason.into(),
            }),
        }
    }

    pub fn error(id: u32, timestamp_ms: u64, reason: impl Into<String>) -> Self {
        Self {
            id,
            timestamp_ms,
            status: ResponseStatus::Error,
            body: Some(ResponseBody::Message {
                message: reason.into(),
            }),
        }
    }
}

/// Every line the daemon writes is one of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Response(BusResponse),
    Frame(FrameDescription),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("invalid JSON format")]
    InvalidJson,
    #[error("message exceeds buffer size")]
    MessageTooLarge,
    #[error("serialization failed")]
    SerializationError,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolStats {
    pub requests_parsed: u32,
    pub parse_failures: u32,
    pub messages_serialized: u32,
}

/// Per-connection line codec with preallocated buffers.
#[derive(Debug)]
pub struct ProtocolHandler {
    request_buffer: RequestBuffer,
    message_buffer: MessageBuffer,
    stats: ProtocolStats,
}

impl ProtocolHandler {
    pub fn new() -> Self {
        Self {
            request_buffer: ArrayString::new(),
            message_buffer: ArrayString::new(),
            stats: ProtocolStats::default(),
        }
    }

    pub fn parse_request(&mut self, line: &str) -> Result<RequestEnvelope, ProtocolError> {
        self.request_buffer.clear();
        if self.request_buffer.try_push_str(line).is_err() {
            self.stats.parse_failures += 1;
            return Err(ProtocolError::MessageTooLarge);
        }

        match serde_json::from_str::<RequestEnvelope>(&self.request_buffer) {
            Ok(envelope) => {
                self.stats.requests_parsed += 1;
                Ok(envelope)
            }
            Err(e) => {
                self.stats.parse_failures += 1;
                debug!("rejected request: {}", e);
                Err(ProtocolError::InvalidJson)
            }
        }
    }

    /// Serializes `message` into the handler's buffer; valid until the next call.
    pub fn serialize(&mut self, message: &ServerMessage) -> Result<&str, ProtocolError> {
        self.message_buffer.clear();

        let json = serde_json::to_string(message).map_err(|_| ProtocolError::SerializationError)?;
        self.message_buffer
            .try_push_str(&json)
            .map_err(|_| ProtocolError::MessageTooLarge)?;
        self.stats.messages_serialized += 1;

        Ok(&self.message_buffer)
    }

    pub fn stats(&self) -> ProtocolStats {
        self.stats
    }
}

impl Default for ProtocolHandler {
    fn default() -> Self {
        Self::new()
    }
}

/// Best-effort request id from a line that failed to parse, so the reply can
/// still be correlated. Zero when even that is missing.
pub fn recover_request_id(line: &str) -> u32 {
    #[derive(Deserialize)]
    struct IdOnly {
        id: u32,
    }

    serde_json::from_str::<IdOnly>(line).map_or(0, |partial| partial.id)
}

/// Runs one request against the bus and builds its response.
pub async fn handle_request(bus: &BusHandle, envelope: RequestEnvelope) -> BusResponse {
    let id = envelope.id;

    let response = match envelope.request {
        BusRequest::Vehicle(command) => match bus.execute(command).await {
            CommandEffect::Applied => BusResponse::success(id, bus.uptime_ms(), None),
            CommandEffect::Ignored => {
                BusResponse::ignored(id, bus.uptime_ms(), "command had no effect")
            }
            CommandEffect::ScheduleEngineStart(_) => BusResponse::success(
                id,
                bus.uptime_ms(),
                Some(ResponseBody::EngineStartScheduled {
                    delay_ms: bus.config().engine_start_delay_ms,
                }),
            ),
        },
        BusRequest::PauseLog => {
            bus.pause_log().await;
            BusResponse::success(id, bus.uptime_ms(), None)
        }
        BusRequest::ResumeLog => {
            bus.resume_log().await;
            BusResponse::success(id, bus.uptime_ms(), None)
        }
        BusRequest::ClearLog => {
            bus.clear_log().await;
            BusResponse::success(id, bus.uptime_ms(), None)
        }
        BusRequest::GetState => {
            let state = bus.vehicle_state().await;
            let check_engine = state.check_engine_lamp();
            BusResponse::success(
                id,
                bus.uptime_ms(),
                Some(ResponseBody::State {
                    state,
                    check_engine,
                }),
            )
        }
        BusRequest::GetLog { limit } => {
            let limit = limit.unwrap_or(DEFAULT_LOG_FRAMES).min(MAX_LOG_FRAMES);
            let snapshot = bus.current_log().await;
            let frames = snapshot.frames.iter().take(limit).map(describe).collect();
            BusResponse::success(
                id,
                bus.uptime_ms(),
                Some(ResponseBody::Log {
                    paused: snapshot.paused,
                    message_count: snapshot.message_count,
                    frames,
                }),
            )
        }
        BusRequest::GetStats => {
            let store = bus.store_stats().await;
            let log = bus.log_stats().await;
            BusResponse::success(
                id,
                bus.uptime_ms(),
                Some(ResponseBody::Stats {
                    store,
                    log,
                    uptime_ms: bus.uptime_ms(),
                }),
            )
        }
        BusRequest::Ping => BusResponse::success(id, bus.uptime_ms(), Some(ResponseBody::Pong)),
        BusRequest::Subscribe => {
            BusResponse::success(id, bus.uptime_ms(), Some(ResponseBody::Subscribed))
        }
    };

    if response.status != ResponseStatus::Success {
        warn!(id, status = ?response.status, "request not applied");
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vehicle::Ignition;

    #[test]
    fn test_parse_vehicle_request() {
        let mut handler = ProtocolHandler::new();
        let envelope = handler
            .parse_request(r#"{"id":3,"request":{"vehicle":{"command":"set_ignition","mode":"ON"}}}"#)
            .unwrap();
        assert_eq!(envelope.id, 3);
        assert_eq!(
            envelope.request,
            BusRequest::Vehicle(VehicleCommand::SetIgnition { mode: Ignition::On })
        );
    }

    #[test]
    fn test_parse_unit_request() {
        let mut handler = ProtocolHandler::new();
        let envelope = handler.parse_request(r#"{"id":1,"request":"ping"}"#).unwrap();
        assert_eq!(envelope.request, BusRequest::Ping);
    }

    #[test]
    fn test_oversized_request_is_rejected() {
        let mut handler = ProtocolHandler::new();
        let line = "x".repeat(MAX_REQUEST_SIZE + 1);
        assert_eq!(handler.parse_request(&line), Err(ProtocolError::MessageTooLarge));
        assert_eq!(handler.stats().parse_failures, 1);
    }

    #[test]
    fn test_recover_request_id() {
        assert_eq!(recover_request_id(r#"{"id":42,"request":"fly"}"#), 42);
        assert_eq!(recover_request_id("garbage"), 0);
    }

    #[test]
    fn test_response_omits_empty_body() {
        let mut handler = ProtocolHandler::new();
        let message = ServerMessage::Response(BusResponse::success(5, 100, None));
        let json = handler.serialize(&message).unwrap();
        assert_eq!(
            json,
            r#"{"type":"response","id":5,"timestamp_ms":100,"status":"Success"}"#
        );
    }
}
