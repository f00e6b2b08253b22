//! Session protocol frames (bidirectional JSON text frames, v:1).
//!
//! Subscription keys are `(channel, requestId)` only. Session identity is
//! never part of the key: a new request on a reused connection must not
//! inherit messages queued for a previous one.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{DeliveryProvider, ProviderSlot, SearchResponse};

pub const PROTOCOL_VERSION: u8 = 1;

// --- Channels and keys ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Search,
    Assistant,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Search => write!(f, "search"),
            Channel::Assistant => write!(f, "assistant"),
        }
    }
}

impl std::str::FromStr for Channel {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "search" => Ok(Self::Search),
            "assistant" => Ok(Self::Assistant),
            other => Err(format!("unknown Channel: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionKey {
    pub channel: Channel,
    pub request_id: String,
}

impl SubscriptionKey {
    pub fn new(channel: Channel, request_id: impl Into<String>) -> Self {
        Self {
            channel,
            request_id: request_id.into(),
        }
    }
}

impl std::fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.channel, self.request_id)
    }
}

// --- Ownership ---

/// Stored alongside a job at creation; authorizes later subscriptions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnerRecord {
    pub owner_user_id: Option<String>,
    pub owner_session_id: Option<String>,
}

// --- Client → server ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    #[serde(rename_all = "camelCase")]
    Subscribe {
        channel: String,
        #[serde(default)]
        request_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Unsubscribe {
        channel: String,
        #[serde(default)]
        request_id: Option<String>,
    },
    Ping,
    Pong,
}

// --- Server → client ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NackReason {
    MissingRequestId,
    InvalidChannel,
    NotAuthenticated,
    UserMismatch,
    SessionMismatch,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Streaming,
    Completed,
    Failed,
}

/// Patch payload for provider slots on a single place. Usually one entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderPatch {
    pub providers: BTreeMap<DeliveryProvider, ProviderSlot>,
}

impl ProviderPatch {
    pub fn single(provider: DeliveryProvider, slot: ProviderSlot) -> Self {
        Self {
            providers: BTreeMap::from([(provider, slot)]),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    #[serde(rename_all = "camelCase")]
    SubAck { channel: Channel, request_id: String },
    #[serde(rename_all = "camelCase")]
    SubNack {
        channel: Option<Channel>,
        request_id: Option<String>,
        reason: NackReason,
    },
    #[serde(rename_all = "camelCase")]
    Status {
        request_id: String,
        status: RequestStatus,
    },
    #[serde(rename_all = "camelCase")]
    Results {
        request_id: String,
        response: Box<SearchResponse>,
    },
    #[serde(rename = "result.patch", rename_all = "camelCase")]
    ResultPatch {
        request_id: String,
        place_id: String,
        patch: ProviderPatch,
        updated_at: DateTime<Utc>,
    },
    #[serde(rename = "stream.done", rename_all = "camelCase")]
    StreamDone {
        request_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        full_text: Option<String>,
    },
    Ping,
    Pong,
}

impl ServerFrame {
    /// Serialize with the protocol version stamped on the envelope.
    pub fn to_text(&self) -> String {
        let mut value = serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({}));
        if let serde_json::Value::Object(map) = &mut value {
            map.insert("v".to_string(), serde_json::json!(PROTOCOL_VERSION));
        }
        value.to_string()
    }
}

// --- Close codes ---

/// Hard policy violations close with 1008 and must not trigger reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardCloseReason {
    NotAuthorized,
    OriginBlocked,
    BadSubscribe,
    InvalidRequest,
}

impl HardCloseReason {
    pub fn as_str(self) -> &'static str {
        match self {
            HardCloseReason::NotAuthorized => "NOT_AUTHORIZED",
            HardCloseReason::OriginBlocked => "ORIGIN_BLOCKED",
            HardCloseReason::BadSubscribe => "BAD_SUBSCRIBE",
            HardCloseReason::InvalidRequest => "INVALID_REQUEST",
        }
    }
}

pub const CLOSE_NORMAL: u16 = 1000;
pub const CLOSE_GOING_AWAY: u16 = 1001;
pub const CLOSE_POLICY: u16 = 1008;
