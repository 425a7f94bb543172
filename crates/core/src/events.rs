//! Live feed messages

use serde::{Deserialize, Serialize};

use crate::AggregatedRecord;

/// Number of records a new listener receives on connect
pub const INITIAL_SNAPSHOT_SIZE: usize = 30;

/// What changed for a token between two snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    #[serde(rename = "new_token")]
    NewAsset,
    PriceUpdate,
    VolumeSpike,
}

impl ChangeKind {
    pub fn name(&self) -> &'static str {
        match self {
            ChangeKind::NewAsset => "new_token",
            ChangeKind::PriceUpdate => "price_update",
            ChangeKind::VolumeSpike => "volume_spike",
        }
    }
}

/// A classified change carrying the token's current state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    pub token: AggregatedRecord,
    pub timestamp: u64,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, token: AggregatedRecord, timestamp: u64) -> Self {
        Self {
            kind,
            token,
            timestamp,
        }
    }
}

/// Message delivered to a feed listener
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum FeedMessage {
    InitialData {
        tokens: Vec<AggregatedRecord>,
        timestamp: u64,
    },
    /// One cycle's events, never empty
    TokenUpdate(Vec<ChangeEvent>),
}

impl FeedMessage {
    pub fn event_name(&self) -> &'static str {
        match self {
            FeedMessage::InitialData { .. } => "initial_data",
            FeedMessage::TokenUpdate(_) => "token_update",
        }
    }
}
