//! Collaborator interfaces for sequences and labels. The simulator never
//! persists anything itself; durable backends live outside this crate.

pub mod memory;

pub use memory::{MemoryLabelStore, MemorySequenceStore};

use crate::core::{CanId, Payload, Sequence, SequenceInfo};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Source of replayable sequences
#[async_trait]
pub trait SequenceStore: Send + Sync {
    /// `Ok(None)` when no sequence has that name
    async fn load(&self, name: &str) -> Result<Option<Sequence>>;

    /// Insert or replace by name
    async fn save(&self, sequence: Sequence) -> Result<()>;

    async fn list(&self) -> Result<Vec<SequenceInfo>>;
}

/// Confirmed calibration outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub event_name: String,
    pub id: CanId,
    pub data: Payload,
    pub vehicle_ref: Option<String>,
}

/// Sink for confirmed calibrations, also used to annotate outgoing frames
#[async_trait]
pub trait LabelStore: Send + Sync {
    async fn put(
        &self,
        event_name: &str,
        id: CanId,
        data: Payload,
        vehicle_ref: Option<&str>,
    ) -> Result<()>;

    /// Event name labelling an exact id/payload pair
    async fn find(&self, id: CanId, data: Payload) -> Result<Option<String>>;
}
