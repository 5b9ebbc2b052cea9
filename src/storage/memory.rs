use super::{Label, LabelStore, SequenceStore};
use crate::core::{CanId, Payload, Sequence, SequenceInfo};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;
use tokio::sync::RwLock;

/// In-process sequence catalog
#[derive(Debug, Default)]
pub struct MemorySequenceStore {
    sequences: RwLock<BTreeMap<String, Sequence>>,
}

impl MemorySequenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sequences(sequences: impl IntoIterator<Item = Sequence>) -> Self {
        let map = sequences
            .into_iter()
            .map(|sequence| (sequence.name.clone(), sequence))
            .collect();
        Self {
            sequences: RwLock::new(map),
        }
    }

    /// Seed the store from a JSON file holding an array of exported
    /// sequences
    pub async fn load_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read sequences from {:?}", path))?;
        let sequences = Sequence::import_many_json(&json)
            .with_context(|| format!("Failed to parse sequences in {:?}", path))?;
        tracing::info!(count = sequences.len(), path = ?path, "sequences loaded");
        Ok(Self::with_sequences(sequences))
    }
}

#[async_trait]
impl SequenceStore for MemorySequenceStore {
    async fn load(&self, name: &str) -> Result<Option<Sequence>> {
        Ok(self.sequences.read().await.get(name).cloned())
    }

    async fn save(&self, sequence: Sequence) -> Result<()> {
        tracing::debug!(name = %sequence.name, steps = sequence.len(), "sequence saved");
        self.sequences
            .write()
            .await
            .insert(sequence.name.clone(), sequence);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<SequenceInfo>> {
        Ok(self
            .sequences
            .read()
            .await
            .values()
            .map(Sequence::info)
            .collect())
    }
}

/// In-process label table
#[derive(Debug, Default)]
pub struct MemoryLabelStore {
    labels: RwLock<Vec<Label>>,
}

impl MemoryLabelStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn labels(&self) -> Vec<Label> {
        self.labels.read().await.clone()
    }
}

#[async_trait]
impl LabelStore for MemoryLabelStore {
    async fn put(
        &self,
        event_name: &str,
        id: CanId,
        data: Payload,
        vehicle_ref: Option<&str>,
    ) -> Result<()> {
        let mut labels = self.labels.write().await;
        labels.retain(|label| !(label.id == id && label.data == data));
        labels.push(Label {
            event_name: event_name.to_string(),
            id,
            data,
            vehicle_ref: vehicle_ref.map(str::to_string),
        });
        Ok(())
    }

    async fn find(&self, id: CanId, data: Payload) -> Result<Option<String>> {
        Ok(self
            .labels
            .read()
            .await
            .iter()
            .find(|label| label.id == id && label.data == data)
            .map(|label| label.event_name.clone()))
    }
}
