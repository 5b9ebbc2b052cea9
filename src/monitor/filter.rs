use crate::core::{CanId, Frame, SimError, SimResult};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Whether filters act as a whitelist or a blacklist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    #[default]
    Include,
    Exclude,
}

#[derive(Debug, Clone)]
struct IdRule {
    id: CanId,
    include: bool,
}

#[derive(Debug, Clone)]
struct DataRule {
    pattern: Regex,
    include: bool,
}

/// Id and payload filters applied before frames reach history
#[derive(Debug, Clone, Default)]
pub struct FrameFilter {
    mode: FilterMode,
    ids: Vec<IdRule>,
    data: Vec<DataRule>,
}

impl FrameFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> FilterMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: FilterMode) {
        tracing::info!(?mode, "monitor filter mode set");
        self.mode = mode;
    }

    pub fn add_id(&mut self, id: CanId, include: bool) {
        tracing::info!(%id, include, "monitor id filter added");
        self.ids.push(IdRule { id, include });
    }

    /// Add a regex matched against the upper-case hex payload
    pub fn add_data_pattern(&mut self, pattern: &str, include: bool) -> SimResult<()> {
        let pattern = Regex::new(pattern)
            .map_err(|e| SimError::InvalidRequest(format!("invalid data filter: {}", e)))?;
        tracing::info!(pattern = %pattern, include, "monitor data filter added");
        self.data.push(DataRule { pattern, include });
        Ok(())
    }

    pub fn clear(&mut self) {
        self.ids.clear();
        self.data.clear();
        tracing::info!("monitor filters cleared");
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty() && self.data.is_empty()
    }

    /// In include mode a frame needs a matching include rule for every
    /// populated rule kind; in exclude mode it must not hit an exclude rule.
    pub fn accepts(&self, frame: &Frame) -> bool {
        if !self.ids.is_empty() {
            let hit = |include: bool| {
                self.ids
                    .iter()
                    .any(|rule| rule.include == include && rule.id == frame.id)
            };
            if !self.passes(hit(true), hit(false)) {
                return false;
            }
        }

        if !self.data.is_empty() {
            let hex = frame.data.to_hex();
            let hit = |include: bool| {
                self.data
                    .iter()
                    .any(|rule| rule.include == include && rule.pattern.is_match(&hex))
            };
            if !self.passes(hit(true), hit(false)) {
                return false;
            }
        }

        true
    }

    fn passes(&self, matched: bool, blocked: bool) -> bool {
        match self.mode {
            FilterMode::Include => matched,
            FilterMode::Exclude => !blocked,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::FrameSource;

    fn frame(id: &str, data: &str) -> Frame {
        Frame::parse(id, data, 0.0, FrameSource::Live).unwrap()
    }

    #[test]
    fn test_empty_filter_accepts_everything() {
        assert!(FrameFilter::new().accepts(&frame("0x100", "00")));
    }

    #[test]
    fn test_include_mode_id_whitelist() {
        let mut filter = FrameFilter::new();
        filter.add_id("0x1A2".parse().unwrap(), true);
        assert!(filter.accepts(&frame("0x1A2", "AA")));
        assert!(!filter.accepts(&frame("0x100", "AA")));
    }

    #[test]
    fn test_exclude_mode_blacklist() {
        let mut filter = FrameFilter::new();
        filter.set_mode(FilterMode::Exclude);
        filter.add_id("0x100".parse().unwrap(), false);
        filter.add_data_pattern("^FF", false).unwrap();

        assert!(!filter.accepts(&frame("0x100", "00")));
        assert!(!filter.accepts(&frame("0x200", "FF00")));
        assert!(filter.accepts(&frame("0x200", "00FF")));
    }

    #[test]
    fn test_invalid_regex_rejected() {
        let mut filter = FrameFilter::new();
        let err = filter.add_data_pattern("([", true).unwrap_err();
        assert_eq!(err.kind(), "InvalidRequest");
        assert!(filter.is_empty());
    }
}
