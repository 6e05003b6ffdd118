// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Configuration constants and the per-trace configuration object.

use crate::error::{Result, TraceError};
use crate::Time;
use serde::{Deserialize, Serialize};

/// Magic bytes opening an event or snapshot stream.
pub const STREAM_MAGIC: [u8; 4] = *b"DITL";

/// Magic bytes opening a persisted seek map.
pub const SEEK_MAP_MAGIC: [u8; 4] = *b"DSEK";

/// On-disk format version shared by every file of a trace.
pub const FORMAT_VERSION: u32 = 1;

/// Stream header: magic (4) + version (4).
pub const STREAM_HEADER_SIZE: u64 = 8;

pub const DEFAULT_SEEK_INTERVAL: u32 = 16;
pub const DEFAULT_SNAPSHOT_INTERVAL: Time = 1000;
pub const DEFAULT_TICS_PER_SECOND: u64 = 1000;

/// Settings handed to writers when a trace is created.
///
/// Readers take everything they need from the trace's property block, so
/// the same trace can be opened without knowing how it was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    /// A seek entry is recorded at every Nth distinct timestamp.
    pub seek_interval: u32,
    /// Tics between two stateful snapshots.
    pub snapshot_interval: Time,
    pub tics_per_second: u64,
    pub fsync_on_close: bool,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            seek_interval: DEFAULT_SEEK_INTERVAL,
            snapshot_interval: DEFAULT_SNAPSHOT_INTERVAL,
            tics_per_second: DEFAULT_TICS_PER_SECOND,
            fsync_on_close: true,
        }
    }
}

impl TraceConfig {
    pub fn with_seek_interval(mut self, seek_interval: u32) -> Self {
        self.seek_interval = seek_interval;
        self
    }

    pub fn with_snapshot_interval(mut self, snapshot_interval: Time) -> Self {
        self.snapshot_interval = snapshot_interval;
        self
    }

    pub fn with_tics_per_second(mut self, tics_per_second: u64) -> Self {
        self.tics_per_second = tics_per_second;
        self
    }

    pub fn with_fsync_on_close(mut self, fsync_on_close: bool) -> Self {
        self.fsync_on_close = fsync_on_close;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.seek_interval == 0 {
            return Err(TraceError::InvariantViolation(
                "seek_interval must be at least 1".to_string(),
            ));
        }
        if self.snapshot_interval <= 0 {
            return Err(TraceError::InvariantViolation(format!(
                "snapshot_interval must be positive, got {}",
                self.snapshot_interval
            )));
        }
        if self.tics_per_second == 0 {
            return Err(TraceError::InvariantViolation(
                "tics_per_second must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(TraceConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_intervals_rejected() {
        let cfg = TraceConfig::default().with_seek_interval(0);
        assert!(matches!(cfg.validate(), Err(TraceError::InvariantViolation(_))));

        let cfg = TraceConfig::default().with_snapshot_interval(0);
        assert!(matches!(cfg.validate(), Err(TraceError::InvariantViolation(_))));
    }

    #[test]
    fn test_config_from_partial_json() {
        let cfg: TraceConfig = serde_json::from_str(r#"{"snapshot_interval": 20}"#).unwrap();
        assert_eq!(cfg.snapshot_interval, 20);
        assert_eq!(cfg.seek_interval, DEFAULT_SEEK_INTERVAL);
        assert!(cfg.fsync_on_close);
    }
}
