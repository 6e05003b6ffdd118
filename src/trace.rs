// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! File layout of one trace directory and its property block.

use crate::error::{Result, TraceError};
use crate::Time;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const MIN_TIME_KEY: &str = "min_time";
pub const MAX_TIME_KEY: &str = "max_time";
pub const TICS_PER_SECOND_KEY: &str = "tics_per_second";
pub const SNAPSHOT_INTERVAL_KEY: &str = "snapshot_interval";
pub const SEEK_INTERVAL_KEY: &str = "seek_interval";
pub const STATEFUL_KEY: &str = "stateful";

/// Paths of the files making up one trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracePaths {
    pub dir: PathBuf,
    pub events: PathBuf,
    pub events_index: PathBuf,
    pub snapshots: PathBuf,
    pub snapshots_index: PathBuf,
    pub info: PathBuf,
}

impl TracePaths {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref().to_path_buf();
        Self {
            events: dir.join("events"),
            events_index: dir.join("events.idx"),
            snapshots: dir.join("snapshots"),
            snapshots_index: dir.join("snapshots.idx"),
            info: dir.join("info.json"),
            dir,
        }
    }

    pub fn create_dir(&self) -> Result<()> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir)?;
        }
        Ok(())
    }

    /// A trace is readable once its writer closed: that is when the index
    /// and the property block are written.
    pub fn is_readable(&self) -> bool {
        self.events.exists() && self.events_index.exists() && self.info.exists()
    }
}

/// String key/value metadata attached to a trace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Properties {
    map: BTreeMap<String, String>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl ToString) {
        self.map.insert(key.into(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Parses a property, `None` when the key is absent.
    pub fn parse<T: FromStr>(&self, key: &str) -> Result<Option<T>> {
        match self.map.get(key) {
            None => Ok(None),
            Some(raw) => raw.parse::<T>().map(Some).map_err(|_| TraceError::InvalidProperty {
                key: key.to_string(),
                value: raw.clone(),
            }),
        }
    }

    pub fn require<T: FromStr>(&self, key: &str) -> Result<T> {
        self.parse(key)?
            .ok_or_else(|| TraceError::MissingProperty(key.to_string()))
    }

    pub fn min_time(&self) -> Result<Time> {
        self.require(MIN_TIME_KEY)
    }

    pub fn max_time(&self) -> Result<Time> {
        self.require(MAX_TIME_KEY)
    }

    pub fn tics_per_second(&self) -> Result<u64> {
        self.require(TICS_PER_SECOND_KEY)
    }

    pub fn snapshot_interval(&self) -> Result<Time> {
        self.require(SNAPSHOT_INTERVAL_KEY)
    }

    pub fn is_stateful(&self) -> Result<bool> {
        Ok(self.parse(STATEFUL_KEY)?.unwrap_or(false))
    }

    pub fn write_to(&self, path: impl AsRef<Path>, sync: bool) -> Result<()> {
        let file = File::create(path)?;
        let mut out = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut out, self)?;
        out.write_all(b"\n")?;
        out.flush()?;
        if sync {
            out.get_ref().sync_data()?;
        }
        Ok(())
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read(path)?;
        Ok(serde_json::from_slice(&raw)?)
    }
}
