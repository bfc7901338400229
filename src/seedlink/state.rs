//! Resume points for a SeedLink subscription, kept in a JSON state file.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::mseed_error::MSeedError;

/// Last processed sequence number per station.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamState {
    stations: BTreeMap<String, u64>,
}

impl StreamState {
    pub fn new() -> StreamState {
        StreamState::default()
    }

    pub fn sequence(&self, station: &str) -> Option<u64> {
        self.stations.get(station).copied()
    }

    pub fn advance(&mut self, station: &str, sequence: u64) {
        self.stations.insert(station.to_string(), sequence);
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.stations.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Reads a state file. A missing file is an empty state.
    pub fn load(path: &Path) -> Result<StreamState, MSeedError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(StreamState::new()),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&text).map_err(|e| {
            MSeedError::Checkpoint(format!("cannot parse {}: {}", path.display(), e))
        })
    }

    /// Writes the state to a sibling temp file, then renames it over `path`, so readers
    /// only ever see a complete file.
    pub fn save(&self, path: &Path) -> Result<(), MSeedError> {
        let json = serde_json::to_vec_pretty(self)?;
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&json)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        debug!("saved state for {} stations to {}", self.stations.len(), path.display());
        Ok(())
    }
}

/// A state file, the state and how often to flush it.
#[derive(Debug)]
pub struct Checkpoint {
    path: PathBuf,
    /// Data packets between saves, 0 saves only at the end.
    interval: usize,
    pending: usize,
    pub state: StreamState,
}

impl Checkpoint {
    pub fn new(path: PathBuf, interval: usize, state: StreamState) -> Checkpoint {
        Checkpoint {
            path,
            interval,
            pending: 0,
            state,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records a processed packet. Returns `Ok(true)` when this triggered a save.
    pub fn advance(&mut self, station: &str, sequence: u64) -> Result<bool, MSeedError> {
        self.state.advance(station, sequence);
        self.pending += 1;
        if self.interval > 0 && self.pending >= self.interval {
            self.save()?;
            return Ok(true);
        }
        Ok(false)
    }

    pub fn save(&mut self) -> Result<(), MSeedError> {
        self.pending = 0;
        self.state.save(&self.path)
    }
}
