//! Control entity persistence.
//!
//! Settings and bookkeeping entities survive restarts so that a countdown
//! running at shutdown can be resumed. Everything else is live state and is
//! rediscovered.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::Path;
use std::path::PathBuf;

use motion_dimmer::TimerRecord;
use serde::Deserialize;
use serde::Serialize;

use crate::engine::DateTimeState;
use crate::engine::LightState;
use crate::engine::NumberState;
use crate::engine::State;
use crate::engine::SwitchState;

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("Failed to read '{}': {error}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    #[error("Failed to write '{}': {error}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    #[error("Corrupt state file '{}': {error}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        error: serde_json::Error,
    },
}

/// Stored values of every control entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub numbers: BTreeMap<String, NumberState>,
    #[serde(default)]
    pub switches: BTreeMap<String, SwitchState>,
    #[serde(default)]
    pub datetimes: BTreeMap<String, DateTimeState>,
    /// Segment lights
    #[serde(default)]
    pub lights: BTreeMap<String, LightState>,
    #[serde(default)]
    pub timers: BTreeMap<String, TimerRecord>,
}

fn pick<V: Clone>(
    entities: &HashMap<String, V>,
    ids: &HashSet<String>,
) -> BTreeMap<String, V> {
    entities
        .iter()
        .filter(|(id, _)| ids.contains(*id))
        .map(|(id, value)| (id.clone(), value.clone()))
        .collect()
}

impl Snapshot {
    /// Capture the entities in `ids`.
    pub fn capture(state: &State, ids: &HashSet<String>) -> Self {
        Self {
            numbers: pick(&state.numbers, ids),
            switches: pick(&state.switches, ids),
            datetimes: pick(&state.datetimes, ids),
            lights: pick(&state.lights, ids),
            timers: pick(&state.timers, ids),
        }
    }

    /// Write back stored values for the entities in `ids`. Entries for
    /// entities that no longer exist are dropped.
    pub fn restore(&self, state: &mut State, ids: &HashSet<String>) -> usize {
        restore_into(&self.numbers, &mut state.numbers, ids)
            + restore_into(&self.switches, &mut state.switches, ids)
            + restore_into(&self.datetimes, &mut state.datetimes, ids)
            + restore_into(&self.lights, &mut state.lights, ids)
            + restore_into(&self.timers, &mut state.timers, ids)
    }
}

fn restore_into<V: Clone>(
    stored: &BTreeMap<String, V>,
    entities: &mut HashMap<String, V>,
    ids: &HashSet<String>,
) -> usize {
    let mut count = 0;
    for (id, value) in stored.iter().filter(|(id, _)| ids.contains(*id)) {
        entities.insert(id.clone(), value.clone());
        count += 1;
    }
    count
}

/// JSON state file.
#[derive(Debug, Clone)]
pub struct Persistence {
    path: PathBuf,
}

impl Persistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored snapshot. A missing file is not an error.
    pub fn load(&self) -> Result<Option<Snapshot>, PersistenceError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(PersistenceError::Read {
                    path: self.path.clone(),
                    error: e,
                });
            }
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| PersistenceError::Corrupt {
                path: self.path.clone(),
                error: e,
            })
    }

    /// Replace the stored snapshot. The file is written next to the target
    /// and renamed over it.
    pub fn save(&self, snapshot: &Snapshot) -> Result<(), PersistenceError> {
        let write_error = |error| PersistenceError::Write {
            path: self.path.clone(),
            error,
        };

        let content = serde_json::to_string_pretty(snapshot).map_err(|e| {
            write_error(std::io::Error::other(e))
        })?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        std::fs::write(&tmp, content).map_err(write_error)?;
        std::fs::rename(&tmp, &self.path).map_err(write_error)
    }
}
