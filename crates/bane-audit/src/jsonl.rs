// jsonl.rs — Append-only JSONL store.
//
// Each record kind lives in its own JSON Lines file under one directory:
// `audits.jsonl`, `events.jsonl`, `incidents.jsonl`. The format is simple,
// append-friendly, and easy to inspect with jq/grep. Writes are serialized
// through a mutex so concurrent appenders never interleave partial lines.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StoreError;
use crate::record::{AuditRecord, EventRecord, IncidentRecord};
use crate::store::{newest_first, BaneStore};

const AUDITS_FILE: &str = "audits.jsonl";
const EVENTS_FILE: &str = "events.jsonl";
const INCIDENTS_FILE: &str = "incidents.jsonl";

/// A directory of JSONL files implementing [`BaneStore`].
pub struct JsonlStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlStore {
    /// Open (or create) a store rooted at `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    /// Return the directory backing this store.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn append_line<T: Serialize>(&self, file_name: &str, record: &T) -> Result<(), StoreError> {
        // Serialize before taking the lock; a bad record never blocks writers.
        let json = serde_json::to_string(record)?;
        let path = self.dir.join(file_name);

        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;
        writeln!(file, "{}", json).map_err(|source| StoreError::Io { path, source })?;
        Ok(())
    }

    fn read_all<T: DeserializeOwned>(&self, file_name: &str) -> Result<Vec<T>, StoreError> {
        let path = self.dir.join(file_name);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&path).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;

        let mut items = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;
            if line.trim().is_empty() {
                continue;
            }
            items.push(serde_json::from_str(&line)?);
        }
        Ok(items)
    }
}

impl BaneStore for JsonlStore {
    fn append_audit(&self, record: &AuditRecord) -> Result<(), StoreError> {
        self.append_line(AUDITS_FILE, record)
    }

    fn append_event(&self, event: &EventRecord) -> Result<(), StoreError> {
        self.append_line(EVENTS_FILE, event)
    }

    fn recent_audits(&self, limit: usize) -> Result<Vec<AuditRecord>, StoreError> {
        let all: Vec<AuditRecord> = self.read_all(AUDITS_FILE)?;
        Ok(newest_first(&all, limit))
    }

    fn append_incident(&self, incident: &IncidentRecord) -> Result<(), StoreError> {
        self.append_line(INCIDENTS_FILE, incident)
    }

    fn recent_incidents(&self, limit: usize) -> Result<Vec<IncidentRecord>, StoreError> {
        let all: Vec<IncidentRecord> = self.read_all(INCIDENTS_FILE)?;
        Ok(newest_first(&all, limit))
    }

    fn incident_by_trace(&self, trace_id: &str) -> Result<Option<IncidentRecord>, StoreError> {
        let all: Vec<IncidentRecord> = self.read_all(INCIDENTS_FILE)?;
        Ok(all.into_iter().find(|i| i.trace_id == trace_id))
    }
}
