// store.rs — LedgerStore: persistence for the meditation ledger.
//
// The whole ledger lives in one JSON document:
//
//   { "version": 1, "last_updated": "...", "records": [ ... ] }
//
// Records are persisted as an array rather than a map so that a duplicated
// identity in a hand-edited file is detected instead of silently collapsed.
// Explicitly removed identities are kept in `removed` so that rescanning the
// full source history does not bring them back.
// Saves go through a temp file in the same directory followed by a rename,
// so a crash mid-write leaves the previous ledger intact.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::record::{is_valid_identity, MeditationRecord};

/// On-disk format version understood by this build.
pub const LEDGER_VERSION: u32 = 1;

#[derive(Deserialize)]
struct LedgerFile {
    version: u32,
    #[serde(default)]
    records: Vec<MeditationRecord>,
    #[serde(default)]
    removed: BTreeSet<String>,
}

#[derive(Serialize)]
struct LedgerFileRef<'a> {
    version: u32,
    last_updated: DateTime<Utc>,
    records: Vec<&'a MeditationRecord>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    removed: &'a BTreeSet<String>,
}

/// The local ledger, loaded into memory for the duration of one command.
#[derive(Debug)]
pub struct LedgerStore {
    path: PathBuf,
    records: BTreeMap<String, MeditationRecord>,
    removed: BTreeSet<String>,
}

impl LedgerStore {
    /// Load the ledger at `path`.
    ///
    /// A missing file is an empty ledger. Anything that exists but cannot be
    /// parsed, has an unknown version, or holds an identity that is invalid
    /// or repeated is [`LedgerError::CorruptLedger`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();

        if !path.exists() {
            tracing::info!(path = %path.display(), "no ledger yet, starting empty");
            return Ok(Self {
                path,
                records: BTreeMap::new(),
                removed: BTreeSet::new(),
            });
        }

        let json = fs::read_to_string(&path).map_err(|source| LedgerError::io(&path, source))?;
        let file: LedgerFile = serde_json::from_str(&json)
            .map_err(|e| LedgerError::corrupt(&path, format!("unparseable JSON: {e}")))?;

        if file.version != LEDGER_VERSION {
            return Err(LedgerError::corrupt(
                &path,
                format!("unsupported ledger version {}", file.version),
            ));
        }

        let mut records = BTreeMap::new();
        for record in file.records {
            if !is_valid_identity(&record.identity) {
                return Err(LedgerError::corrupt(
                    &path,
                    format!("invalid identity {:?}", record.identity),
                ));
            }
            if records.contains_key(&record.identity) {
                return Err(LedgerError::corrupt(
                    &path,
                    format!("duplicate identity {}", record.identity),
                ));
            }
            records.insert(record.identity.clone(), record);
        }

        tracing::debug!(path = %path.display(), records = records.len(), "ledger loaded");
        Ok(Self {
            path,
            records,
            removed: file.removed,
        })
    }

    /// Insert every candidate whose identity is not already present.
    ///
    /// Existing records are never overwritten and removed identities are
    /// never re-added. Candidates with an invalid identity are skipped.
    /// Returns how many were added.
    pub fn merge(&mut self, candidates: impl IntoIterator<Item = MeditationRecord>) -> usize {
        let mut added = 0;
        for candidate in candidates {
            if !is_valid_identity(&candidate.identity) {
                tracing::warn!(identity = ?candidate.identity, "skipping candidate with invalid identity");
                continue;
            }
            if self.records.contains_key(&candidate.identity)
                || self.removed.contains(&candidate.identity)
            {
                continue;
            }
            tracing::info!(identity = %candidate.identity, "new ledger record");
            self.records.insert(candidate.identity.clone(), candidate);
            added += 1;
        }
        added
    }

    /// Persist the full ledger atomically.
    pub fn save(&self) -> Result<(), LedgerError> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|source| LedgerError::io(&dir, source))?;

        let doc = LedgerFileRef {
            version: LEDGER_VERSION,
            last_updated: Utc::now(),
            records: self.records.values().collect(),
            removed: &self.removed,
        };
        let json = serde_json::to_string_pretty(&doc)?;

        let mut temp =
            tempfile::NamedTempFile::new_in(&dir).map_err(|source| LedgerError::io(&dir, source))?;
        temp.write_all(json.as_bytes())
            .map_err(|source| LedgerError::io(temp.path(), source))?;
        temp.as_file()
            .sync_all()
            .map_err(|source| LedgerError::io(temp.path(), source))?;
        temp.persist(&self.path)
            .map_err(|e| LedgerError::io(&self.path, e.error))?;

        tracing::debug!(path = %self.path.display(), records = self.records.len(), "ledger saved");
        Ok(())
    }

    /// Look up a record by identity.
    pub fn get(&self, identity: &str) -> Option<&MeditationRecord> {
        self.records.get(identity)
    }

    /// All records, in identity order.
    pub fn records(&self) -> impl Iterator<Item = &MeditationRecord> {
        self.records.values()
    }

    /// Explicitly remove a record (a manual correction).
    ///
    /// The identity is remembered so later merges skip it.
    pub fn remove(&mut self, identity: &str) -> Option<MeditationRecord> {
        let removed = self.records.remove(identity);
        if removed.is_some() {
            self.removed.insert(identity.to_string());
            tracing::info!(identity, "ledger record removed");
        }
        removed
    }

    /// Identities removed by hand; merges skip them.
    pub fn removed(&self) -> impl Iterator<Item = &str> {
        self.removed.iter().map(String::as_str)
    }

    /// Record the remote datapoint backing `identity`.
    ///
    /// Returns `true` if the stored value changed.
    pub fn set_remote_id(&mut self, identity: &str, remote_id: &str) -> bool {
        match self.records.get_mut(identity) {
            Some(record) if record.remote_id.as_deref() != Some(remote_id) => {
                record.remote_id = Some(remote_id.to_string());
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
