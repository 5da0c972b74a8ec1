//! Durable mirror for the response cache.
//!
//! Each entry is one JSON file named by its fingerprint, written to a
//! temporary sibling and renamed into place so a crash mid-write never
//! leaves a torn entry behind.

use std::fs;
use std::io;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::CachedResponse;

#[derive(Serialize, Deserialize)]
struct MirrorEntry {
    response: CachedResponse,
    /// RFC3339 insertion time; the TTL clock restarts from this on rehydrate.
    inserted_at: String,
}

/// Directory-backed persistence for cache entries.
pub struct DurableMirror {
    dir: PathBuf,
}

impl DurableMirror {
    /// Open (creating if needed) the mirror directory.
    pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Persist one entry atomically.
    pub fn store(
        &self,
        key: &str,
        response: &CachedResponse,
        inserted_at: DateTime<Utc>,
    ) -> io::Result<()> {
        let entry = MirrorEntry {
            response: response.clone(),
            inserted_at: inserted_at.to_rfc3339(),
        };
        let payload = serde_json::to_vec_pretty(&entry)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let tmp = self.dir.join(format!(".{key}.tmp"));
        fs::write(&tmp, payload)?;
        fs::rename(&tmp, self.entry_path(key))
    }

    /// Remove one entry; missing files are not an error.
    pub fn remove(&self, key: &str) {
        let _ = fs::remove_file(self.entry_path(key));
    }

    /// Load every readable entry. Unreadable files are skipped with a
    /// warning rather than failing the whole rehydrate.
    pub fn load_all(&self) -> Vec<(String, CachedResponse, DateTime<Utc>)> {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return Vec::new();
        };

        let mut loaded = Vec::new();
        for dir_entry in entries.flatten() {
            let path = dir_entry.path();
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if stem.starts_with('.') || path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed: Option<MirrorEntry> = fs::read_to_string(&path)
                .ok()
                .and_then(|raw| serde_json::from_str(&raw).ok());
            match parsed {
                Some(entry) => {
                    let inserted_at = DateTime::parse_from_rfc3339(&entry.inserted_at)
                        .map(|dt| dt.with_timezone(&Utc))
                        .unwrap_or_else(|_| Utc::now());
                    loaded.push((stem.to_string(), entry.response, inserted_at));
                }
                None => {
                    tracing::warn!(path = %path.display(), "skipping unreadable cache mirror entry");
                }
            }
        }
        loaded
    }
}
