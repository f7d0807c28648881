use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::FileError;

/// Durable address → translation map for resumable runs.
#[derive(Clone, Debug)]
pub struct Checkpoint {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl Checkpoint {
    /// Reads the checkpoint at `path`. An absent or unreadable file starts an empty map.
    pub fn load(path: &Path) -> Self {
        let entries = match std::fs::read_to_string(path) {
            Ok(text) => match serde_json::from_str::<BTreeMap<String, String>>(text.trim_start_matches('\u{feff}')) {
                Ok(map) => {
                    tracing::info!("checkpoint loaded: {} entr(ies) from {}", map.len(), path.display());
                    map
                }
                Err(e) => {
                    tracing::warn!("checkpoint {} is corrupt ({e}); starting from an empty map", path.display());
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                tracing::warn!("checkpoint {} could not be read ({e}); starting from an empty map", path.display());
                BTreeMap::new()
            }
        };
        Self {
            path: path.to_path_buf(),
            entries,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, address: &str) -> Option<&str> {
        self.entries.get(address).map(String::as_str)
    }

    /// Adds or overwrites; never removes.
    pub fn merge(&mut self, pairs: impl IntoIterator<Item = (String, String)>) {
        self.entries.extend(pairs);
    }

    /// Writes the full map as indented JSON through a sibling temp file.
    pub fn save(&self) -> Result<(), FileError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| FileError::new("create directory", parent, e))?;
        }
        let json = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| FileError::new("serialize", &self.path, std::io::Error::other(e)))?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, json).map_err(|e| FileError::new("write", &tmp, e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| FileError::new("replace", &self.path, e))?;
        Ok(())
    }
}
