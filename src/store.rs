use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{de::DeserializeOwned, Serialize};

/// A keyed collection persisted as a single JSON object.
///
/// Every mutation rewrites the whole file. Writes go to a sibling
/// temporary file that is then renamed over the target, so a crash
/// leaves either the old or the new contents on disk.
///
/// Keys are kept sorted, which gives a stable numbering when entries
/// are listed for selection.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonStore<E> {
    path: PathBuf,
    entries: BTreeMap<String, E>,
}

impl<E> JsonStore<E>
where
    E: Serialize + DeserializeOwned,
{
    /// Reads the store at `path`, or starts an empty one if the file does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            debug!("No store at {}, starting empty", path.display());
            return Ok(JsonStore {
                path,
                entries: BTreeMap::new(),
            });
        }
        let text = fs::read_to_string(&path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        let entries = if text.trim().is_empty() {
            BTreeMap::new()
        } else {
            serde_json::from_str(&text)
                .with_context(|| format!("Could not parse {}", path.display()))?
        };
        Ok(JsonStore { path, entries })
    }

    /// Overwrites the file with the current entries.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Could not create {}", parent.display()))?;
            }
        }
        let text = serde_json::to_string_pretty(&self.entries)?;
        let tmp = self.tmp_path();
        fs::write(&tmp, text).with_context(|| format!("Could not write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Could not replace {}", self.path.display()))?;
        info!("Saved {} entries to {}", self.entries.len(), self.path.display());
        Ok(())
    }

    /// Inserts or replaces an entry and persists. Returns the replaced entry.
    pub fn add(&mut self, key: &str, entry: E) -> Result<Option<E>> {
        let previous = self.entries.insert(key.to_string(), entry);
        self.save()?;
        Ok(previous)
    }

    /// Deletes an entry and persists. `None` if the key was not present.
    pub fn remove(&mut self, key: &str) -> Result<Option<E>> {
        let Some(removed) = self.entries.remove(key) else {
            return Ok(None);
        };
        self.save()?;
        Ok(Some(removed))
    }

    /// Applies `f` to an existing entry and persists. `None` if the key was not present.
    pub fn modify<F>(&mut self, key: &str, f: F) -> Result<Option<&E>>
    where
        F: FnOnce(&mut E),
    {
        match self.entries.get_mut(key) {
            Some(entry) => f(entry),
            None => return Ok(None),
        }
        self.save()?;
        Ok(self.entries.get(key))
    }

    /// Replaces every entry at once and persists.
    pub fn replace_all(&mut self, entries: BTreeMap<String, E>) -> Result<()> {
        self.entries = entries;
        self.save()
    }

    /// Removes every entry and persists.
    pub fn clear(&mut self) -> Result<()> {
        self.entries.clear();
        self.save()
    }
}

impl<E> JsonStore<E> {
    pub fn get(&self, key: &str) -> Option<&E> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &E)> {
        self.entries.iter()
    }

    /// Entry at a zero-based position in listing order.
    pub fn nth(&self, index: usize) -> Option<(&String, &E)> {
        self.entries.iter().nth(index)
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
