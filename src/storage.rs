//! File-backed record store shared by every entity kind.
//!
//! Each record is one pretty-printed JSON file under
//! `<data_dir>/.<subdir>/<id>.json`. Writes go to a uniquely named
//! `<id>.<nonce>.json.tmp` first and are renamed into place, so a crash never
//! leaves a half-written record. All records are cached in a `DashMap` and
//! validated when loaded.
//!
//! Mutations hold the record's map entry from read to cache update, so
//! writers of one record are serialized and never lose each other's changes.

use std::path::{Path, PathBuf};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::{LeadflowError, Result};
use crate::types::new_id;

pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Human-readable kind used in error messages ("contact", "ab test").
    const KIND: &'static str;

    fn id(&self) -> &str;

    fn created_at(&self) -> i64;

    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

pub struct JsonStore<T: Record> {
    records: DashMap<String, T>,
    dir: PathBuf,
}

fn validate_record_id(kind: &str, id: &str) -> Result<()> {
    let valid = !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(LeadflowError::validation(format!(
            "invalid {kind} id '{id}': only ASCII letters, numbers, '-' and '_' are allowed"
        )));
    }
    Ok(())
}

impl<T: Record> JsonStore<T> {
    pub fn open(data_dir: &Path, subdir: &str) -> Result<Self> {
        let dir = data_dir.join(format!(".{subdir}"));
        std::fs::create_dir_all(&dir)?;
        let store = Self {
            records: DashMap::new(),
            dir,
        };
        store.load_all()?;
        tracing::debug!(
            kind = T::KIND,
            count = store.records.len(),
            "loaded records"
        );
        Ok(store)
    }

    fn load_all(&self) -> Result<()> {
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let data = std::fs::read_to_string(&path)?;
            let record: T = serde_json::from_str(&data).map_err(|e| {
                LeadflowError::Json(format!("{}: {}", path.display(), e))
            })?;
            record.validate()?;
            self.records.insert(record.id().to_string(), record);
        }
        Ok(())
    }

    fn atomic_write(&self, record: &T) -> Result<()> {
        let tmp_path = self
            .dir
            .join(format!("{}.{}.json.tmp", record.id(), new_id()));
        let final_path = self.dir.join(format!("{}.json", record.id()));
        let data = serde_json::to_string_pretty(record)?;
        std::fs::write(&tmp_path, data)?;
        if let Err(err) = std::fs::rename(&tmp_path, &final_path) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(err.into());
        }
        Ok(())
    }

    fn delete_file(&self, id: &str) -> Result<()> {
        match std::fs::remove_file(self.dir.join(format!("{id}.json"))) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    pub fn insert(&self, record: T) -> Result<T> {
        validate_record_id(T::KIND, record.id())?;
        record.validate()?;
        match self.records.entry(record.id().to_string()) {
            Entry::Occupied(_) => Err(LeadflowError::AlreadyExists {
                kind: T::KIND,
                id: record.id().to_string(),
            }),
            Entry::Vacant(slot) => {
                self.atomic_write(&record)?;
                slot.insert(record.clone());
                Ok(record)
            }
        }
    }

    pub fn get(&self, id: &str) -> Result<T> {
        self.records
            .get(id)
            .map(|r| r.clone())
            .ok_or_else(|| LeadflowError::not_found(T::KIND, id))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    /// Every record matching `predicate`, oldest first.
    pub fn filter(&self, predicate: impl Fn(&T) -> bool) -> Vec<T> {
        let mut out: Vec<T> = self
            .records
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        out.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.id().cmp(b.id()))
        });
        out
    }

    pub fn all(&self) -> Vec<T> {
        self.filter(|_| true)
    }

    /// Applies `mutate` to a copy of the record, validates and persists it.
    ///
    /// The entry stays locked until the cache holds the new value. Nothing is
    /// written when `mutate` or validation fails. `mutate` must not call back
    /// into this store.
    pub fn update(&self, id: &str, mutate: impl FnOnce(&mut T) -> Result<()>) -> Result<T> {
        let mut entry = self
            .records
            .get_mut(id)
            .ok_or_else(|| LeadflowError::not_found(T::KIND, id))?;
        let mut next = entry.value().clone();
        mutate(&mut next)?;
        if next.id() != id {
            return Err(LeadflowError::validation(format!(
                "{} id cannot change from '{id}'",
                T::KIND
            )));
        }
        next.validate()?;
        self.atomic_write(&next)?;
        *entry.value_mut() = next.clone();
        Ok(next)
    }

    /// Removes the record when `check` accepts it, under the same entry lock
    /// as [`JsonStore::update`].
    pub fn remove_if(&self, id: &str, check: impl FnOnce(&T) -> Result<()>) -> Result<T> {
        let mut outcome = Err(LeadflowError::not_found(T::KIND, id));
        let removed = self.records.remove_if(id, |_, record| {
            outcome = check(record).and_then(|()| self.delete_file(id));
            outcome.is_ok()
        });
        match removed {
            Some((_, record)) => Ok(record),
            None => Err(outcome
                .err()
                .unwrap_or_else(|| LeadflowError::not_found(T::KIND, id))),
        }
    }

    pub fn remove(&self, id: &str) -> Result<T> {
        self.remove_if(id, |_| Ok(()))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
