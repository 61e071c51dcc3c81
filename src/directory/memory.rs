//! In-process directory backend.
//!
//! Mirrors the directory semantics the store relies on: bind by DN and
//! password, base-scope reads, replace-style modifies, and subtree listing.
//! Used by the test suites and for running the service without a directory.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{Attributes, BackendError, DirectoryBackend, DirectorySession, Entry};

/// A write accepted by the backend, recorded in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MemoryWrite {
    Add { dn: String },
    Modify { dn: String, attributes: Vec<String> },
    Delete { dn: String },
    Password { dn: String },
}

#[derive(Debug, Default)]
struct State {
    entries: BTreeMap<String, Entry>,
    passwords: HashMap<String, String>,
    admins: Vec<String>,
    writes: Vec<MemoryWrite>,
    available: bool,
}

#[derive(Clone, Debug)]
pub struct MemoryDirectory {
    state: Arc<Mutex<State>>,
}

impl Default for MemoryDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                available: true,
                ..State::default()
            })),
        }
    }

    /// Register a service account allowed to write any entry.
    pub async fn add_admin(&self, dn: &str, password: &str) {
        let mut state = self.state.lock().await;
        state.passwords.insert(key(dn), password.to_string());
        state.admins.push(key(dn));
    }

    /// Seed an entry (and optionally its password) without recording a write.
    pub async fn seed(&self, entry: Entry, password: Option<&str>) {
        let mut state = self.state.lock().await;
        if let Some(password) = password {
            state.passwords.insert(key(&entry.dn), password.to_string());
        }
        state.entries.insert(key(&entry.dn), entry);
    }

    pub async fn set_available(&self, available: bool) {
        self.state.lock().await.available = available;
    }

    pub async fn entry(&self, dn: &str) -> Option<Entry> {
        self.state.lock().await.entries.get(&key(dn)).cloned()
    }

    pub async fn password(&self, dn: &str) -> Option<String> {
        self.state.lock().await.passwords.get(&key(dn)).cloned()
    }

    pub async fn writes(&self) -> Vec<MemoryWrite> {
        self.state.lock().await.writes.clone()
    }
}

#[async_trait]
impl DirectoryBackend for MemoryDirectory {
    async fn connect(&self) -> Result<Box<dyn DirectorySession>, BackendError> {
        if !self.state.lock().await.available {
            return Err(BackendError::Unavailable("connection refused".to_string()));
        }
        Ok(Box::new(MemorySession {
            state: Arc::clone(&self.state),
            bound: None,
        }))
    }
}

struct MemorySession {
    state: Arc<Mutex<State>>,
    bound: Option<String>,
}

impl MemorySession {
    fn may_write(&self, state: &State, dn: &str) -> Result<(), BackendError> {
        match &self.bound {
            Some(bound) if state.admins.contains(bound) || *bound == key(dn) => Ok(()),
            _ => Err(BackendError::Unavailable(
                "insufficient access rights".to_string(),
            )),
        }
    }
}

fn key(dn: &str) -> String {
    dn.trim().to_ascii_lowercase()
}

fn ensure_available(state: &State) -> Result<(), BackendError> {
    if state.available {
        Ok(())
    } else {
        Err(BackendError::Unavailable("connection reset".to_string()))
    }
}

#[async_trait]
impl DirectorySession for MemorySession {
    async fn bind(&mut self, dn: &str, password: &str) -> Result<(), BackendError> {
        let state = self.state.lock().await;
        ensure_available(&state)?;
        match state.passwords.get(&key(dn)) {
            Some(stored) if !password.is_empty() && stored == password => {
                self.bound = Some(key(dn));
                Ok(())
            }
            _ => Err(BackendError::InvalidCredentials),
        }
    }

    async fn search(&mut self, base: &str, _filter: &str) -> Result<Entry, BackendError> {
        let state = self.state.lock().await;
        ensure_available(&state)?;
        state
            .entries
            .get(&key(base))
            .cloned()
            .ok_or(BackendError::NotFound)
    }

    async fn add(&mut self, dn: &str, attributes: Attributes) -> Result<(), BackendError> {
        let mut state = self.state.lock().await;
        ensure_available(&state)?;
        self.may_write(&state, dn)?;
        if state.entries.contains_key(&key(dn)) {
            return Err(BackendError::Unavailable("entry already exists".to_string()));
        }
        let entry = Entry {
            dn: dn.to_string(),
            attributes: attributes
                .into_iter()
                .filter(|(_, values)| !values.is_empty())
                .collect(),
        };
        state.entries.insert(key(dn), entry);
        state.writes.push(MemoryWrite::Add { dn: dn.to_string() });
        Ok(())
    }

    async fn modify(&mut self, dn: &str, replacements: Attributes) -> Result<(), BackendError> {
        let mut state = self.state.lock().await;
        ensure_available(&state)?;
        self.may_write(&state, dn)?;
        let entry = state
            .entries
            .get_mut(&key(dn))
            .ok_or(BackendError::NotFound)?;
        let mut names = Vec::with_capacity(replacements.len());
        for (name, values) in replacements {
            entry
                .attributes
                .retain(|existing, _| !existing.eq_ignore_ascii_case(&name));
            if !values.is_empty() {
                entry.attributes.insert(name.clone(), values);
            }
            names.push(name);
        }
        state.writes.push(MemoryWrite::Modify {
            dn: dn.to_string(),
            attributes: names,
        });
        Ok(())
    }

    async fn delete(&mut self, dn: &str) -> Result<(), BackendError> {
        let mut state = self.state.lock().await;
        ensure_available(&state)?;
        self.may_write(&state, dn)?;
        state
            .entries
            .remove(&key(dn))
            .ok_or(BackendError::NotFound)?;
        state.passwords.remove(&key(dn));
        state.writes.push(MemoryWrite::Delete { dn: dn.to_string() });
        Ok(())
    }

    async fn modify_password(
        &mut self,
        dn: &str,
        old_password: Option<&str>,
        new_password: &str,
    ) -> Result<(), BackendError> {
        let mut state = self.state.lock().await;
        ensure_available(&state)?;
        self.may_write(&state, dn)?;
        if !state.entries.contains_key(&key(dn)) {
            return Err(BackendError::NotFound);
        }
        if let Some(old) = old_password {
            if state.passwords.get(&key(dn)).map(String::as_str) != Some(old) {
                return Err(BackendError::InvalidCredentials);
            }
        }
        state.passwords.insert(key(dn), new_password.to_string());
        state.writes.push(MemoryWrite::Password { dn: dn.to_string() });
        Ok(())
    }

    async fn list_paged(
        &mut self,
        base: &str,
        _filter: &str,
        page_size: i32,
    ) -> Result<Vec<Entry>, BackendError> {
        let state = self.state.lock().await;
        ensure_available(&state)?;
        let suffix = format!(",{}", key(base));
        let matching: Vec<Entry> = state
            .entries
            .iter()
            .filter(|(dn, _)| dn.ends_with(&suffix))
            .map(|(_, entry)| entry.clone())
            .collect();
        let page_size = usize::try_from(page_size.max(1)).unwrap_or(1);
        Ok(matching
            .chunks(page_size)
            .flat_map(<[Entry]>::to_vec)
            .collect())
    }

    async fn close(&mut self) -> Result<(), BackendError> {
        self.bound = None;
        Ok(())
    }
}
