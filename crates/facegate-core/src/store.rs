//! Template store seam and an in-memory implementation.

use crate::types::{Embedding, Identity, IdentityError};
use std::collections::BTreeMap;
use std::sync::RwLock;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("identity '{0}' is already enrolled")]
    AlreadyExists(String),
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error("store backend failed: {0}")]
    Backend(String),
}

/// Source of enrolled identities and sink for new templates.
///
/// `list_identities` must return a stable order (by identifier) so that
/// tie-breaking in the matcher is deterministic.
pub trait TemplateStore {
    fn list_identities(&self) -> Result<Vec<Identity>, StoreError>;

    fn identity_exists(&self, id: &str) -> Result<bool, StoreError>;

    /// Insert a new identity with its templates.
    ///
    /// Fails with [`StoreError::AlreadyExists`] if `id` is taken; the check
    /// and the insert must be atomic.
    fn append_templates(
        &self,
        id: &str,
        name: &str,
        embeddings: Vec<Embedding>,
    ) -> Result<(), StoreError>;
}

impl<T: TemplateStore + ?Sized> TemplateStore for &T {
    fn list_identities(&self) -> Result<Vec<Identity>, StoreError> {
        (**self).list_identities()
    }

    fn identity_exists(&self, id: &str) -> Result<bool, StoreError> {
        (**self).identity_exists(id)
    }

    fn append_templates(
        &self,
        id: &str,
        name: &str,
        embeddings: Vec<Embedding>,
    ) -> Result<(), StoreError> {
        (**self).append_templates(id, name, embeddings)
    }
}

/// Process-local store, ordered by identifier.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    identities: RwLock<BTreeMap<String, Identity>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop an identity and all its templates. Returns whether it existed.
    pub fn remove(&self, id: &str) -> Result<bool, StoreError> {
        let mut map = self.write()?;
        Ok(map.remove(id).is_some())
    }

    fn read(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, BTreeMap<String, Identity>>, StoreError> {
        self.identities
            .read()
            .map_err(|_| StoreError::Backend("store lock poisoned".into()))
    }

    fn write(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, BTreeMap<String, Identity>>, StoreError> {
        self.identities
            .write()
            .map_err(|_| StoreError::Backend("store lock poisoned".into()))
    }
}

impl TemplateStore for InMemoryStore {
    fn list_identities(&self) -> Result<Vec<Identity>, StoreError> {
        Ok(self.read()?.values().cloned().collect())
    }

    fn identity_exists(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.read()?.contains_key(id))
    }

    fn append_templates(
        &self,
        id: &str,
        name: &str,
        embeddings: Vec<Embedding>,
    ) -> Result<(), StoreError> {
        let identity = Identity::new(id, name, embeddings)?;
        // Check and insert under one write lock.
        let mut map = self.write()?;
        if map.contains_key(id) {
            return Err(StoreError::AlreadyExists(id.to_string()));
        }
        map.insert(id.to_string(), identity);
        Ok(())
    }
}
