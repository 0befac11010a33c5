use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::artifact::{BinaryArtifact, DecodeError};

/// Host-side failure to turn an artifact into a live unit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MaterializeError {
    #[error("Malformed artifact: {0}")]
    Decode(#[from] DecodeError),
    #[error("Verification failed in member {member:?}: {detail}")]
    Verify { member: String, detail: String },
    #[error("Unlinkable reference {reference}")]
    Link { reference: String },
    #[error("Host rejected artifact: {0}")]
    Rejected(String),
}

/// Failure while instantiating a unit or calling one of its members.
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("No callable member named {0:?}")]
    NoSuchMember(String),
    #[error("Unit {0:?} cannot be instantiated")]
    NotInstantiable(String),
    #[error(
        "Member {member:?} has signature {descriptor}; only zero-argument members can be invoked"
    )]
    UnsupportedSignature { member: String, descriptor: String },
    #[error("Execution of {member:?} failed: {detail}")]
    Execution { member: String, detail: String },
    #[error("Failed to write program output: {0}")]
    Output(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("Unit not found: {0}")]
    UnitNotFound(String),
    #[error("Failed to materialize unit {name}: {source}")]
    Materialization {
        name: String,
        #[source]
        source: MaterializeError,
    },
}

/// Host capability that turns artifact bytes into a live, invocable unit.
pub trait Materializer: Send + Sync {
    type Unit: Send + Sync;

    fn materialize(&self, artifact: &BinaryArtifact) -> Result<Self::Unit, MaterializeError>;
    fn name(&self) -> &'static str;
}

/// Host capability that instantiates a unit and calls one of its zero-argument members.
pub trait Invoker: Send + Sync {
    type Unit;

    fn invoke(&self, unit: &Self::Unit, member: &str) -> Result<(), InvokeError>;
}

impl<T: Materializer + ?Sized> Materializer for Arc<T> {
    type Unit = T::Unit;

    fn materialize(&self, artifact: &BinaryArtifact) -> Result<Self::Unit, MaterializeError> {
        (**self).materialize(artifact)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

impl<T: Invoker + ?Sized> Invoker for Arc<T> {
    type Unit = T::Unit;

    fn invoke(&self, unit: &Self::Unit, member: &str) -> Result<(), InvokeError> {
        (**self).invoke(unit, member)
    }
}

/// Observable lifecycle state of a registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Registered,
    Materialized,
}

impl EntryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryStatus::Registered => "registered",
            EntryStatus::Materialized => "materialized",
        }
    }
}

struct Entry<U> {
    artifact: BinaryArtifact,
    materialized: Option<Arc<U>>,
}

impl<U> Entry<U> {
    fn status(&self) -> EntryStatus {
        if self.materialized.is_some() {
            EntryStatus::Materialized
        } else {
            EntryStatus::Registered
        }
    }
}

/// Registry of named artifacts that materializes them on demand and caches the result.
///
/// All operations take one lock over the whole map, so `register` and `resolve` on the same
/// name never interleave. Materialization happens at most once per registered artifact; a
/// failed attempt leaves the entry registered so the next `resolve` retries.
///
/// A loader may have a parent. Names not registered locally are resolved through the parent.
pub struct DynamicLoader<M: Materializer> {
    materializer: M,
    entries: Mutex<HashMap<String, Entry<M::Unit>>>,
    parent: Option<Arc<DynamicLoader<M>>>,
}

impl<M: Materializer> DynamicLoader<M> {
    pub fn new(materializer: M) -> Self {
        Self { materializer, entries: Mutex::new(HashMap::new()), parent: None }
    }

    /// A loader that falls back to `parent` for names it does not hold itself.
    pub fn with_parent(materializer: M, parent: Arc<DynamicLoader<M>>) -> Self {
        Self { materializer, entries: Mutex::new(HashMap::new()), parent: Some(parent) }
    }

    pub fn materializer(&self) -> &M {
        &self.materializer
    }

    pub fn parent(&self) -> Option<&Arc<DynamicLoader<M>>> {
        self.parent.as_ref()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry<M::Unit>>> {
        // Entries are only mutated after the fallible step succeeds, so a poisoned map is
        // still consistent.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `artifact` under `name`, replacing any previous entry and its cached unit.
    pub fn register(&self, name: impl Into<String>, artifact: BinaryArtifact) {
        let name = name.into();
        let bytes = artifact.len();
        // Shares the buffer; the digest is only computed if the event is enabled.
        let logged = artifact.clone();
        let previous =
            self.lock().insert(name.clone(), Entry { artifact, materialized: None });
        match previous {
            Some(old) => info!(
                unit = %name,
                bytes,
                sha256 = %logged.digest(),
                dropped_cached = old.materialized.is_some(),
                "unit re-registered"
            ),
            None => info!(unit = %name, bytes, sha256 = %logged.digest(), "unit registered"),
        }
    }

    /// Resolve `name` to a live unit, materializing it on first use.
    pub fn resolve(&self, name: &str) -> Result<Arc<M::Unit>, LoaderError> {
        {
            let mut entries = self.lock();
            if let Some(entry) = entries.get_mut(name) {
                if let Some(unit) = &entry.materialized {
                    debug!(unit = %name, "resolved from cache");
                    return Ok(Arc::clone(unit));
                }

                debug!(unit = %name, host = self.materializer.name(), "materializing");
                return match self.materializer.materialize(&entry.artifact) {
                    Ok(unit) => {
                        let unit = Arc::new(unit);
                        entry.materialized = Some(Arc::clone(&unit));
                        info!(unit = %name, host = self.materializer.name(), "unit materialized");
                        Ok(unit)
                    }
                    Err(source) => {
                        warn!(unit = %name, error = %source, "materialization failed");
                        Err(LoaderError::Materialization { name: name.to_string(), source })
                    }
                };
            }
        }

        match &self.parent {
            Some(parent) => {
                debug!(unit = %name, "delegating to parent loader");
                parent.resolve(name).map_err(|err| match err {
                    LoaderError::UnitNotFound(_) => LoaderError::UnitNotFound(name.to_string()),
                    other => other,
                })
            }
            None => Err(LoaderError::UnitNotFound(name.to_string())),
        }
    }

    /// Remove an entry. Returns whether anything was registered under `name`.
    pub fn unregister(&self, name: &str) -> bool {
        let removed = self.lock().remove(name).is_some();
        if removed {
            info!(unit = %name, "unit unregistered");
        }
        removed
    }

    /// Whether `name` is registered locally (the parent is not consulted).
    pub fn contains(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    pub fn status(&self, name: &str) -> Option<EntryStatus> {
        self.lock().get(name).map(Entry::status)
    }

    pub fn is_materialized(&self, name: &str) -> bool {
        self.status(name) == Some(EntryStatus::Materialized)
    }

    /// The artifact currently registered under `name`.
    pub fn artifact(&self, name: &str) -> Option<BinaryArtifact> {
        self.lock().get(name).map(|entry| entry.artifact.clone())
    }

    /// Sorted list of locally registered names.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop every cached unit. Entries stay registered and will materialize again on demand.
    /// Returns how many cached units were released.
    pub fn teardown(&self) -> usize {
        let mut released = 0;
        for entry in self.lock().values_mut() {
            if entry.materialized.take().is_some() {
                released += 1;
            }
        }
        info!(released, "loader torn down");
        released
    }
}

impl<M: Materializer> fmt::Debug for DynamicLoader<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicLoader")
            .field("host", &self.materializer.name())
            .field("units", &self.names())
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}
