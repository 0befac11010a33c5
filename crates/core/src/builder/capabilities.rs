//! Catalog of external capabilities generated code may reference.
//!
//! The builder resolves every `InvokeExternal` against a catalog. Anything not listed fails the
//! build instead of being emitted as a dangling reference.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::artifact::format::descriptor;
use crate::model::{SemanticType, Signature};

/// Fully-qualified identity of a capability: owner, member, and signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CapabilityId {
    pub target: String,
    pub method: String,
    pub signature: Signature,
}

impl CapabilityId {
    pub fn new(target: impl Into<String>, method: impl Into<String>, signature: Signature) -> Self {
        Self { target: target.into(), method: method.into(), signature }
    }

    pub fn descriptor(&self) -> String {
        descriptor(&self.signature)
    }
}

impl fmt::Display for CapabilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}{}", self.target, self.method, self.descriptor())
    }
}

/// Known capabilities with a one-line summary each. Ordered for stable listings.
#[derive(Debug, Clone, Default)]
pub struct CapabilityCatalog {
    entries: BTreeMap<CapabilityId, String>,
}

impl CapabilityCatalog {
    /// An empty catalog; every external reference will fail to resolve.
    pub fn new() -> Self {
        Self { entries: BTreeMap::new() }
    }

    /// Standard output/error printing.
    pub fn standard() -> Self {
        let mut catalog = Self::new();
        for ty in [SemanticType::String, SemanticType::Int, SemanticType::Bool] {
            catalog.register(
                CapabilityId::new("std.out", "println", Signature::consumer(ty)),
                "Write a value and a newline to standard output",
            );
        }
        catalog.register(
            CapabilityId::new("std.out", "print", Signature::consumer(SemanticType::String)),
            "Write a string to standard output without a newline",
        );
        catalog.register(
            CapabilityId::new("std.err", "println", Signature::consumer(SemanticType::String)),
            "Write a string and a newline to standard error",
        );
        catalog
    }

    pub fn register(&mut self, id: CapabilityId, summary: impl Into<String>) -> &mut Self {
        self.entries.insert(id, summary.into());
        self
    }

    pub fn contains(&self, id: &CapabilityId) -> bool {
        self.entries.contains_key(id)
    }

    /// Look up by parts without allocating an id.
    pub fn lookup(
        &self,
        target: &str,
        method: &str,
        signature: &Signature,
    ) -> Option<&CapabilityId> {
        self.entries
            .keys()
            .find(|id| id.target == target && id.method == method && &id.signature == signature)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CapabilityId, &str)> {
        self.entries.iter().map(|(id, summary)| (id, summary.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
