//! Canonical entity references.
//!
//! Clients send references either as plain id strings or as expanded
//! objects (`{"id": ...}` / `{"_id": ...}`). They are normalized once,
//! while deserializing, so services only ever see a plain id.

use serde::{Deserialize, Deserializer, Serialize};

/// A reference to another entity, normalized to its string id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct EntityRef(pub String);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawRef {
    Id(String),
    Expanded {
        #[serde(alias = "_id")]
        id: String,
    },
}

impl<'de> Deserialize<'de> for EntityRef {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let id = match RawRef::deserialize(deserializer)? {
            RawRef::Id(id) => id,
            RawRef::Expanded { id } => id,
        };
        Ok(EntityRef(id.trim().to_string()))
    }
}

impl EntityRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl From<EntityRef> for String {
    fn from(r: EntityRef) -> Self {
        r.0
    }
}

/// Flatten a list of references into plain ids, keeping first occurrences only.
pub fn normalize_refs(refs: Vec<EntityRef>) -> Vec<String> {
    let mut ids: Vec<String> = Vec::with_capacity(refs.len());
    for r in refs {
        if !r.0.is_empty() && !ids.contains(&r.0) {
            ids.push(r.0);
        }
    }
    ids
}
