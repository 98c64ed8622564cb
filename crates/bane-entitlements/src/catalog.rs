// catalog.rs — Per-key defaults applied at issuance.
//
// An issue request may omit the stage and caps; the catalog fills them in.
// Keys the catalog does not know get stage A and a single `<key>:use` cap.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::entitlement::Stage;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyDefaults {
    pub stage: Stage,
    pub caps: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyCatalog {
    keys: BTreeMap<String, KeyDefaults>,
}

impl KeyCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register defaults for `key`.
    pub fn with_key<I, S>(mut self, key: impl Into<String>, stage: Stage, caps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keys.insert(
            key.into(),
            KeyDefaults {
                stage,
                caps: caps.into_iter().map(Into::into).collect(),
            },
        );
        self
    }

    /// Registered defaults, else stage A and `<key>:use`.
    pub fn defaults_for(&self, key: &str) -> KeyDefaults {
        self.keys.get(key).cloned().unwrap_or_else(|| KeyDefaults {
            stage: Stage::A,
            caps: vec![format!("{}:use", key)],
        })
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }
}
