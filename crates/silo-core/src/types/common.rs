//! Shared wire types

use serde::{Deserialize, Serialize};

/// Canonical owner reported in listings and ACLs. The server runs with a
/// single credential pair, so there is exactly one owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub id: String,
    pub display_name: String,
}

impl Owner {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
        }
    }
}
