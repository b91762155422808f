//! Acting identity.
//!
//! Authentication happens outside this workspace. The host resolves the
//! caller and hands the engine an opaque [`Principal`]: an id plus the
//! organizations the caller belongs to.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Principal id that stands for "everyone, including unauthenticated users".
pub const ANONYMOUS_PRINCIPAL: &str = "anonymousUser";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    #[serde(default)]
    pub organization_ids: BTreeSet<String>,
}

impl Principal {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            organization_ids: BTreeSet::new(),
        }
    }

    pub fn anonymous() -> Self {
        Self::new(ANONYMOUS_PRINCIPAL)
    }

    /// Builder-style organization membership.
    pub fn with_organization(mut self, organization_id: impl Into<String>) -> Self {
        self.organization_ids.insert(organization_id.into());
        self
    }

    pub fn is_anonymous(&self) -> bool {
        self.id == ANONYMOUS_PRINCIPAL
    }

    pub fn is_member_of(&self, organization_id: &str) -> bool {
        self.organization_ids.contains(organization_id)
    }
}
