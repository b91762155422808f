use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::policy::{EntityKind, PolicyHolder, PolicySet};
use super::versioned::Versioned;

/// Root of the application graph.
///
/// `pages` is the draft page list and `published_pages` the one served to
/// end users. The two lists are maintained independently; each carries
/// exactly one default entry when non-empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub id: String,
    pub organization_id: String,
    /// Unique among non-deleted applications of the organization.
    pub name: String,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub pages: Vec<PageRef>,
    #[serde(default)]
    pub published_pages: Vec<PageRef>,
    #[serde(default)]
    pub layout: Versioned<AppLayout>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_application_metadata: Option<GitApplicationMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloned_from_application_id: Option<String>,
    #[serde(default)]
    pub policies: PolicySet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_edited_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_deployed_at: Option<String>,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRef {
    pub page_id: String,
    #[serde(default)]
    pub is_default: bool,
}

impl PageRef {
    pub fn new(page_id: impl Into<String>, is_default: bool) -> Self {
        Self {
            page_id: page_id.into(),
            is_default,
        }
    }
}

/// Canvas sizing used by the editor and viewer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppLayout {
    #[default]
    Desktop,
    Tablet,
    Mobile,
    Fluid,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitApplicationMetadata {
    /// Root application of the git indirection chain. Unset until keys are
    /// first generated; equals the application's own id on the root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_application_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_auth: Option<GitAuth>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitAuth {
    /// OpenSSH `authorized_keys` line.
    pub public_key: String,
    /// Hex-encoded ed25519 seed.
    pub private_key: String,
    pub generated_at: String,
}

/// Input for creating an application.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateApplication {
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub layout: Option<AppLayout>,
}

/// Partial update. Visibility is not editable here.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateApplication {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub layout: Option<AppLayout>,
}

impl Application {
    /// Page ids from both lists, draft order first, deduplicated.
    pub fn reachable_page_ids(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.pages
            .iter()
            .chain(&self.published_pages)
            .filter(|r| seen.insert(r.page_id.as_str()))
            .map(|r| r.page_id.clone())
            .collect()
    }

    pub fn default_page_id(&self, view_mode: bool) -> Option<&str> {
        let refs = if view_mode { &self.published_pages } else { &self.pages };
        refs.iter().find(|r| r.is_default).map(|r| r.page_id.as_str())
    }

    /// Make `page_id` the default of every list that contains it.
    /// Returns false when neither list does.
    pub fn make_page_default(&mut self, page_id: &str) -> bool {
        let draft = set_default_page(&mut self.pages, page_id);
        let published = set_default_page(&mut self.published_pages, page_id);
        draft || published
    }

    pub fn root_application_id(&self) -> Option<&str> {
        self.git_application_metadata
            .as_ref()
            .and_then(|m| m.default_application_id.as_deref())
    }
}

/// Set `page_id` as the only default of `refs`. No-op returning false
/// when the list does not contain it.
pub fn set_default_page(refs: &mut [PageRef], page_id: &str) -> bool {
    if !refs.iter().any(|r| r.page_id == page_id) {
        return false;
    }
    for r in refs.iter_mut() {
        r.is_default = r.page_id == page_id;
    }
    true
}

/// Restore the single-default invariant: keep the first default, or
/// promote the first entry when there is none.
pub fn ensure_single_default(refs: &mut [PageRef]) {
    let mut found = false;
    for r in refs.iter_mut() {
        if r.is_default {
            r.is_default = !found;
            found = true;
        }
    }
    if !found {
        if let Some(first) = refs.first_mut() {
            first.is_default = true;
        }
    }
}

impl PolicyHolder for Application {
    fn kind(&self) -> EntityKind {
        EntityKind::Application
    }
    fn policies(&self) -> &PolicySet {
        &self.policies
    }
    fn policies_mut(&mut self) -> &mut PolicySet {
        &mut self.policies
    }
}
