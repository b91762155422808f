use serde::{Deserialize, Serialize};

use lowcode_core::new_id;

use super::policy::{EntityKind, PolicyHolder, PolicySet};
use super::versioned::{Publishable, Versioned};

/// One canvas of a page. `dsl` is the widget tree, opaque to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layout {
    pub id: String,
    #[serde(default)]
    pub dsl: serde_json::Value,
}

impl Layout {
    pub fn empty() -> Self {
        Self {
            id: new_id(),
            dsl: serde_json::json!({}),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageContent {
    pub name: String,
    #[serde(default)]
    pub layouts: Vec<Layout>,
    /// Set when the page was removed from this snapshot's page list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<String>,
}

impl PageContent {
    pub fn new(name: impl Into<String>, layouts: Vec<Layout>) -> Self {
        Self {
            name: name.into(),
            layouts,
            deleted_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub id: String,
    pub application_id: String,
    pub content: Versioned<PageContent>,
    #[serde(default)]
    pub policies: PolicySet,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

impl Page {
    /// The page as seen in the given mode, None when it does not exist there.
    pub fn view(&self, view_mode: bool) -> Option<PageView> {
        let content = self.content.view(view_mode)?;
        if content.deleted_at.is_some() {
            return None;
        }
        Some(PageView {
            id: self.id.clone(),
            application_id: self.application_id.clone(),
            name: content.name.clone(),
            layouts: content.layouts.clone(),
        })
    }
}

/// Input for creating a page.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreatePage {
    pub application_id: String,
    pub name: String,
    /// An empty layout is created when none is supplied.
    #[serde(default)]
    pub layouts: Vec<Layout>,
}

/// One snapshot of a page, flattened for callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageView {
    pub id: String,
    pub application_id: String,
    pub name: String,
    pub layouts: Vec<Layout>,
}

/// Entry of an application's page listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageSummary {
    pub id: String,
    pub name: String,
    pub is_default: bool,
}

impl PolicyHolder for Page {
    fn kind(&self) -> EntityKind {
        EntityKind::Page
    }
    fn policies(&self) -> &PolicySet {
        &self.policies
    }
    fn policies_mut(&mut self) -> &mut PolicySet {
        &mut self.policies
    }
}

impl Publishable for Page {
    fn publish(&mut self) {
        self.content.publish();
    }

    fn is_published(&self) -> bool {
        self.content.is_published()
    }

    fn is_pending_delete(&self) -> bool {
        self.content.unpublished.deleted_at.is_some()
    }

    fn mark_pending_delete(&mut self, at: &str) {
        self.content.unpublished.deleted_at = Some(at.to_string());
    }
}
