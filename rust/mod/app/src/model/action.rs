use serde::{Deserialize, Serialize};

use super::plugin::PluginType;
use super::policy::{EntityKind, PolicyHolder, PolicySet};
use super::versioned::{Publishable, Versioned};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionContent {
    pub name: String,
    pub page_id: String,
    /// Datasource the action runs against. JS actions have none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datasource_id: Option<String>,
    #[serde(default)]
    pub config: serde_json::Value,
    #[serde(default)]
    pub execute_on_load: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub id: String,
    pub organization_id: String,
    pub application_id: String,
    pub content: Versioned<ActionContent>,
    #[serde(default)]
    pub policies: PolicySet,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionCollectionContent {
    pub name: String,
    pub page_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datasource_id: Option<String>,
    /// Child actions grouped by this collection.
    #[serde(default)]
    pub action_ids: Vec<String>,
    #[serde(default)]
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionCollection {
    pub id: String,
    pub organization_id: String,
    pub application_id: String,
    pub plugin_type: PluginType,
    pub content: Versioned<ActionCollectionContent>,
    #[serde(default)]
    pub policies: PolicySet,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

/// Input for creating an action on a page.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateAction {
    pub page_id: String,
    pub name: String,
    #[serde(default)]
    pub datasource_id: Option<String>,
    #[serde(default)]
    pub config: serde_json::Value,
    #[serde(default)]
    pub execute_on_load: bool,
}

/// Input for creating an action collection on a page.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateActionCollection {
    pub page_id: String,
    pub name: String,
    #[serde(default)]
    pub plugin_type: PluginType,
    #[serde(default)]
    pub datasource_id: Option<String>,
    #[serde(default)]
    pub action_ids: Vec<String>,
    #[serde(default)]
    pub body: String,
}

impl Action {
    /// Datasource ids referenced by either snapshot.
    pub fn datasource_ids(&self) -> impl Iterator<Item = &str> {
        let published = self.content.published.as_ref();
        self.content
            .unpublished
            .datasource_id
            .as_deref()
            .into_iter()
            .chain(published.and_then(|c| c.datasource_id.as_deref()))
    }

    pub fn on_page(&self, page_id: &str) -> bool {
        self.content.unpublished.page_id == page_id
            || self.content.published.as_ref().is_some_and(|c| c.page_id == page_id)
    }
}

impl ActionCollection {
    pub fn datasource_ids(&self) -> impl Iterator<Item = &str> {
        let published = self.content.published.as_ref();
        self.content
            .unpublished
            .datasource_id
            .as_deref()
            .into_iter()
            .chain(published.and_then(|c| c.datasource_id.as_deref()))
    }

    pub fn on_page(&self, page_id: &str) -> bool {
        self.content.unpublished.page_id == page_id
            || self.content.published.as_ref().is_some_and(|c| c.page_id == page_id)
    }
}

impl PolicyHolder for Action {
    fn kind(&self) -> EntityKind {
        EntityKind::Action
    }
    fn policies(&self) -> &PolicySet {
        &self.policies
    }
    fn policies_mut(&mut self) -> &mut PolicySet {
        &mut self.policies
    }
}

impl PolicyHolder for ActionCollection {
    fn kind(&self) -> EntityKind {
        EntityKind::ActionCollection
    }
    fn policies(&self) -> &PolicySet {
        &self.policies
    }
    fn policies_mut(&mut self) -> &mut PolicySet {
        &mut self.policies
    }
}

impl Publishable for Action {
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

impl Publishable for ActionCollection {
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
