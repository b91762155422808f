use serde::{Deserialize, Serialize};

use super::policy::{EntityKind, PolicyHolder, PolicySet};

/// Connection to an external system through a plugin.
///
/// Not versioned and never duplicated: cloned actions keep pointing at
/// the same datasource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Datasource {
    pub id: String,
    pub organization_id: String,
    pub name: String,
    pub plugin_id: String,
    #[serde(default)]
    pub configuration: serde_json::Value,
    #[serde(default)]
    pub policies: PolicySet,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateDatasource {
    pub organization_id: String,
    pub name: String,
    pub plugin_id: String,
    #[serde(default)]
    pub configuration: serde_json::Value,
}

impl PolicyHolder for Datasource {
    fn kind(&self) -> EntityKind {
        EntityKind::Datasource
    }
    fn policies(&self) -> &PolicySet {
        &self.policies
    }
    fn policies_mut(&mut self) -> &mut PolicySet {
        &mut self.policies
    }
}
