use serde::{Deserialize, Serialize};

/// Connector family of a plugin. Action collections carry it as a tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PluginType {
    #[default]
    Api,
    Db,
    Js,
    Saas,
    Remote,
}

/// Installed plugin descriptor, read from the plugin catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plugin {
    /// Taken from the catalog file name when the descriptor omits it.
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default, rename = "type")]
    pub plugin_type: PluginType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}
