pub mod action;
pub mod application;
pub mod datasource;
pub mod page;
pub mod plugin;
pub mod policy;
pub mod versioned;

pub use action::{
    Action, ActionCollection, ActionCollectionContent, ActionContent, CreateAction,
    CreateActionCollection,
};
pub use application::{
    AppLayout, Application, CreateApplication, GitApplicationMetadata, GitAuth, PageRef,
    UpdateApplication,
};
pub use datasource::{CreateDatasource, Datasource};
pub use page::{CreatePage, Layout, Page, PageContent, PageSummary, PageView};
pub use plugin::{Plugin, PluginType};
pub use policy::{Capability, EntityKind, Permission, Policy, PolicyHolder, PolicySet};
pub use versioned::{Publishable, Versioned};
