use std::sync::Arc;

use futures_util::future::join_all;
use tracing::debug;

use lowcode_core::{ANONYMOUS_PRINCIPAL, Principal, new_id};

use super::{AppError, AppService, require, require_member};
use crate::model::{
    Action, ActionCollection, ActionCollectionContent, ActionContent, Application, Capability,
    CreateAction, CreateActionCollection, CreateDatasource, Datasource, EntityKind, Page,
    Permission, PolicySet, Versioned,
};

/// Policies of a new action or collection on `page`: derived from the
/// page, owner holds everything, public apps grant ANONYMOUS execute.
fn child_policies(page: &Page, app: &Application, kind: EntityKind, owner: &str) -> PolicySet {
    let mut policies = PolicySet::inherit(&page.policies, EntityKind::Page, kind);
    policies.grant_all(kind, owner);
    if app.is_public {
        policies.grant(kind.public_permission(), &[ANONYMOUS_PRINCIPAL]);
    }
    policies
}

impl AppService {
    /// Register a datasource. The plugin must be installed.
    pub async fn create_datasource(
        &self,
        input: CreateDatasource,
        principal: &Principal,
    ) -> Result<Datasource, AppError> {
        require("organization_id", &input.organization_id)?;
        require("name", &input.name)?;
        require("plugin_id", &input.plugin_id)?;
        require_member(principal, &input.organization_id)?;

        let plugins = Arc::clone(&self.plugins);
        let plugin_id = input.plugin_id.clone();
        if !self.pool.run(move || plugins.exists(&plugin_id)).await? {
            return Err(AppError::Validation(format!(
                "plugin '{}' is not installed",
                input.plugin_id
            )));
        }

        let datasource = Datasource {
            id: new_id(),
            organization_id: input.organization_id,
            name: input.name.trim().to_string(),
            plugin_id: input.plugin_id,
            configuration: input.configuration,
            policies: PolicySet::for_owner(EntityKind::Datasource, &principal.id),
            deleted: false,
            created_at: String::new(),
            updated_at: String::new(),
        };
        Ok(self.datasources.insert(datasource).await?)
    }

    /// Page and application of a new action, checked for MANAGE, plus a
    /// READ check on the referenced datasource, which must belong to the
    /// application's organization.
    async fn action_parents(
        &self,
        page_id: &str,
        datasource_id: Option<&str>,
        principal: &Principal,
    ) -> Result<(Page, Application), AppError> {
        let page = self
            .pages
            .find_by_id(page_id, Permission::ManagePages, principal)
            .await?;
        let app = self
            .applications
            .find_by_id(&page.application_id, Permission::ManageApplications, principal)
            .await?;
        if let Some(datasource_id) = datasource_id {
            let datasource = self
                .datasources
                .find_by_id(datasource_id, Permission::ReadDatasources, principal)
                .await?;
            if datasource.organization_id != app.organization_id {
                return Err(AppError::Validation(format!(
                    "datasource '{datasource_id}' belongs to another organization"
                )));
            }
        }
        Ok((page, app))
    }

    pub async fn create_action(
        &self,
        input: CreateAction,
        principal: &Principal,
    ) -> Result<Action, AppError> {
        require("page_id", &input.page_id)?;
        require("name", &input.name)?;
        let (page, app) = self
            .action_parents(&input.page_id, input.datasource_id.as_deref(), principal)
            .await?;

        let action = Action {
            id: new_id(),
            organization_id: app.organization_id.clone(),
            application_id: app.id.clone(),
            content: Versioned::draft(ActionContent {
                name: input.name.trim().to_string(),
                page_id: page.id.clone(),
                datasource_id: input.datasource_id,
                config: input.config,
                execute_on_load: input.execute_on_load,
                deleted_at: None,
            }),
            policies: child_policies(&page, &app, EntityKind::Action, &principal.id),
            deleted: false,
            created_at: String::new(),
            updated_at: String::new(),
        };
        let action = self.actions.insert(action).await?;
        debug!("created action {} on page {}", action.id, page.id);
        Ok(action)
    }

    /// Create a collection grouping existing actions of the same application.
    pub async fn create_action_collection(
        &self,
        input: CreateActionCollection,
        principal: &Principal,
    ) -> Result<ActionCollection, AppError> {
        require("page_id", &input.page_id)?;
        require("name", &input.name)?;
        let (page, app) = self
            .action_parents(&input.page_id, input.datasource_id.as_deref(), principal)
            .await?;

        let children = join_all(
            input
                .action_ids
                .iter()
                .map(|id| self.actions.find_by_id(id, Permission::ManageActions, principal)),
        )
        .await;
        for (id, child) in input.action_ids.iter().zip(children) {
            match child {
                Ok(action) if action.application_id == app.id => {}
                Ok(_) => {
                    return Err(AppError::Validation(format!(
                        "action '{id}' belongs to another application"
                    )));
                }
                Err(e) if e.is_not_found() => {
                    return Err(AppError::Validation(format!("action '{id}' does not exist")));
                }
                Err(e) => return Err(e.into()),
            }
        }

        let collection = ActionCollection {
            id: new_id(),
            organization_id: app.organization_id.clone(),
            application_id: app.id.clone(),
            plugin_type: input.plugin_type,
            content: Versioned::draft(ActionCollectionContent {
                name: input.name.trim().to_string(),
                page_id: page.id.clone(),
                datasource_id: input.datasource_id,
                action_ids: input.action_ids,
                body: input.body,
                deleted_at: None,
            }),
            policies: child_policies(&page, &app, EntityKind::ActionCollection, &principal.id),
            deleted: false,
            created_at: String::new(),
            updated_at: String::new(),
        };
        let collection = self.collections.insert(collection).await?;
        debug!("created action collection {} on page {}", collection.id, page.id);
        Ok(collection)
    }

    /// Actions of an application present in the chosen mode. View mode
    /// needs EXECUTE, edit mode READ.
    pub async fn find_actions_by_application(
        &self,
        application_id: &str,
        view_mode: bool,
        principal: &Principal,
    ) -> Result<Vec<Action>, AppError> {
        require("application_id", application_id)?;
        let kind = EntityKind::Action;
        Ok(self
            .actions
            .find_many(
                |a| {
                    a.application_id == application_id
                        && a.content.view(view_mode).is_some_and(|c| c.deleted_at.is_none())
                },
                mode_permission(kind, view_mode),
                principal,
            )
            .await?)
    }

    pub async fn find_action_collections_by_application(
        &self,
        application_id: &str,
        view_mode: bool,
        principal: &Principal,
    ) -> Result<Vec<ActionCollection>, AppError> {
        require("application_id", application_id)?;
        let kind = EntityKind::ActionCollection;
        Ok(self
            .collections
            .find_many(
                |c| {
                    c.application_id == application_id
                        && c.content.view(view_mode).is_some_and(|c| c.deleted_at.is_none())
                },
                mode_permission(kind, view_mode),
                principal,
            )
            .await?)
    }

    pub async fn get_datasource(
        &self,
        id: &str,
        principal: &Principal,
    ) -> Result<Datasource, AppError> {
        require("id", id)?;
        Ok(self
            .datasources
            .find_by_id(id, Permission::ReadDatasources, principal)
            .await?)
    }
}

fn mode_permission(kind: EntityKind, view_mode: bool) -> Permission {
    let capability = if view_mode { Capability::Execute } else { Capability::Read };
    kind.permission_for(capability)
        .unwrap_or_else(|| kind.public_permission())
}
