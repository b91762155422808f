use std::collections::BTreeSet;

use futures_util::future::join_all;

use lowcode_core::{Principal, ServiceError};

use super::{AppError, AppService};
use crate::model::{Action, ActionCollection, Application, Datasource, Page, Permission};

/// Everything reachable from one application root.
pub(crate) struct Subtree {
    pub pages: Vec<Page>,
    pub actions: Vec<Action>,
    pub collections: Vec<ActionCollection>,
    /// Distinct datasources referenced by the actions and collections.
    pub datasources: Vec<Datasource>,
}

/// Keep found documents, skip NotFound, fail on anything else.
pub(crate) fn keep_found<T>(results: Vec<Result<T, ServiceError>>) -> Result<Vec<T>, AppError> {
    let mut found = Vec::with_capacity(results.len());
    for result in results {
        match result {
            Ok(doc) => found.push(doc),
            Err(e) if e.is_not_found() => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(found)
}

impl AppService {
    /// Resolve the subtree of `app` that `principal` can manage: pages of
    /// both lists, their actions and collections, and the datasources
    /// those reference. Datasources only need EXECUTE, the permission an
    /// action's author holds on them. Entities that cannot be found are
    /// skipped.
    pub(crate) async fn resolve_subtree(
        &self,
        app: &Application,
        principal: &Principal,
    ) -> Result<Subtree, AppError> {
        let page_ids = app.reachable_page_ids();
        let lookups = join_all(
            page_ids
                .iter()
                .map(|id| self.pages.find_by_id(id, Permission::ManagePages, principal)),
        )
        .await;
        let pages = keep_found(lookups)?;

        let resolved: BTreeSet<&str> = pages.iter().map(|p| p.id.as_str()).collect();
        let actions = self
            .actions
            .find_many(
                |a: &Action| resolved.iter().any(|id| a.on_page(id)),
                Permission::ManageActions,
                principal,
            )
            .await?;
        let collections = self
            .collections
            .find_many(
                |c: &ActionCollection| resolved.iter().any(|id| c.on_page(id)),
                Permission::ManageActions,
                principal,
            )
            .await?;

        let datasource_ids: BTreeSet<&str> = actions
            .iter()
            .flat_map(|a| a.datasource_ids())
            .chain(collections.iter().flat_map(|c| c.datasource_ids()))
            .collect();
        let lookups = join_all(
            datasource_ids
                .iter()
                .map(|id| self.datasources.find_by_id(id, Permission::ExecuteDatasources, principal)),
        )
        .await;
        let datasources = keep_found(lookups)?;

        Ok(Subtree {
            pages,
            actions,
            collections,
            datasources,
        })
    }
}
