use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use futures_util::future::{join_all, join3};
use tracing::info;

use lowcode_core::{Principal, new_id, now_rfc3339};

use super::fanout::{WriteTally, insert_all};
use super::page::new_page;
use super::subtree::keep_found;
use super::{AppError, AppService, require};
use crate::jobs::JobHandle;
use crate::model::application::ensure_single_default;
use crate::model::{
    Action, ActionCollection, Application, EntityKind, Page, PageRef, Permission, PolicySet,
    Publishable,
};

/// First free name of the form "{name} {suffix}", "{name} {suffix}1", ...
fn copy_name(name: &str, suffix: &str, taken: &BTreeSet<String>) -> String {
    let base = format!("{name} {suffix}");
    let mut candidate = base.clone();
    let mut n = 0;
    while taken.contains(&candidate) {
        n += 1;
        candidate = format!("{base}{n}");
    }
    candidate
}

fn remap_refs(refs: &[PageRef], ids: &HashMap<String, String>) -> Vec<PageRef> {
    let mut mapped: Vec<PageRef> = refs
        .iter()
        .filter_map(|r| ids.get(&r.page_id).map(|id| PageRef::new(id, r.is_default)))
        .collect();
    ensure_single_default(&mut mapped);
    mapped
}

fn child_policies(page: &Page, kind: EntityKind, owner: &str) -> PolicySet {
    let mut policies = PolicySet::inherit(&page.policies, EntityKind::Page, kind);
    policies.grant_all(kind, owner);
    policies
}

impl AppService {
    /// Deep-copy an application under new ids.
    ///
    /// Runs as a detached job. The copy lands even if nobody waits for it
    /// and can then be found through `find_by_cloned_from_application_id`.
    pub fn clone_application(
        self: &Arc<Self>,
        application_id: &str,
        principal: &Principal,
    ) -> JobHandle<Application> {
        let svc = Arc::clone(self);
        let application_id = application_id.to_string();
        let principal = principal.clone();
        self.jobs.spawn("clone_application", async move {
            svc.clone_subtree(&application_id, &principal).await
        })
    }

    async fn clone_subtree(
        &self,
        application_id: &str,
        principal: &Principal,
    ) -> Result<Application, AppError> {
        require("application_id", application_id)?;
        let source = self
            .applications
            .find_by_id(application_id, Permission::ManageApplications, principal)
            .await?;

        let taken: BTreeSet<String> = self
            .applications
            .find_live(|a| a.organization_id == source.organization_id)
            .await?
            .into_iter()
            .map(|a| a.name)
            .collect();
        let now = now_rfc3339();
        let mut app = Application {
            id: new_id(),
            name: copy_name(&source.name, &self.config.clone_name_suffix, &taken),
            is_public: false,
            pages: Vec::new(),
            published_pages: Vec::new(),
            git_application_metadata: None,
            cloned_from_application_id: Some(source.id.clone()),
            policies: PolicySet::for_owner(EntityKind::Application, &principal.id),
            modified_by: Some(principal.id.clone()),
            last_edited_at: Some(now),
            last_deployed_at: None,
            deleted: false,
            created_at: String::new(),
            updated_at: String::new(),
            ..source.clone()
        };

        let lookups = join_all(
            source
                .pages
                .iter()
                .map(|r| self.pages.find_by_id(&r.page_id, Permission::ManagePages, principal)),
        )
        .await;
        let mut page_ids = HashMap::new();
        let mut pages = Vec::new();
        for source_page in keep_found(lookups)? {
            let mut page = new_page(&app, "", Vec::new());
            page.content = source_page.content;
            page_ids.insert(source_page.id, page.id.clone());
            pages.push(page);
        }
        app.pages = remap_refs(&source.pages, &page_ids);
        app.published_pages = remap_refs(&source.published_pages, &page_ids);

        let (actions, collections) = self
            .clone_actions(&source, &app, &pages, &page_ids, principal)
            .await?;

        let mut tally = WriteTally::new("clone_application");
        let (pages, actions, collections) = join3(
            insert_all(&self.pages, pages),
            insert_all(&self.actions, actions),
            insert_all(&self.collections, collections),
        )
        .await;
        let pages = tally.record(pages).len();
        let actions = tally.record(actions).len();
        let collections = tally.record(collections).len();
        tally.checkpoint()?;

        let app = self.applications.insert(app).await?;
        info!(
            "cloned application {} into {} ({}): {pages} pages, {actions} actions, {collections} collections",
            source.id, app.id, app.name
        );
        Ok(app)
    }

    /// Copies of the actions and collections living on the cloned pages,
    /// owned by `app`. Datasource references are kept; collection children
    /// are remapped.
    async fn clone_actions(
        &self,
        source: &Application,
        app: &Application,
        pages: &[Page],
        page_ids: &HashMap<String, String>,
        principal: &Principal,
    ) -> Result<(Vec<Action>, Vec<ActionCollection>), AppError> {
        let on_cloned_page = |page_id: &str| page_ids.contains_key(page_id);
        let actions = self
            .actions
            .find_many(
                |a| {
                    a.application_id == source.id
                        && !a.is_pending_delete()
                        && on_cloned_page(a.content.unpublished.page_id.as_str())
                },
                Permission::ManageActions,
                principal,
            )
            .await?;
        let collections = self
            .collections
            .find_many(
                |c| {
                    c.application_id == source.id
                        && !c.is_pending_delete()
                        && on_cloned_page(c.content.unpublished.page_id.as_str())
                },
                Permission::ManageActions,
                principal,
            )
            .await?;

        let new_pages: HashMap<&str, &Page> = pages.iter().map(|p| (p.id.as_str(), p)).collect();
        let mut action_ids = HashMap::new();
        let mut cloned_actions = Vec::with_capacity(actions.len());
        for mut action in actions {
            action.content.map_both(|c| {
                if let Some(id) = page_ids.get(&c.page_id) {
                    c.page_id = id.clone();
                }
            });
            let Some(page) = new_pages.get(action.content.unpublished.page_id.as_str()) else {
                continue;
            };
            let id = new_id();
            action_ids.insert(action.id.clone(), id.clone());
            action.policies = child_policies(page, EntityKind::Action, &principal.id);
            action.id = id;
            action.application_id = app.id.clone();
            action.organization_id = app.organization_id.clone();
            action.deleted = false;
            action.created_at.clear();
            cloned_actions.push(action);
        }

        let mut cloned_collections = Vec::with_capacity(collections.len());
        for mut collection in collections {
            collection.content.map_both(|c| {
                if let Some(id) = page_ids.get(&c.page_id) {
                    c.page_id = id.clone();
                }
                c.action_ids = c
                    .action_ids
                    .iter()
                    .filter_map(|id| action_ids.get(id).cloned())
                    .collect();
            });
            let Some(page) = new_pages.get(collection.content.unpublished.page_id.as_str()) else {
                continue;
            };
            collection.policies = child_policies(page, EntityKind::ActionCollection, &principal.id);
            collection.id = new_id();
            collection.application_id = app.id.clone();
            collection.organization_id = app.organization_id.clone();
            collection.deleted = false;
            collection.created_at.clear();
            cloned_collections.push(collection);
        }
        Ok((cloned_actions, cloned_collections))
    }
}
