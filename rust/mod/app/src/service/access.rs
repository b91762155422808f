use std::sync::Arc;

use futures_util::future::join3;
use tracing::info;

use lowcode_core::Principal;

use super::fanout::{WriteTally, save_all};
use super::{AppError, AppService};
use crate::jobs::JobHandle;
use crate::model::{Application, Permission, PolicyHolder};

/// Flip public access on every entity, keeping the ones that changed.
fn touch_all<T: PolicyHolder>(docs: Vec<T>, public: bool) -> Vec<T> {
    docs.into_iter()
        .filter_map(|mut doc| doc.set_public(public).then_some(doc))
        .collect()
}

impl AppService {
    /// Make an application and everything reachable from it public, or
    /// private again.
    ///
    /// Runs as a detached job: it commits even if the returned handle is
    /// dropped. Datasources are written before the entities that use them
    /// and the application goes last.
    pub fn set_public_access(
        self: &Arc<Self>,
        application_id: &str,
        make_public: bool,
        principal: &Principal,
    ) -> JobHandle<Application> {
        let svc = Arc::clone(self);
        let application_id = application_id.to_string();
        let principal = principal.clone();
        self.jobs.spawn("set_public_access", async move {
            svc.propagate_public_access(&application_id, make_public, &principal)
                .await
        })
    }

    async fn propagate_public_access(
        &self,
        application_id: &str,
        make_public: bool,
        principal: &Principal,
    ) -> Result<Application, AppError> {
        super::require("application_id", application_id)?;
        let mut app = self
            .applications
            .find_by_id(application_id, Permission::ManageApplications, principal)
            .await?;
        app.is_public = make_public;
        app.set_public(make_public);

        let subtree = self.resolve_subtree(&app, principal).await?;
        let datasources = touch_all(subtree.datasources, make_public);
        let pages = touch_all(subtree.pages, make_public);
        let actions = touch_all(subtree.actions, make_public);
        let collections = touch_all(subtree.collections, make_public);

        let mut tally = WriteTally::new("set_public_access");
        let datasources = tally.record(save_all(&self.datasources, datasources).await);
        tally.checkpoint()?;

        let (pages, actions, collections) = join3(
            save_all(&self.pages, pages),
            save_all(&self.actions, actions),
            save_all(&self.collections, collections),
        )
        .await;
        let pages = tally.record(pages);
        let actions = tally.record(actions);
        let collections = tally.record(collections);
        tally.checkpoint()?;

        let app = self.applications.save(app).await?;
        info!(
            "application {} is now {}: updated {} pages, {} actions, {} collections, {} datasources",
            app.id,
            if make_public { "public" } else { "private" },
            pages.len(),
            actions.len(),
            collections.len(),
            datasources.len()
        );
        Ok(app)
    }
}
