use std::collections::BTreeSet;

use futures_util::future::{join, join_all, join4};
use tracing::info;

use lowcode_core::{Principal, ServiceError, now_rfc3339};

use super::fanout::{WriteTally, archive_all};
use super::subtree::keep_found;
use super::{AppError, AppService, require};
use crate::model::{Application, Page, Permission, Publishable};
use crate::store::{DocOps, Document};

/// Publish every doc, except those whose draft was deleted: those are
/// archived.
async fn publish_or_archive<T: Document + Publishable>(
    ops: &DocOps<T>,
    docs: Vec<T>,
) -> Vec<Result<T, ServiceError>> {
    join_all(docs.into_iter().map(|mut doc| async move {
        if doc.is_pending_delete() {
            ops.archive(doc).await
        } else {
            doc.publish();
            ops.save(doc).await
        }
    }))
    .await
}

impl AppService {
    /// Snapshot the application's draft state into its published state.
    ///
    /// With `publish_pages` false only application-level fields are
    /// published. Otherwise pages, actions and collections follow, pages
    /// dropped from the draft list are retired, and `published_pages`
    /// becomes a copy of `pages`. Running it twice changes nothing.
    pub async fn publish(
        &self,
        application_id: &str,
        publish_pages: bool,
        principal: &Principal,
    ) -> Result<Application, AppError> {
        require("application_id", application_id)?;
        let mut app = self
            .applications
            .find_by_id(application_id, Permission::ManageApplications, principal)
            .await?;
        app.layout.publish();
        app.last_deployed_at = Some(now_rfc3339());

        if !publish_pages {
            return Ok(self.applications.save(app).await?);
        }

        let (pages, retired) = self.pages_to_publish(&app, principal).await?;
        let actions = self
            .actions
            .find_many(|a| a.application_id == app.id, Permission::ManageActions, principal)
            .await?;
        let collections = self
            .collections
            .find_many(|c| c.application_id == app.id, Permission::ManageActions, principal)
            .await?;

        let mut tally = WriteTally::new("publish");
        let (pages, retired, actions, collections) = join4(
            publish_or_archive(&self.pages, pages),
            archive_all(&self.pages, retired),
            publish_or_archive(&self.actions, actions),
            publish_or_archive(&self.collections, collections),
        )
        .await;
        let pages = tally.record(pages).len();
        let retired = tally.record(retired).len();
        let actions = tally.record(actions).len();
        let collections = tally.record(collections).len();
        tally.checkpoint()?;

        app.published_pages = app.pages.clone();
        let app = self.applications.save(app).await?;
        info!(
            "published application {}: {pages} pages ({retired} retired), {actions} actions, {collections} collections",
            app.id
        );
        Ok(app)
    }

    /// Pages of the draft list, and pages only the published list still
    /// references.
    async fn pages_to_publish(
        &self,
        app: &Application,
        principal: &Principal,
    ) -> Result<(Vec<Page>, Vec<Page>), AppError> {
        let draft_ids: BTreeSet<&str> = app.pages.iter().map(|r| r.page_id.as_str()).collect();
        let retired_ids: Vec<&str> = app
            .published_pages
            .iter()
            .map(|r| r.page_id.as_str())
            .filter(|id| !draft_ids.contains(id))
            .collect();

        let (live, gone) = join(
            join_all(
                draft_ids
                    .iter()
                    .map(|id| self.pages.find_by_id(id, Permission::ManagePages, principal)),
            ),
            join_all(
                retired_ids
                    .iter()
                    .map(|id| self.pages.find_by_id(id, Permission::ManagePages, principal)),
            ),
        )
        .await;
        Ok((keep_found(live)?, keep_found(gone)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AppLayout, CreateAction, CreateApplication, CreatePage, UpdateApplication};
    use crate::service::testing::{ORG, failing_service, owner, test_service};
    use std::sync::Arc;

    async fn create_app(svc: &Arc<AppService>, name: &str) -> Application {
        svc.create_application(
            CreateApplication {
                name: name.into(),
                ..Default::default()
            },
            ORG,
            &owner(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn publish_snapshots_pages_and_actions() {
        let (svc, _dir) = test_service();
        let user = owner();
        let app = create_app(&svc, "Foo").await;
        let page_id = app.pages[0].page_id.clone();
        // Nothing served before the first publish.
        assert!(svc.get_page(&page_id, true, &user).await.unwrap_err().is_not_found());

        svc.create_action(
            CreateAction {
                page_id: page_id.clone(),
                name: "getUsers".into(),
                ..Default::default()
            },
            &user,
        )
        .await
        .unwrap();

        let published = svc.publish(&app.id, true, &user).await.unwrap();
        assert!(published.last_deployed_at.is_some());
        assert_eq!(published.published_pages, published.pages);
        assert_eq!(svc.get_page(&page_id, true, &user).await.unwrap().name, "Page1");
        assert_eq!(
            svc.find_actions_by_application(&app.id, true, &user).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn publish_is_idempotent() {
        let (svc, _dir) = test_service();
        let user = owner();
        let app = create_app(&svc, "Foo").await;
        svc.create_page(
            CreatePage {
                application_id: app.id.clone(),
                name: "Orders".into(),
                layouts: vec![],
            },
            &user,
        )
        .await
        .unwrap();

        let first = svc.publish(&app.id, true, &user).await.unwrap();
        let pages_first = svc.find_application_pages(&app.id, true, &user).await.unwrap();
        let second = svc.publish(&app.id, true, &user).await.unwrap();
        let pages_second = svc.find_application_pages(&app.id, true, &user).await.unwrap();

        assert_eq!(first.published_pages, second.published_pages);
        assert_eq!(first.layout, second.layout);
        assert_eq!(pages_first, pages_second);
        assert_eq!(pages_second.len(), 2);
    }

    #[tokio::test]
    async fn lists_diverge_after_publish() {
        let (svc, _dir) = test_service();
        let user = owner();
        let app = create_app(&svc, "Foo").await;
        svc.publish(&app.id, true, &user).await.unwrap();
        let page = svc
            .create_page(
                CreatePage {
                    application_id: app.id.clone(),
                    name: "Archive".into(),
                    layouts: vec![],
                },
                &user,
            )
            .await
            .unwrap();

        // The new page is only in the draft list, so only that list's
        // default moves.
        let app = svc.make_page_default(&app.id, &page.id, &user).await.unwrap();
        assert_eq!(app.default_page_id(false), Some(page.id.as_str()));
        assert_eq!(app.default_page_id(true), Some(app.published_pages[0].page_id.as_str()));
        assert_eq!(app.published_pages.len(), 1);

        let app = svc.publish(&app.id, true, &user).await.unwrap();
        assert_eq!(app.published_pages, app.pages);
        assert_eq!(app.default_page_id(true), Some(page.id.as_str()));
    }

    #[tokio::test]
    async fn metadata_only_publish_leaves_pages() {
        let (svc, _dir) = test_service();
        let user = owner();
        let app = create_app(&svc, "Foo").await;
        svc.update_application(
            &app.id,
            UpdateApplication {
                layout: Some(AppLayout::Mobile),
                ..Default::default()
            },
            &user,
        )
        .await
        .unwrap();

        let app = svc.publish(&app.id, false, &user).await.unwrap();
        assert_eq!(app.layout.published, Some(AppLayout::Mobile));
        let page_id = &app.pages[0].page_id;
        assert!(svc.get_page(page_id, true, &user).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn publish_archives_actions_of_deleted_pages() {
        let (svc, _dir) = test_service();
        let user = owner();
        let app = create_app(&svc, "Foo").await;
        let page = svc
            .create_page(
                CreatePage {
                    application_id: app.id.clone(),
                    name: "Orders".into(),
                    layouts: vec![],
                },
                &user,
            )
            .await
            .unwrap();
        let action = svc
            .create_action(
                CreateAction {
                    page_id: page.id.clone(),
                    name: "listOrders".into(),
                    ..Default::default()
                },
                &user,
            )
            .await
            .unwrap();
        svc.publish(&app.id, true, &user).await.unwrap();

        svc.delete_unpublished_page(&page.id, &user).await.unwrap();
        // Still served until the next publish.
        assert_eq!(
            svc.find_actions_by_application(&app.id, true, &user).await.unwrap().len(),
            1
        );

        svc.publish(&app.id, true, &user).await.unwrap();
        assert!(svc.actions.get(&action.id).await.unwrap().unwrap().deleted);
        assert!(svc.find_actions_by_application(&app.id, true, &user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_action_write_leaves_published_list() {
        let (svc, kv, _dir) = failing_service("app:action:");
        let user = owner();
        let app = create_app(&svc, "Foo").await;
        let page = svc
            .create_page(
                CreatePage {
                    application_id: app.id.clone(),
                    name: "Orders".into(),
                    layouts: vec![],
                },
                &user,
            )
            .await
            .unwrap();
        svc.create_action(
            CreateAction {
                page_id: page.id.clone(),
                name: "listOrders".into(),
                ..Default::default()
            },
            &user,
        )
        .await
        .unwrap();

        kv.arm();
        let err = svc.publish(&app.id, true, &user).await.unwrap_err();
        match err {
            AppError::PartialFailure { operation, failed, .. } => {
                assert_eq!(operation, "publish");
                assert_eq!(failed, 1);
            }
            other => panic!("unexpected: {other:?}"),
        }
        kv.disarm();

        let app = svc.get_application(&app.id, &user).await.unwrap();
        assert_eq!(app.published_pages.len(), 1);
        assert!(app.last_deployed_at.is_none());
    }
}
