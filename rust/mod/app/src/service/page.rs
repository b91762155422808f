use futures_util::future::{join_all, join3};
use tracing::debug;

use lowcode_core::{Principal, ServiceError, new_id, now_rfc3339};

use super::fanout::WriteTally;
use super::{AppError, AppService, require};
use crate::model::{
    Application, CreatePage, EntityKind, Layout, Page, PageContent, PageRef, PageSummary,
    PageView, Permission, PolicySet, Publishable, Versioned,
};
use crate::store::{DocOps, Document};

/// A new, never-published page of `app`, with policies derived from it.
pub(crate) fn new_page(app: &Application, name: &str, layouts: Vec<Layout>) -> Page {
    Page {
        id: new_id(),
        application_id: app.id.clone(),
        content: Versioned::draft(PageContent::new(name, layouts)),
        policies: PolicySet::inherit(&app.policies, EntityKind::Application, EntityKind::Page),
        deleted: false,
        created_at: String::new(),
        updated_at: String::new(),
    }
}

/// Drop the drafts of `docs`: published ones keep serving until the next
/// publish, never-published ones are archived outright.
async fn retire_drafts<T: Document + Publishable>(
    ops: &DocOps<T>,
    docs: Vec<T>,
    at: &str,
) -> Vec<Result<T, ServiceError>> {
    join_all(docs.into_iter().map(|mut doc| async move {
        if doc.is_published() {
            doc.mark_pending_delete(at);
            ops.save(doc).await
        } else {
            ops.archive(doc).await
        }
    }))
    .await
}

impl AppService {
    /// Create a page and append it to the draft page list. The first page
    /// of an empty list becomes its default.
    pub async fn create_page(
        &self,
        input: CreatePage,
        principal: &Principal,
    ) -> Result<Page, AppError> {
        require("application_id", &input.application_id)?;
        require("name", &input.name)?;
        let mut app = self
            .applications
            .find_by_id(&input.application_id, Permission::ManageApplications, principal)
            .await?;

        let layouts = if input.layouts.is_empty() {
            vec![Layout::empty()]
        } else {
            input.layouts
        };
        let page = self
            .pages
            .insert(new_page(&app, input.name.trim(), layouts))
            .await?;

        let is_default = app.pages.is_empty();
        app.pages.push(PageRef::new(&page.id, is_default));
        self.applications.save(app).await?;

        debug!("created page {} in application {}", page.id, page.application_id);
        Ok(page)
    }

    /// One snapshot of a page. NotFound when the page does not exist in
    /// that mode: never published, or its draft was deleted.
    pub async fn get_page(
        &self,
        page_id: &str,
        view_mode: bool,
        principal: &Principal,
    ) -> Result<PageView, AppError> {
        require("page_id", page_id)?;
        let page = self
            .pages
            .find_by_id(page_id, Permission::ReadPages, principal)
            .await?;
        page.view(view_mode).ok_or_else(|| {
            let mode = if view_mode { "view" } else { "edit" };
            AppError::NotFound(format!("page '{page_id}' not found in {mode} mode"))
        })
    }

    /// Pages of the draft or published list, in list order.
    pub async fn find_application_pages(
        &self,
        application_id: &str,
        view_mode: bool,
        principal: &Principal,
    ) -> Result<Vec<PageSummary>, AppError> {
        require("application_id", application_id)?;
        let app = self
            .applications
            .find_by_id(application_id, Permission::ReadApplications, principal)
            .await?;
        let refs = if view_mode { &app.published_pages } else { &app.pages };

        let lookups = join_all(
            refs.iter()
                .map(|r| self.pages.find_by_id(&r.page_id, Permission::ReadPages, principal)),
        )
        .await;

        let mut summaries = Vec::with_capacity(refs.len());
        for (page_ref, lookup) in refs.iter().zip(lookups) {
            let page = match lookup {
                Ok(page) => page,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e.into()),
            };
            if let Some(view) = page.view(view_mode) {
                summaries.push(PageSummary {
                    id: page_ref.page_id.clone(),
                    name: view.name,
                    is_default: page_ref.is_default,
                });
            }
        }
        Ok(summaries)
    }

    /// Remove a page from the draft list only.
    ///
    /// The published list keeps referencing it until the next publish,
    /// which retires it. The default page cannot be removed.
    pub async fn delete_unpublished_page(
        &self,
        page_id: &str,
        principal: &Principal,
    ) -> Result<Page, AppError> {
        require("page_id", page_id)?;
        let page = self
            .pages
            .find_by_id(page_id, Permission::ManagePages, principal)
            .await?;
        let mut app = self
            .applications
            .find_by_id(&page.application_id, Permission::ManageApplications, principal)
            .await?;

        let Some(position) = app.pages.iter().position(|r| r.page_id == page_id) else {
            return Err(AppError::NotFound(format!(
                "page '{page_id}' is not in the draft page list of application {}",
                app.id
            )));
        };
        if app.pages[position].is_default {
            return Err(AppError::Validation(format!(
                "page '{page_id}' is the default page and cannot be deleted"
            )));
        }

        let now = now_rfc3339();
        let actions = self
            .actions
            .find_many(
                |a| a.content.unpublished.page_id == page_id && !a.is_pending_delete(),
                Permission::ManageActions,
                principal,
            )
            .await?;
        let collections = self
            .collections
            .find_many(
                |c| c.content.unpublished.page_id == page_id && !c.is_pending_delete(),
                Permission::ManageActions,
                principal,
            )
            .await?;

        let mut tally = WriteTally::new("delete_unpublished_page");
        let (pages, actions, collections) = join3(
            retire_drafts(&self.pages, vec![page], &now),
            retire_drafts(&self.actions, actions, &now),
            retire_drafts(&self.collections, collections, &now),
        )
        .await;
        let page = tally.record(pages).pop();
        tally.record(actions);
        tally.record(collections);
        tally.checkpoint()?;

        app.pages.remove(position);
        self.applications.save(app).await?;

        debug!("removed page {page_id} from the draft page list");
        page.ok_or_else(|| AppError::Internal(format!("page '{page_id}' write was not recorded")))
    }

    /// Make `page_id` the default of each page list that contains it.
    pub async fn make_page_default(
        &self,
        application_id: &str,
        page_id: &str,
        principal: &Principal,
    ) -> Result<Application, AppError> {
        require("application_id", application_id)?;
        require("page_id", page_id)?;
        let mut app = self
            .applications
            .find_by_id(application_id, Permission::ManageApplications, principal)
            .await?;
        if !app.make_page_default(page_id) {
            return Err(AppError::NotFound(format!(
                "page '{page_id}' not found in application {application_id}"
            )));
        }
        Ok(self.applications.save(app).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CreateAction, CreateApplication};
    use crate::service::testing::{ORG, owner, test_service};
    use std::sync::Arc;

    async fn app_with_page(svc: &Arc<AppService>, page_name: &str) -> (Application, Page) {
        let user = owner();
        let app = svc
            .create_application(
                CreateApplication {
                    name: "Shop".into(),
                    ..Default::default()
                },
                ORG,
                &user,
            )
            .await
            .unwrap();
        let page = svc
            .create_page(
                CreatePage {
                    application_id: app.id.clone(),
                    name: page_name.into(),
                    layouts: vec![],
                },
                &user,
            )
            .await
            .unwrap();
        let app = svc.get_application(&app.id, &user).await.unwrap();
        (app, page)
    }

    #[tokio::test]
    async fn create_page_appends_non_default() {
        let (svc, _dir) = test_service();
        let (app, page) = app_with_page(&svc, "Orders").await;

        assert_eq!(app.pages.len(), 2);
        assert_eq!(app.pages[1], PageRef::new(&page.id, false));
        // Published list untouched until publish.
        assert_eq!(app.published_pages.len(), 1);
        assert!(page.policies.contains(Permission::ManagePages, "api_user"));

        let names: Vec<_> = svc
            .find_application_pages(&app.id, false, &owner())
            .await
            .unwrap()
            .into_iter()
            .map(|p| (p.name, p.is_default))
            .collect();
        assert_eq!(
            names,
            vec![("Page1".to_string(), true), ("Orders".to_string(), false)]
        );
    }

    #[tokio::test]
    async fn create_page_requires_fields() {
        let (svc, _dir) = test_service();
        let err = svc
            .create_page(
                CreatePage {
                    application_id: "app".into(),
                    name: "".into(),
                    layouts: vec![],
                },
                &owner(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn delete_unpublished_page_keeps_published_list() {
        let (svc, _dir) = test_service();
        let user = owner();
        let (app, page) = app_with_page(&svc, "Orders").await;
        svc.publish(&app.id, true, &user).await.unwrap();
        let published_before = svc.get_application(&app.id, &user).await.unwrap().published_pages;
        assert_eq!(published_before.len(), 2);

        svc.delete_unpublished_page(&page.id, &user).await.unwrap();

        let app = svc.get_application(&app.id, &user).await.unwrap();
        assert!(app.pages.iter().all(|r| r.page_id != page.id));
        assert_eq!(app.published_pages, published_before);

        // Gone in edit mode, still served in view mode.
        assert!(svc.get_page(&page.id, false, &user).await.unwrap_err().is_not_found());
        assert_eq!(svc.get_page(&page.id, true, &user).await.unwrap().name, "Orders");

        // Next publish retires it.
        let app = svc.publish(&app.id, true, &user).await.unwrap();
        assert_eq!(app.published_pages, app.pages);
        assert!(svc.pages.get(&page.id).await.unwrap().unwrap().deleted);
    }

    #[tokio::test]
    async fn delete_never_published_page_archives_it() {
        let (svc, _dir) = test_service();
        let user = owner();
        let (_app, page) = app_with_page(&svc, "Draft").await;
        let action = svc
            .create_action(
                CreateAction {
                    page_id: page.id.clone(),
                    name: "draftQuery".into(),
                    ..Default::default()
                },
                &user,
            )
            .await
            .unwrap();

        let deleted = svc.delete_unpublished_page(&page.id, &user).await.unwrap();
        assert!(deleted.deleted);
        assert!(svc.actions.get(&action.id).await.unwrap().unwrap().deleted);
    }

    #[tokio::test]
    async fn delete_rejects_default_and_unknown() {
        let (svc, _dir) = test_service();
        let user = owner();
        let (app, page) = app_with_page(&svc, "Orders").await;

        let default_id = app.default_page_id(false).unwrap().to_string();
        let err = svc.delete_unpublished_page(&default_id, &user).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        svc.delete_unpublished_page(&page.id, &user).await.unwrap();
        // Second delete: the page is no longer in the draft list.
        let err = svc.delete_unpublished_page(&page.id, &user).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn make_default_touches_only_lists_with_page() {
        let (svc, _dir) = test_service();
        let user = owner();
        let (app, page) = app_with_page(&svc, "Orders").await;
        let published_before = app.published_pages.clone();

        let app = svc.make_page_default(&app.id, &page.id, &user).await.unwrap();
        assert_eq!(app.default_page_id(false), Some(page.id.as_str()));
        assert_eq!(app.pages.iter().filter(|r| r.is_default).count(), 1);
        // Page was never published, so the published list is unchanged.
        assert_eq!(app.published_pages, published_before);

        let err = svc.make_page_default(&app.id, "nope", &user).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
