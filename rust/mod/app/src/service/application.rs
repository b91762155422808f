use futures_util::future::join3;
use tracing::info;

use lowcode_core::{Principal, new_id, now_rfc3339};

use super::fanout::{WriteTally, archive_all};
use super::page::new_page;
use super::{AppError, AppService, require, require_member};
use crate::model::{
    Application, CreateApplication, EntityKind, Layout, PageRef, Permission, PolicySet,
    UpdateApplication, Versioned,
};

impl AppService {
    /// Create an application with its default page.
    ///
    /// The page is referenced as default by both page lists but has no
    /// published content until the first publish.
    pub async fn create_application(
        &self,
        input: CreateApplication,
        organization_id: &str,
        principal: &Principal,
    ) -> Result<Application, AppError> {
        require("name", &input.name)?;
        require("organization_id", organization_id)?;
        require_member(principal, organization_id)?;
        let name = input.name.trim().to_string();
        self.ensure_unique_name(organization_id, &name, None).await?;

        let mut app = Application {
            id: new_id(),
            organization_id: organization_id.to_string(),
            name,
            is_public: false,
            pages: Vec::new(),
            published_pages: Vec::new(),
            layout: Versioned::draft(input.layout.unwrap_or_default()),
            icon: input.icon,
            color: input.color,
            git_application_metadata: None,
            cloned_from_application_id: None,
            policies: PolicySet::for_owner(EntityKind::Application, &principal.id),
            modified_by: Some(principal.id.clone()),
            last_edited_at: Some(now_rfc3339()),
            last_deployed_at: None,
            deleted: false,
            created_at: String::new(),
            updated_at: String::new(),
        };

        let page = new_page(&app, &self.config.default_page_name, vec![Layout::empty()]);
        let page = self.pages.insert(page).await?;
        app.pages = vec![PageRef::new(&page.id, true)];
        app.published_pages = app.pages.clone();

        let app = self.applications.insert(app).await?;
        info!(
            "created application {} ({}) in organization {}",
            app.id, app.name, app.organization_id
        );
        Ok(app)
    }

    pub async fn get_application(
        &self,
        id: &str,
        principal: &Principal,
    ) -> Result<Application, AppError> {
        require("id", id)?;
        Ok(self
            .applications
            .find_by_id(id, Permission::ReadApplications, principal)
            .await?)
    }

    pub async fn find_by_name(
        &self,
        name: &str,
        permission: Permission,
        principal: &Principal,
    ) -> Result<Application, AppError> {
        require("name", name)?;
        self.applications
            .find_many(|a| a.name == name, permission, principal)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound(format!("application named '{name}' not found")))
    }

    /// Applications of an organization visible to `principal`, by name.
    pub async fn list_applications(
        &self,
        organization_id: &str,
        principal: &Principal,
    ) -> Result<Vec<Application>, AppError> {
        require("organization_id", organization_id)?;
        let mut apps = self
            .applications
            .find_many(
                |a| a.organization_id == organization_id,
                Permission::ReadApplications,
                principal,
            )
            .await?;
        apps.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(apps)
    }

    /// Rename and restyle. Visibility goes through `set_public_access`.
    pub async fn update_application(
        &self,
        id: &str,
        update: UpdateApplication,
        principal: &Principal,
    ) -> Result<Application, AppError> {
        require("id", id)?;
        let mut app = self
            .applications
            .find_by_id(id, Permission::ManageApplications, principal)
            .await?;

        if let Some(name) = update.name {
            require("name", &name)?;
            let name = name.trim().to_string();
            if name != app.name {
                self.ensure_unique_name(&app.organization_id, &name, Some(&app.id))
                    .await?;
                app.name = name;
            }
        }
        if let Some(icon) = update.icon {
            app.icon = Some(icon);
        }
        if let Some(color) = update.color {
            app.color = Some(color);
        }
        if let Some(layout) = update.layout {
            app.layout.unpublished = layout;
        }

        Ok(self.applications.save(app).await?)
    }

    /// Soft-delete the application only.
    pub async fn archive_application(
        &self,
        id: &str,
        principal: &Principal,
    ) -> Result<Application, AppError> {
        require("id", id)?;
        let app = self
            .applications
            .find_by_id(id, Permission::ManageApplications, principal)
            .await?;
        Ok(self.applications.archive(app).await?)
    }

    /// Archive the application together with its pages, actions and
    /// action collections. The application goes last.
    pub async fn delete_application(
        &self,
        id: &str,
        principal: &Principal,
    ) -> Result<Application, AppError> {
        require("id", id)?;
        let app = self
            .applications
            .find_by_id(id, Permission::ManageApplications, principal)
            .await?;

        let pages = self
            .pages
            .find_many(|p| p.application_id == app.id, Permission::ManagePages, principal)
            .await?;
        let actions = self
            .actions
            .find_many(|a| a.application_id == app.id, Permission::ManageActions, principal)
            .await?;
        let collections = self
            .collections
            .find_many(|c| c.application_id == app.id, Permission::ManageActions, principal)
            .await?;

        let mut tally = WriteTally::new("delete_application");
        let (pages, actions, collections) = join3(
            archive_all(&self.pages, pages),
            archive_all(&self.actions, actions),
            archive_all(&self.collections, collections),
        )
        .await;
        tally.record(pages);
        tally.record(actions);
        tally.record(collections);
        tally.checkpoint()?;

        let app = self.applications.archive(app).await?;
        info!(
            "deleted application {} with {} dependents",
            app.id,
            tally.written()
        );
        Ok(app)
    }

    /// Stamp who edited the application last, and when.
    pub async fn save_last_edit_information(
        &self,
        id: &str,
        principal: &Principal,
    ) -> Result<Application, AppError> {
        require("id", id)?;
        let mut app = self
            .applications
            .find_by_id(id, Permission::ManageApplications, principal)
            .await?;
        app.modified_by = Some(principal.id.clone());
        app.last_edited_at = Some(now_rfc3339());
        Ok(self.applications.save(app).await?)
    }

    /// The application as end users see it: `pages` is the published list.
    pub async fn get_application_in_view_mode(
        &self,
        id: &str,
        principal: &Principal,
    ) -> Result<Application, AppError> {
        let mut app = self.get_application(id, principal).await?;
        app.pages = app.published_pages.clone();
        Ok(app)
    }

    pub async fn find_by_cloned_from_application_id(
        &self,
        source_id: &str,
        principal: &Principal,
    ) -> Result<Vec<Application>, AppError> {
        require("id", source_id)?;
        Ok(self
            .applications
            .find_many(
                |a| a.cloned_from_application_id.as_deref() == Some(source_id),
                Permission::ReadApplications,
                principal,
            )
            .await?)
    }

    /// Check-before-insert name uniqueness among live applications of the
    /// organization. `except_id` is the application being renamed.
    pub(crate) async fn ensure_unique_name(
        &self,
        organization_id: &str,
        name: &str,
        except_id: Option<&str>,
    ) -> Result<(), AppError> {
        let taken = self
            .applications
            .find_live(|a| {
                a.organization_id == organization_id
                    && a.name == name
                    && Some(a.id.as_str()) != except_id
            })
            .await?;
        if !taken.is_empty() {
            return Err(AppError::Conflict(format!(
                "application name '{name}' already exists in organization {organization_id}"
            )));
        }
        Ok(())
    }
}
