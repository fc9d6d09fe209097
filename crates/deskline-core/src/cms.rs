//! Content service: media folders, templates and pages
//!
//! Menus live in `menus.rs` on the same service. Hierarchy bounds come from
//! the `[limits]` section of the config.

use deskline_api::{MediaFolder, NewPage, Page, Template};
use deskline_config::LimitsConfig;
use deskline_store::{AuditEvent, AuditEventType, ContentStore, Store};
use deskline_util::{DeskError, FieldError, FolderId, PageId, Result, TemplateId};
use std::sync::Arc;
use tracing::info;

pub(crate) const MAX_NAME_CHARS: usize = 255;

/// Validate a display name, pushing a field error on failure
pub(crate) fn check_name(field: &str, value: &str, errors: &mut Vec<FieldError>) {
    let value = value.trim();
    if value.is_empty() {
        errors.push(FieldError::new(field, "must not be empty"));
    } else if value.chars().count() > MAX_NAME_CHARS {
        errors.push(FieldError::new(
            field,
            format!("must be at most {} characters", MAX_NAME_CHARS),
        ));
    }
}

/// Slugs are lowercase ASCII letters, digits and single hyphens
fn check_slug(value: &str, errors: &mut Vec<FieldError>) {
    let valid = !value.is_empty()
        && !value.starts_with('-')
        && !value.ends_with('-')
        && !value.contains("--")
        && value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if !valid {
        errors.push(FieldError::new(
            "slug",
            format!("'{}' must be lowercase letters, digits and hyphens", value),
        ));
    }
}

pub(crate) fn into_result(errors: Vec<FieldError>) -> Result<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(DeskError::Validation(errors))
    }
}

/// CMS hierarchies and the template guard
pub struct ContentService {
    pub(crate) store: Arc<dyn Store>,
    pub(crate) limits: LimitsConfig,
}

impl ContentService {
    pub fn new(store: Arc<dyn Store>, limits: LimitsConfig) -> Self {
        Self { store, limits }
    }

    pub fn limits(&self) -> &LimitsConfig {
        &self.limits
    }

    // Media folders

    pub fn create_folder(&self, name: &str, parent: Option<FolderId>) -> Result<MediaFolder> {
        let mut errors = Vec::new();
        check_name("name", name, &mut errors);
        into_result(errors)?;

        Ok(self
            .store
            .create_folder(name.trim(), parent, self.limits.max_folder_depth)?)
    }

    pub fn list_folders(&self) -> Result<Vec<MediaFolder>> {
        Ok(self.store.list_folders()?)
    }

    /// Re-parent a folder; rejects cycles and over-deep results
    pub fn move_folder(&self, id: FolderId, parent: Option<FolderId>) -> Result<MediaFolder> {
        let folder = self.store.move_folder(id, parent, self.limits.max_folder_depth)?;

        info!(folder_id = %id, parent_id = ?parent, "Folder moved");
        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::FolderMoved {
            folder_id: id,
            parent_id: parent,
        }));
        Ok(folder)
    }

    /// Delete a folder without subfolders
    pub fn delete_folder(&self, id: FolderId) -> Result<()> {
        if !self.store.delete_folder(id)? {
            return Err(DeskError::not_found(format!("folder {}", id)));
        }
        Ok(())
    }

    // Templates

    pub fn create_template(&self, name: &str, slug: &str) -> Result<Template> {
        let mut errors = Vec::new();
        check_name("name", name, &mut errors);
        check_slug(slug, &mut errors);
        into_result(errors)?;

        Ok(self.store.create_template(name.trim(), slug)?)
    }

    pub fn list_templates(&self) -> Result<Vec<Template>> {
        Ok(self.store.list_templates()?)
    }

    /// Delete a template. Fails with a conflict naming the number of pages
    /// while any page still uses it.
    pub fn delete_template(&self, id: TemplateId) -> Result<()> {
        if !self.store.delete_template(id)? {
            return Err(DeskError::not_found(format!("template {}", id)));
        }

        info!(template_id = %id, "Template deleted");
        let _ = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::TemplateDeleted { template_id: id }));
        Ok(())
    }

    // Pages

    pub fn create_page(&self, page: NewPage) -> Result<Page> {
        let mut errors = Vec::new();
        check_name("title", &page.title, &mut errors);
        check_slug(&page.slug, &mut errors);
        into_result(errors)?;

        let page = NewPage {
            title: page.title.trim().to_string(),
            ..page
        };
        Ok(self.store.create_page(&page, self.limits.max_page_depth)?)
    }

    pub fn get_page(&self, id: PageId) -> Result<Page> {
        self.store
            .get_page(id)?
            .ok_or_else(|| DeskError::not_found(format!("page {}", id)))
    }

    pub fn list_pages(&self) -> Result<Vec<Page>> {
        Ok(self.store.list_pages()?)
    }

    /// Re-parent a page; rejects cycles and over-deep results
    pub fn set_page_parent(&self, id: PageId, parent: Option<PageId>) -> Result<Page> {
        let page = self.store.set_page_parent(id, parent, self.limits.max_page_depth)?;

        info!(page_id = %id, parent_id = ?parent, "Page parent changed");
        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::PageParentChanged {
            page_id: id,
            parent_id: parent,
        }));
        Ok(page)
    }

    pub fn set_page_template(&self, id: PageId, template: Option<TemplateId>) -> Result<Page> {
        Ok(self.store.set_page_template(id, template)?)
    }

    /// Delete a page; its children move up to its parent
    pub fn delete_page(&self, id: PageId) -> Result<()> {
        if !self.store.delete_page(id)? {
            return Err(DeskError::not_found(format!("page {}", id)));
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use deskline_api::PageStatus;
    use deskline_store::SqliteStore;
    use deskline_util::HierarchyError;

    pub(crate) fn service() -> ContentService {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
        ContentService::new(store, LimitsConfig::default())
    }

    fn page(slug: &str, parent: Option<PageId>, template: Option<TemplateId>) -> NewPage {
        NewPage {
            title: slug.to_uppercase(),
            slug: slug.into(),
            status: PageStatus::Published,
            template_id: template,
            parent_id: parent,
            meta_title: None,
            meta_description: None,
        }
    }

    #[test]
    fn folder_cycle_rejected_and_audited_moves() {
        let cms = service();
        let root = cms.create_folder("Images", None).unwrap();
        let child = cms.create_folder("2025", Some(root.id)).unwrap();

        let err = cms.move_folder(root.id, Some(child.id)).unwrap_err();
        assert!(matches!(err, DeskError::Hierarchy(HierarchyError::Cycle { .. })));

        let other = cms.create_folder("Docs", None).unwrap();
        let moved = cms.move_folder(child.id, Some(other.id)).unwrap();
        assert_eq!(moved.parent_id, Some(other.id));

        let audits = cms.store.get_recent_audits(10).unwrap();
        assert_eq!(audits.len(), 1);
        assert!(matches!(audits[0].event, AuditEventType::FolderMoved { .. }));
    }

    #[test]
    fn folder_depth_bounded() {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
        let cms = ContentService::new(
            store,
            LimitsConfig {
                max_folder_depth: 2,
                ..LimitsConfig::default()
            },
        );
        let a = cms.create_folder("a", None).unwrap();
        let b = cms.create_folder("b", Some(a.id)).unwrap();
        let err = cms.create_folder("c", Some(b.id)).unwrap_err();
        assert!(matches!(err, DeskError::Hierarchy(HierarchyError::TooDeep { max_depth: 2 })));
    }

    #[test]
    fn non_empty_folder_delete_conflicts() {
        let cms = service();
        let root = cms.create_folder("Images", None).unwrap();
        cms.create_folder("2025", Some(root.id)).unwrap();
        assert!(matches!(cms.delete_folder(root.id), Err(DeskError::Conflict(_))));
        assert!(matches!(cms.delete_folder(FolderId::new(77)), Err(DeskError::NotFound(_))));
    }

    #[test]
    fn template_in_use_guard() {
        let cms = service();
        let template = cms.create_template("Landing", "landing").unwrap();
        let p1 = cms.create_page(page("promo", None, Some(template.id))).unwrap();
        cms.create_page(page("sale", None, Some(template.id))).unwrap();

        let err = cms.delete_template(template.id).unwrap_err();
        assert!(matches!(&err, DeskError::Conflict(msg) if msg.contains("2 page(s)")));
        assert_eq!(cms.list_templates().unwrap().len(), 1);
        assert!(cms.store.get_recent_audits(10).unwrap().is_empty());

        cms.set_page_template(p1.id, None).unwrap();
        let err = cms.delete_template(template.id).unwrap_err();
        assert!(err.to_string().contains("1 page(s)"));
    }

    #[test]
    fn unused_template_deletes() {
        let cms = service();
        let template = cms.create_template("Blank", "blank").unwrap();
        cms.delete_template(template.id).unwrap();
        assert!(cms.list_templates().unwrap().is_empty());
        assert!(matches!(cms.delete_template(template.id), Err(DeskError::NotFound(_))));
    }

    #[test]
    fn page_validation_and_parenting() {
        let cms = service();
        let mut bad = page("Not A Slug", None, None);
        bad.title = " ".into();
        let err = cms.create_page(bad).unwrap_err();
        assert_eq!(err.field_errors().len(), 2);

        let about = cms.create_page(page("about", None, None)).unwrap();
        let team = cms.create_page(page("team", Some(about.id), None)).unwrap();

        let err = cms.set_page_parent(about.id, Some(team.id)).unwrap_err();
        assert!(matches!(err, DeskError::Hierarchy(HierarchyError::Cycle { .. })));

        let page = cms.set_page_parent(team.id, None).unwrap();
        assert_eq!(page.parent_id, None);
    }

    #[test]
    fn deleting_page_promotes_children() {
        let cms = service();
        let about = cms.create_page(page("about", None, None)).unwrap();
        let team = cms.create_page(page("team", Some(about.id), None)).unwrap();
        let jobs = cms.create_page(page("jobs", Some(team.id), None)).unwrap();

        cms.delete_page(team.id).unwrap();
        assert_eq!(cms.get_page(jobs.id).unwrap().parent_id, Some(about.id));
        assert!(matches!(cms.get_page(team.id), Err(DeskError::NotFound(_))));
    }

    #[test]
    fn slug_rules() {
        let mut errors = Vec::new();
        for ok in ["home", "about-us", "v2"] {
            check_slug(ok, &mut errors);
        }
        assert!(errors.is_empty());
        for bad in ["", "-x", "x-", "a--b", "Upper", "sp ace"] {
            check_slug(bad, &mut errors);
        }
        assert_eq!(errors.len(), 6);
    }
}
