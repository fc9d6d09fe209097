//! Store trait definitions

use chrono::{DateTime, Local};
use deskline_api::{
    MediaFolder, Menu, MenuItem, MenuNode, NewMenuItem, NewPage, NewRedirect, Notification, Page, Redirect,
    Template, Ticket, TicketReply,
};
use deskline_util::{FolderId, MenuId, MenuItemId, NotificationId, PageId, RedirectId, TemplateId, TicketId};

use crate::{AuditEvent, StoreResult};

/// Ticket persistence
pub trait TicketStore {
    /// Insert a new ticket, returning its row id
    fn insert_ticket(&self, ticket: &Ticket) -> StoreResult<TicketId>;

    /// Overwrite a stored ticket
    fn update_ticket(&self, ticket: &Ticket) -> StoreResult<()>;

    fn get_ticket(&self, id: TicketId) -> StoreResult<Option<Ticket>>;

    /// Delete a ticket and its replies; false if it did not exist
    fn delete_ticket(&self, id: TicketId) -> StoreResult<bool>;

    /// All tickets ordered by id, optionally only those not yet resolved or closed
    fn list_tickets(&self, open_only: bool) -> StoreResult<Vec<Ticket>>;

    /// Insert a reply and overwrite its ticket in one transaction, returning the reply row id
    fn add_reply(&self, reply: &TicketReply, ticket: &Ticket) -> StoreResult<i64>;

    fn list_replies(&self, ticket_id: TicketId) -> StoreResult<Vec<TicketReply>>;
}

/// CMS content persistence.
///
/// Every write that touches a hierarchy checks the ancestor chain inside the
/// same transaction that performs it, bounded by the caller's `max_depth`.
pub trait ContentStore {
    // Menus

    fn create_menu(&self, name: &str, location: Option<&str>) -> StoreResult<Menu>;

    fn get_menu(&self, id: MenuId) -> StoreResult<Option<Menu>>;

    fn list_menus(&self) -> StoreResult<Vec<Menu>>;

    /// Delete a menu with all of its items
    fn delete_menu(&self, id: MenuId) -> StoreResult<bool>;

    fn get_menu_item(&self, id: MenuItemId) -> StoreResult<Option<MenuItem>>;

    /// Items of a menu ordered by parent, then sort order
    fn list_menu_items(&self, menu_id: MenuId) -> StoreResult<Vec<MenuItem>>;

    /// Append an item after its last sibling
    fn insert_menu_item(&self, item: &NewMenuItem, max_depth: usize) -> StoreResult<MenuItem>;

    /// Change label and url
    fn update_menu_item(&self, id: MenuItemId, label: &str, url: &str) -> StoreResult<MenuItem>;

    /// Move an item under `parent` (None for root) at `position` among its
    /// new siblings, renumbering both sibling lists
    fn move_menu_item(
        &self,
        id: MenuItemId,
        parent: Option<MenuItemId>,
        position: usize,
        max_depth: usize,
    ) -> StoreResult<MenuItem>;

    /// Reassign sort orders so siblings follow `ordered`, which must list
    /// exactly the current children of `parent`
    fn reorder_menu_items(
        &self,
        menu_id: MenuId,
        parent: Option<MenuItemId>,
        ordered: &[MenuItemId],
    ) -> StoreResult<()>;

    /// Delete an item; its children take its place under its parent.
    /// Returns how many children were promoted.
    fn delete_menu_item(&self, id: MenuItemId) -> StoreResult<usize>;

    /// Replace every item of a menu with the given tree
    fn replace_menu_tree(&self, menu_id: MenuId, roots: &[MenuNode]) -> StoreResult<usize>;

    // Media folders

    fn create_folder(&self, name: &str, parent: Option<FolderId>, max_depth: usize) -> StoreResult<MediaFolder>;

    fn get_folder(&self, id: FolderId) -> StoreResult<Option<MediaFolder>>;

    fn list_folders(&self) -> StoreResult<Vec<MediaFolder>>;

    fn move_folder(&self, id: FolderId, parent: Option<FolderId>, max_depth: usize) -> StoreResult<MediaFolder>;

    /// Delete an empty folder
    fn delete_folder(&self, id: FolderId) -> StoreResult<bool>;

    // Pages and templates

    fn create_template(&self, name: &str, slug: &str) -> StoreResult<Template>;

    fn get_template(&self, id: TemplateId) -> StoreResult<Option<Template>>;

    fn list_templates(&self) -> StoreResult<Vec<Template>>;

    /// Pages referencing the template
    fn count_template_pages(&self, id: TemplateId) -> StoreResult<usize>;

    /// Delete a template no page references
    fn delete_template(&self, id: TemplateId) -> StoreResult<bool>;

    fn create_page(&self, page: &NewPage, max_depth: usize) -> StoreResult<Page>;

    fn get_page(&self, id: PageId) -> StoreResult<Option<Page>>;

    fn list_pages(&self) -> StoreResult<Vec<Page>>;

    fn set_page_parent(&self, id: PageId, parent: Option<PageId>, max_depth: usize) -> StoreResult<Page>;

    fn set_page_template(&self, id: PageId, template: Option<TemplateId>) -> StoreResult<Page>;

    /// Delete a page; its children move up to its parent
    fn delete_page(&self, id: PageId) -> StoreResult<bool>;

    // Redirects

    /// Insert a redirect whose source is already normalized
    fn insert_redirect(&self, redirect: &NewRedirect) -> StoreResult<Redirect>;

    fn update_redirect(&self, id: RedirectId, target: &str, status_code: u16, active: bool) -> StoreResult<Redirect>;

    fn get_redirect(&self, id: RedirectId) -> StoreResult<Option<Redirect>>;

    fn find_redirect(&self, source: &str) -> StoreResult<Option<Redirect>>;

    fn list_redirects(&self) -> StoreResult<Vec<Redirect>>;

    fn delete_redirect(&self, id: RedirectId) -> StoreResult<bool>;

    fn record_redirect_hit(&self, id: RedirectId, at: DateTime<Local>) -> StoreResult<()>;
}

/// Main store trait
pub trait Store: TicketStore + ContentStore + Send + Sync {
    // Audit log

    /// Append an audit event
    fn append_audit(&self, event: AuditEvent) -> StoreResult<()>;

    /// Get recent audit events
    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>>;

    // Notification outbox

    /// Queue a notification, returning its row id
    fn enqueue_notification(&self, notification: &Notification) -> StoreResult<NotificationId>;

    /// Undelivered notifications with fewer than `max_attempts` attempts, oldest first
    fn pending_notifications(&self, max_attempts: u32, limit: usize) -> StoreResult<Vec<Notification>>;

    fn mark_notification_delivered(&self, id: NotificationId, at: DateTime<Local>) -> StoreResult<()>;

    /// Count a failed attempt; returns the new attempt count
    fn mark_notification_failed(&self, id: NotificationId, error: &str) -> StoreResult<u32>;

    // Health

    /// Check if store is healthy
    fn is_healthy(&self) -> bool;
}
