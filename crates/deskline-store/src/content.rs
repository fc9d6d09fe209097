//! Menu, media folder, page, template and redirect tables
//!
//! Hierarchy writes run inside a single transaction: the ancestor walk, the
//! parent change and any sibling renumbering either all land or none do.

use chrono::{DateTime, Local};
use deskline_api::{
    MediaFolder, Menu, MenuItem, MenuNode, NewMenuItem, NewPage, NewRedirect, Page, Redirect, Template,
};
use deskline_util::{
    ancestor_chain, check_reparent, subtree_height, FolderId, HierarchyError, MenuId, MenuItemId, PageId,
    RedirectId, TemplateId,
};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashSet;
use tracing::debug;

use crate::sqlite::{get_opt_time, get_parsed, time_to_sql};
use crate::{ContentStore, SqliteStore, StoreError, StoreResult};

// Row mappers

fn menu_from_row(row: &Row<'_>) -> rusqlite::Result<Menu> {
    Ok(Menu {
        id: MenuId::new(row.get(0)?),
        name: row.get(1)?,
        location: row.get(2)?,
    })
}

fn menu_item_from_row(row: &Row<'_>) -> rusqlite::Result<MenuItem> {
    Ok(MenuItem {
        id: MenuItemId::new(row.get(0)?),
        menu_id: MenuId::new(row.get(1)?),
        parent_id: row.get::<_, Option<i64>>(2)?.map(MenuItemId::new),
        label: row.get(3)?,
        url: row.get(4)?,
        sort_order: row.get(5)?,
    })
}

fn folder_from_row(row: &Row<'_>) -> rusqlite::Result<MediaFolder> {
    Ok(MediaFolder {
        id: FolderId::new(row.get(0)?),
        name: row.get(1)?,
        parent_id: row.get::<_, Option<i64>>(2)?.map(FolderId::new),
    })
}

fn template_from_row(row: &Row<'_>) -> rusqlite::Result<Template> {
    Ok(Template {
        id: TemplateId::new(row.get(0)?),
        name: row.get(1)?,
        slug: row.get(2)?,
    })
}

fn page_from_row(row: &Row<'_>) -> rusqlite::Result<Page> {
    Ok(Page {
        id: PageId::new(row.get(0)?),
        title: row.get(1)?,
        slug: row.get(2)?,
        status: get_parsed(row, 3)?,
        template_id: row.get::<_, Option<i64>>(4)?.map(TemplateId::new),
        parent_id: row.get::<_, Option<i64>>(5)?.map(PageId::new),
        meta_title: row.get(6)?,
        meta_description: row.get(7)?,
    })
}

fn redirect_from_row(row: &Row<'_>) -> rusqlite::Result<Redirect> {
    Ok(Redirect {
        id: RedirectId::new(row.get(0)?),
        source: row.get(1)?,
        target: row.get(2)?,
        status_code: row.get(3)?,
        active: row.get(4)?,
        hits: row.get::<_, i64>(5)?.max(0) as u64,
        last_hit_at: get_opt_time(row, 6)?,
    })
}

const MENU_ITEM_COLUMNS: &str = "id, menu_id, parent_id, label, url, sort_order";
const PAGE_COLUMNS: &str = "id, title, slug, status, template_id, parent_id, meta_title, meta_description";
const REDIRECT_COLUMNS: &str = "id, source, target, status_code, active, hits, last_hit_at";

// Menu item helpers

fn load_menu_item(conn: &Connection, id: MenuItemId) -> StoreResult<MenuItem> {
    conn.query_row(
        &format!("SELECT {} FROM menu_items WHERE id = ?", MENU_ITEM_COLUMNS),
        [id.get()],
        menu_item_from_row,
    )
    .optional()?
    .ok_or_else(|| StoreError::NotFound(format!("menu item {}", id)))
}

fn menu_exists(conn: &Connection, id: MenuId) -> StoreResult<()> {
    let found: Option<i64> = conn
        .query_row("SELECT id FROM menus WHERE id = ?", [id.get()], |row| row.get(0))
        .optional()?;
    match found {
        Some(_) => Ok(()),
        None => Err(StoreError::NotFound(format!("menu {}", id))),
    }
}

fn menu_item_parent(conn: &Connection, id: MenuItemId) -> StoreResult<Option<MenuItemId>> {
    let parent: Option<Option<i64>> = conn
        .query_row("SELECT parent_id FROM menu_items WHERE id = ?", [id.get()], |row| {
            row.get(0)
        })
        .optional()?;
    match parent {
        Some(parent) => Ok(parent.map(MenuItemId::new)),
        None => Err(StoreError::NotFound(format!("menu item {}", id))),
    }
}

fn menu_item_children(conn: &Connection, id: MenuItemId) -> StoreResult<Vec<MenuItemId>> {
    let mut stmt = conn.prepare("SELECT id FROM menu_items WHERE parent_id = ? ORDER BY sort_order, id")?;
    let rows = stmt.query_map([id.get()], |row| row.get::<_, i64>(0))?;
    Ok(rows
        .map(|r| r.map(MenuItemId::new))
        .collect::<Result<Vec<_>, _>>()?)
}

/// Siblings under `parent` (root when None), in display order
fn menu_siblings(conn: &Connection, menu_id: MenuId, parent: Option<MenuItemId>) -> StoreResult<Vec<MenuItemId>> {
    let mut stmt = conn.prepare(
        "SELECT id FROM menu_items WHERE menu_id = ?1 AND parent_id IS ?2 ORDER BY sort_order, id",
    )?;
    let rows = stmt.query_map(params![menu_id.get(), parent.map(MenuItemId::get)], |row| {
        row.get::<_, i64>(0)
    })?;
    Ok(rows
        .map(|r| r.map(MenuItemId::new))
        .collect::<Result<Vec<_>, _>>()?)
}

/// Assign sort orders 0..n in the given order
fn renumber_menu_items(conn: &Connection, ordered: &[MenuItemId]) -> StoreResult<()> {
    let mut stmt = conn.prepare("UPDATE menu_items SET sort_order = ? WHERE id = ?")?;
    for (position, id) in ordered.iter().enumerate() {
        stmt.execute(params![position as i64, id.get()])?;
    }
    Ok(())
}

/// The parent must exist and live in the same menu
fn check_menu_parent(conn: &Connection, menu_id: MenuId, parent: Option<MenuItemId>) -> StoreResult<()> {
    if let Some(parent) = parent {
        let parent_item = load_menu_item(conn, parent)?;
        if parent_item.menu_id != menu_id {
            return Err(StoreError::Conflict(format!(
                "parent item {} belongs to menu {}, not menu {}",
                parent, parent_item.menu_id, menu_id
            )));
        }
    }
    Ok(())
}

/// Depth a new leaf would have under `parent`
fn depth_under<Id, F>(parent: Option<Id>, max_depth: usize, parent_of: F) -> StoreResult<usize>
where
    Id: Copy + Eq + std::hash::Hash + std::fmt::Display,
    F: FnMut(Id) -> StoreResult<Option<Id>>,
{
    let depth = match parent {
        Some(parent) => ancestor_chain(parent, max_depth, parent_of)?.len() + 1,
        None => 1,
    };
    if depth > max_depth {
        return Err(HierarchyError::TooDeep { max_depth }.into());
    }
    Ok(depth)
}

fn insert_menu_nodes(
    conn: &Connection,
    menu_id: MenuId,
    parent: Option<MenuItemId>,
    nodes: &[MenuNode],
) -> StoreResult<usize> {
    let mut inserted = 0;
    for (position, node) in nodes.iter().enumerate() {
        conn.execute(
            "INSERT INTO menu_items (menu_id, parent_id, label, url, sort_order) VALUES (?, ?, ?, ?, ?)",
            params![
                menu_id.get(),
                parent.map(MenuItemId::get),
                node.label,
                node.url,
                position as i64
            ],
        )?;
        let id = MenuItemId::new(conn.last_insert_rowid());
        inserted += 1 + insert_menu_nodes(conn, menu_id, Some(id), &node.children)?;
    }
    Ok(inserted)
}

// Folder helpers

fn load_folder(conn: &Connection, id: FolderId) -> StoreResult<MediaFolder> {
    conn.query_row(
        "SELECT id, name, parent_id FROM media_folders WHERE id = ?",
        [id.get()],
        folder_from_row,
    )
    .optional()?
    .ok_or_else(|| StoreError::NotFound(format!("folder {}", id)))
}

fn folder_parent(conn: &Connection, id: FolderId) -> StoreResult<Option<FolderId>> {
    Ok(load_folder(conn, id)?.parent_id)
}

fn folder_children(conn: &Connection, id: FolderId) -> StoreResult<Vec<FolderId>> {
    let mut stmt = conn.prepare("SELECT id FROM media_folders WHERE parent_id = ? ORDER BY id")?;
    let rows = stmt.query_map([id.get()], |row| row.get::<_, i64>(0))?;
    Ok(rows.map(|r| r.map(FolderId::new)).collect::<Result<Vec<_>, _>>()?)
}

// Page helpers

fn load_page(conn: &Connection, id: PageId) -> StoreResult<Page> {
    conn.query_row(
        &format!("SELECT {} FROM pages WHERE id = ?", PAGE_COLUMNS),
        [id.get()],
        page_from_row,
    )
    .optional()?
    .ok_or_else(|| StoreError::NotFound(format!("page {}", id)))
}

fn page_parent(conn: &Connection, id: PageId) -> StoreResult<Option<PageId>> {
    Ok(load_page(conn, id)?.parent_id)
}

fn page_children(conn: &Connection, id: PageId) -> StoreResult<Vec<PageId>> {
    let mut stmt = conn.prepare("SELECT id FROM pages WHERE parent_id = ? ORDER BY id")?;
    let rows = stmt.query_map([id.get()], |row| row.get::<_, i64>(0))?;
    Ok(rows.map(|r| r.map(PageId::new)).collect::<Result<Vec<_>, _>>()?)
}

fn template_exists(conn: &Connection, id: TemplateId) -> StoreResult<()> {
    let found: Option<i64> = conn
        .query_row("SELECT id FROM templates WHERE id = ?", [id.get()], |row| row.get(0))
        .optional()?;
    match found {
        Some(_) => Ok(()),
        None => Err(StoreError::NotFound(format!("template {}", id))),
    }
}

fn load_redirect(conn: &Connection, id: RedirectId) -> StoreResult<Redirect> {
    conn.query_row(
        &format!("SELECT {} FROM redirects WHERE id = ?", REDIRECT_COLUMNS),
        [id.get()],
        redirect_from_row,
    )
    .optional()?
    .ok_or_else(|| StoreError::NotFound(format!("redirect {}", id)))
}

impl ContentStore for SqliteStore {
    fn create_menu(&self, name: &str, location: Option<&str>) -> StoreResult<Menu> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO menus (name, location) VALUES (?, ?)",
            params![name, location],
        )?;
        Ok(Menu {
            id: MenuId::new(conn.last_insert_rowid()),
            name: name.to_string(),
            location: location.map(str::to_string),
        })
    }

    fn get_menu(&self, id: MenuId) -> StoreResult<Option<Menu>> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                "SELECT id, name, location FROM menus WHERE id = ?",
                [id.get()],
                menu_from_row,
            )
            .optional()?)
    }

    fn list_menus(&self) -> StoreResult<Vec<Menu>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id, name, location FROM menus ORDER BY id")?;
        let rows = stmt.query_map([], menu_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn delete_menu(&self, id: MenuId) -> StoreResult<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM menu_items WHERE menu_id = ?", [id.get()])?;
        let deleted = tx.execute("DELETE FROM menus WHERE id = ?", [id.get()])?;
        tx.commit()?;
        Ok(deleted > 0)
    }

    fn get_menu_item(&self, id: MenuItemId) -> StoreResult<Option<MenuItem>> {
        let conn = self.conn()?;
        match load_menu_item(&conn, id) {
            Ok(item) => Ok(Some(item)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn list_menu_items(&self, menu_id: MenuId) -> StoreResult<Vec<MenuItem>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM menu_items WHERE menu_id = ? ORDER BY parent_id, sort_order, id",
            MENU_ITEM_COLUMNS
        ))?;
        let rows = stmt.query_map([menu_id.get()], menu_item_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn insert_menu_item(&self, item: &NewMenuItem, max_depth: usize) -> StoreResult<MenuItem> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        menu_exists(&tx, item.menu_id)?;
        check_menu_parent(&tx, item.menu_id, item.parent_id)?;
        depth_under(item.parent_id, max_depth, |id| menu_item_parent(&tx, id))?;

        let sort_order: i64 = tx.query_row(
            "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM menu_items WHERE menu_id = ?1 AND parent_id IS ?2",
            params![item.menu_id.get(), item.parent_id.map(MenuItemId::get)],
            |row| row.get(0),
        )?;

        tx.execute(
            "INSERT INTO menu_items (menu_id, parent_id, label, url, sort_order) VALUES (?, ?, ?, ?, ?)",
            params![
                item.menu_id.get(),
                item.parent_id.map(MenuItemId::get),
                item.label,
                item.url,
                sort_order
            ],
        )?;
        let id = MenuItemId::new(tx.last_insert_rowid());
        tx.commit()?;

        debug!(item_id = %id, menu_id = %item.menu_id, sort_order, "Menu item added");
        Ok(MenuItem {
            id,
            menu_id: item.menu_id,
            parent_id: item.parent_id,
            label: item.label.clone(),
            url: item.url.clone(),
            sort_order,
        })
    }

    fn update_menu_item(&self, id: MenuItemId, label: &str, url: &str) -> StoreResult<MenuItem> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE menu_items SET label = ?, url = ? WHERE id = ?",
            params![label, url, id.get()],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("menu item {}", id)));
        }
        load_menu_item(&conn, id)
    }

    fn move_menu_item(
        &self,
        id: MenuItemId,
        parent: Option<MenuItemId>,
        position: usize,
        max_depth: usize,
    ) -> StoreResult<MenuItem> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let item = load_menu_item(&tx, id)?;
        if parent != Some(id) {
            check_menu_parent(&tx, item.menu_id, parent)?;
        }

        let height = subtree_height(id, max_depth, |n| menu_item_children(&tx, n))?;
        check_reparent(id, parent, height, max_depth, |n| menu_item_parent(&tx, n))?;

        // Close the gap in the old sibling list
        let mut old_siblings = menu_siblings(&tx, item.menu_id, item.parent_id)?;
        old_siblings.retain(|s| *s != id);
        renumber_menu_items(&tx, &old_siblings)?;

        let mut new_siblings = menu_siblings(&tx, item.menu_id, parent)?;
        new_siblings.retain(|s| *s != id);
        let position = position.min(new_siblings.len());
        new_siblings.insert(position, id);

        tx.execute(
            "UPDATE menu_items SET parent_id = ? WHERE id = ?",
            params![parent.map(MenuItemId::get), id.get()],
        )?;
        renumber_menu_items(&tx, &new_siblings)?;

        let moved = load_menu_item(&tx, id)?;
        tx.commit()?;

        debug!(
            item_id = %id,
            parent_id = ?parent.map(MenuItemId::get),
            position,
            "Menu item moved"
        );
        Ok(moved)
    }

    fn reorder_menu_items(
        &self,
        menu_id: MenuId,
        parent: Option<MenuItemId>,
        ordered: &[MenuItemId],
    ) -> StoreResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        menu_exists(&tx, menu_id)?;
        check_menu_parent(&tx, menu_id, parent)?;

        let current: HashSet<MenuItemId> = menu_siblings(&tx, menu_id, parent)?.into_iter().collect();
        let requested: HashSet<MenuItemId> = ordered.iter().copied().collect();
        if requested.len() != ordered.len() || requested != current {
            return Err(StoreError::Conflict(format!(
                "reorder must list each of the {} current children exactly once",
                current.len()
            )));
        }

        renumber_menu_items(&tx, ordered)?;
        tx.commit()?;

        debug!(menu_id = %menu_id, count = ordered.len(), "Menu items reordered");
        Ok(())
    }

    fn delete_menu_item(&self, id: MenuItemId) -> StoreResult<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let item = load_menu_item(&tx, id)?;
        let children = menu_siblings(&tx, item.menu_id, Some(id))?;

        // Children take the deleted item's slot, keeping their own order
        let mut siblings = Vec::new();
        for sibling in menu_siblings(&tx, item.menu_id, item.parent_id)? {
            if sibling == id {
                siblings.extend(children.iter().copied());
            } else {
                siblings.push(sibling);
            }
        }

        tx.execute(
            "UPDATE menu_items SET parent_id = ? WHERE parent_id = ?",
            params![item.parent_id.map(MenuItemId::get), id.get()],
        )?;
        tx.execute("DELETE FROM menu_items WHERE id = ?", [id.get()])?;
        renumber_menu_items(&tx, &siblings)?;
        tx.commit()?;

        debug!(item_id = %id, promoted = children.len(), "Menu item deleted");
        Ok(children.len())
    }

    fn replace_menu_tree(&self, menu_id: MenuId, roots: &[MenuNode]) -> StoreResult<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        menu_exists(&tx, menu_id)?;
        tx.execute("DELETE FROM menu_items WHERE menu_id = ?", [menu_id.get()])?;
        let inserted = insert_menu_nodes(&tx, menu_id, None, roots)?;
        tx.commit()?;

        debug!(menu_id = %menu_id, inserted, "Menu tree replaced");
        Ok(inserted)
    }

    fn create_folder(&self, name: &str, parent: Option<FolderId>, max_depth: usize) -> StoreResult<MediaFolder> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        depth_under(parent, max_depth, |id| folder_parent(&tx, id))?;
        tx.execute(
            "INSERT INTO media_folders (name, parent_id) VALUES (?, ?)",
            params![name, parent.map(FolderId::get)],
        )?;
        let id = FolderId::new(tx.last_insert_rowid());
        tx.commit()?;

        Ok(MediaFolder {
            id,
            name: name.to_string(),
            parent_id: parent,
        })
    }

    fn get_folder(&self, id: FolderId) -> StoreResult<Option<MediaFolder>> {
        let conn = self.conn()?;
        match load_folder(&conn, id) {
            Ok(folder) => Ok(Some(folder)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn list_folders(&self) -> StoreResult<Vec<MediaFolder>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id, name, parent_id FROM media_folders ORDER BY id")?;
        let rows = stmt.query_map([], folder_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn move_folder(&self, id: FolderId, parent: Option<FolderId>, max_depth: usize) -> StoreResult<MediaFolder> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        load_folder(&tx, id)?;
        let height = subtree_height(id, max_depth, |n| folder_children(&tx, n))?;
        check_reparent(id, parent, height, max_depth, |n| folder_parent(&tx, n))?;

        tx.execute(
            "UPDATE media_folders SET parent_id = ? WHERE id = ?",
            params![parent.map(FolderId::get), id.get()],
        )?;
        let folder = load_folder(&tx, id)?;
        tx.commit()?;

        Ok(folder)
    }

    fn delete_folder(&self, id: FolderId) -> StoreResult<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let children = folder_children(&tx, id)?;
        if !children.is_empty() {
            return Err(StoreError::InUse {
                entity: format!("folder {}", id),
                count: children.len(),
                referrer: "subfolder(s)",
            });
        }
        let deleted = tx.execute("DELETE FROM media_folders WHERE id = ?", [id.get()])?;
        tx.commit()?;
        Ok(deleted > 0)
    }

    fn create_template(&self, name: &str, slug: &str) -> StoreResult<Template> {
        let conn = self.conn()?;
        let taken: Option<i64> = conn
            .query_row("SELECT id FROM templates WHERE slug = ?", [slug], |row| row.get(0))
            .optional()?;
        if taken.is_some() {
            return Err(StoreError::Conflict(format!("template slug '{}' already exists", slug)));
        }

        conn.execute(
            "INSERT INTO templates (name, slug) VALUES (?, ?)",
            params![name, slug],
        )?;
        Ok(Template {
            id: TemplateId::new(conn.last_insert_rowid()),
            name: name.to_string(),
            slug: slug.to_string(),
        })
    }

    fn get_template(&self, id: TemplateId) -> StoreResult<Option<Template>> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                "SELECT id, name, slug FROM templates WHERE id = ?",
                [id.get()],
                template_from_row,
            )
            .optional()?)
    }

    fn list_templates(&self) -> StoreResult<Vec<Template>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id, name, slug FROM templates ORDER BY id")?;
        let rows = stmt.query_map([], template_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn count_template_pages(&self, id: TemplateId) -> StoreResult<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM pages WHERE template_id = ?",
            [id.get()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn delete_template(&self, id: TemplateId) -> StoreResult<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let count: i64 = tx.query_row(
            "SELECT COUNT(*) FROM pages WHERE template_id = ?",
            [id.get()],
            |row| row.get(0),
        )?;
        if count > 0 {
            return Err(StoreError::InUse {
                entity: format!("template {}", id),
                count: count as usize,
                referrer: "page(s)",
            });
        }

        let deleted = tx.execute("DELETE FROM templates WHERE id = ?", [id.get()])?;
        tx.commit()?;
        Ok(deleted > 0)
    }

    fn create_page(&self, page: &NewPage, max_depth: usize) -> StoreResult<Page> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let taken: Option<i64> = tx
            .query_row("SELECT id FROM pages WHERE slug = ?", [&page.slug], |row| row.get(0))
            .optional()?;
        if taken.is_some() {
            return Err(StoreError::Conflict(format!("page slug '{}' already exists", page.slug)));
        }
        if let Some(template) = page.template_id {
            template_exists(&tx, template)?;
        }
        depth_under(page.parent_id, max_depth, |id| page_parent(&tx, id))?;

        tx.execute(
            r#"
            INSERT INTO pages (title, slug, status, template_id, parent_id, meta_title, meta_description)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                page.title,
                page.slug,
                page.status.as_str(),
                page.template_id.map(TemplateId::get),
                page.parent_id.map(PageId::get),
                page.meta_title,
                page.meta_description,
            ],
        )?;
        let created = load_page(&tx, PageId::new(tx.last_insert_rowid()))?;
        tx.commit()?;
        Ok(created)
    }

    fn get_page(&self, id: PageId) -> StoreResult<Option<Page>> {
        let conn = self.conn()?;
        match load_page(&conn, id) {
            Ok(page) => Ok(Some(page)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn list_pages(&self) -> StoreResult<Vec<Page>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("SELECT {} FROM pages ORDER BY id", PAGE_COLUMNS))?;
        let rows = stmt.query_map([], page_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn set_page_parent(&self, id: PageId, parent: Option<PageId>, max_depth: usize) -> StoreResult<Page> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        load_page(&tx, id)?;
        let height = subtree_height(id, max_depth, |n| page_children(&tx, n))?;
        check_reparent(id, parent, height, max_depth, |n| page_parent(&tx, n))?;

        tx.execute(
            "UPDATE pages SET parent_id = ? WHERE id = ?",
            params![parent.map(PageId::get), id.get()],
        )?;
        let page = load_page(&tx, id)?;
        tx.commit()?;
        Ok(page)
    }

    fn set_page_template(&self, id: PageId, template: Option<TemplateId>) -> StoreResult<Page> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        load_page(&tx, id)?;
        if let Some(template) = template {
            template_exists(&tx, template)?;
        }
        tx.execute(
            "UPDATE pages SET template_id = ? WHERE id = ?",
            params![template.map(TemplateId::get), id.get()],
        )?;
        let page = load_page(&tx, id)?;
        tx.commit()?;
        Ok(page)
    }

    fn delete_page(&self, id: PageId) -> StoreResult<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let page = match load_page(&tx, id) {
            Ok(page) => page,
            Err(StoreError::NotFound(_)) => return Ok(false),
            Err(e) => return Err(e),
        };
        tx.execute(
            "UPDATE pages SET parent_id = ? WHERE parent_id = ?",
            params![page.parent_id.map(PageId::get), id.get()],
        )?;
        tx.execute("DELETE FROM pages WHERE id = ?", [id.get()])?;
        tx.commit()?;
        Ok(true)
    }

    fn insert_redirect(&self, redirect: &NewRedirect) -> StoreResult<Redirect> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let taken: Option<i64> = tx
            .query_row(
                "SELECT id FROM redirects WHERE source = ?",
                [&redirect.source],
                |row| row.get(0),
            )
            .optional()?;
        if taken.is_some() {
            return Err(StoreError::Conflict(format!(
                "a redirect from '{}' already exists",
                redirect.source
            )));
        }

        tx.execute(
            "INSERT INTO redirects (source, target, status_code, active, hits) VALUES (?, ?, ?, 1, 0)",
            params![redirect.source, redirect.target, redirect.status_code],
        )?;
        let created = load_redirect(&tx, RedirectId::new(tx.last_insert_rowid()))?;
        tx.commit()?;

        debug!(source = %created.source, target = %created.target, "Redirect inserted");
        Ok(created)
    }

    fn update_redirect(&self, id: RedirectId, target: &str, status_code: u16, active: bool) -> StoreResult<Redirect> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE redirects SET target = ?, status_code = ?, active = ? WHERE id = ?",
            params![target, status_code, active, id.get()],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("redirect {}", id)));
        }
        load_redirect(&conn, id)
    }

    fn get_redirect(&self, id: RedirectId) -> StoreResult<Option<Redirect>> {
        let conn = self.conn()?;
        match load_redirect(&conn, id) {
            Ok(redirect) => Ok(Some(redirect)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn find_redirect(&self, source: &str) -> StoreResult<Option<Redirect>> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                &format!("SELECT {} FROM redirects WHERE source = ?", REDIRECT_COLUMNS),
                [source],
                redirect_from_row,
            )
            .optional()?)
    }

    fn list_redirects(&self) -> StoreResult<Vec<Redirect>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("SELECT {} FROM redirects ORDER BY source", REDIRECT_COLUMNS))?;
        let rows = stmt.query_map([], redirect_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn delete_redirect(&self, id: RedirectId) -> StoreResult<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM redirects WHERE id = ?", [id.get()])?;
        Ok(deleted > 0)
    }

    fn record_redirect_hit(&self, id: RedirectId, at: DateTime<Local>) -> StoreResult<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE redirects SET hits = hits + 1, last_hit_at = ? WHERE id = ?",
            params![time_to_sql(&at), id.get()],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("redirect {}", id)));
        }
        Ok(())
    }
}
