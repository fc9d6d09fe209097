//! Menu trees: item placement, nested views, JSON export and import

use deskline_api::{Menu, MenuItem, MenuNode, NewMenuItem};
use deskline_store::{AuditEvent, AuditEventType, ContentStore};
use deskline_util::{DeskError, FieldError, HierarchyError, MenuId, MenuItemId, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};

use crate::cms::{check_name, into_result, ContentService};

/// Portable form of a menu, as written by [`ContentService::export_menu_json`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuExport {
    pub name: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub items: Vec<MenuNode>,
}

fn check_item(label: &str, url: &str, errors: &mut Vec<FieldError>) {
    check_name("label", label, errors);
    if url.trim().is_empty() {
        errors.push(FieldError::new("url", "must not be empty"));
    }
}

/// Validate every node of an imported tree, naming fields by their path
fn check_nodes(nodes: &[MenuNode], path: &str, errors: &mut Vec<FieldError>) {
    for (i, node) in nodes.iter().enumerate() {
        let here = format!("{}[{}]", path, i);
        let mut node_errors = Vec::new();
        check_item(&node.label, &node.url, &mut node_errors);
        errors.extend(
            node_errors
                .into_iter()
                .map(|e| FieldError::new(format!("{}.{}", here, e.field), e.message)),
        );
        check_nodes(&node.children, &format!("{}.children", here), errors);
    }
}

impl ContentService {
    pub fn create_menu(&self, name: &str, location: Option<&str>) -> Result<Menu> {
        let mut errors = Vec::new();
        check_name("name", name, &mut errors);
        into_result(errors)?;

        let location = location.map(str::trim).filter(|l| !l.is_empty());
        Ok(self.store.create_menu(name.trim(), location)?)
    }

    pub fn get_menu(&self, id: MenuId) -> Result<Menu> {
        self.store
            .get_menu(id)?
            .ok_or_else(|| DeskError::not_found(format!("menu {}", id)))
    }

    pub fn list_menus(&self) -> Result<Vec<Menu>> {
        Ok(self.store.list_menus()?)
    }

    pub fn delete_menu(&self, id: MenuId) -> Result<()> {
        if !self.store.delete_menu(id)? {
            return Err(DeskError::not_found(format!("menu {}", id)));
        }
        Ok(())
    }

    /// Append an item after its last sibling
    pub fn add_menu_item(&self, item: NewMenuItem) -> Result<MenuItem> {
        let mut errors = Vec::new();
        check_item(&item.label, &item.url, &mut errors);
        into_result(errors)?;

        let item = NewMenuItem {
            label: item.label.trim().to_string(),
            url: item.url.trim().to_string(),
            ..item
        };
        Ok(self.store.insert_menu_item(&item, self.limits.max_menu_depth)?)
    }

    pub fn update_menu_item(&self, id: MenuItemId, label: &str, url: &str) -> Result<MenuItem> {
        let mut errors = Vec::new();
        check_item(label, url, &mut errors);
        into_result(errors)?;

        Ok(self.store.update_menu_item(id, label.trim(), url.trim())?)
    }

    /// Move an item under `parent` (None for the top level) at `position`
    /// among its new siblings. Rejects cycles, other menus' items as parents
    /// and results deeper than the menu depth limit.
    pub fn move_menu_item(&self, id: MenuItemId, parent: Option<MenuItemId>, position: usize) -> Result<MenuItem> {
        let item = self
            .store
            .move_menu_item(id, parent, position, self.limits.max_menu_depth)?;

        info!(item_id = %id, parent_id = ?parent, position, "Menu item moved");
        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::MenuItemMoved {
            item_id: id,
            parent_id: parent,
            position,
        }));
        Ok(item)
    }

    /// Put the children of `parent` in the given order
    pub fn reorder_menu_items(&self, menu_id: MenuId, parent: Option<MenuItemId>, ordered: &[MenuItemId]) -> Result<()> {
        Ok(self.store.reorder_menu_items(menu_id, parent, ordered)?)
    }

    /// Delete an item; its children take its place
    pub fn delete_menu_item(&self, id: MenuItemId) -> Result<usize> {
        let promoted = self.store.delete_menu_item(id)?;

        info!(item_id = %id, promoted, "Menu item deleted");
        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::MenuItemDeleted {
            item_id: id,
            promoted_children: promoted,
        }));
        Ok(promoted)
    }

    /// Nested view of a menu.
    ///
    /// Built top-down from the root items with the depth limit as a bound, so
    /// a corrupted table cannot send it into a loop.
    pub fn menu_tree(&self, menu_id: MenuId) -> Result<Vec<MenuNode>> {
        self.get_menu(menu_id)?;
        let items = self.store.list_menu_items(menu_id)?;

        let mut children: HashMap<Option<MenuItemId>, Vec<&MenuItem>> = HashMap::new();
        for item in &items {
            children.entry(item.parent_id).or_default().push(item);
        }
        for siblings in children.values_mut() {
            siblings.sort_by_key(|i| (i.sort_order, i.id));
        }

        let mut visited = HashSet::new();
        let roots = self.build_nodes(&children, None, 1, &mut visited)?;

        if visited.len() != items.len() {
            warn!(
                menu_id = %menu_id,
                unreachable = items.len() - visited.len(),
                "Menu has items that no root reaches"
            );
        }
        Ok(roots)
    }

    fn build_nodes(
        &self,
        children: &HashMap<Option<MenuItemId>, Vec<&MenuItem>>,
        parent: Option<MenuItemId>,
        depth: usize,
        visited: &mut HashSet<MenuItemId>,
    ) -> Result<Vec<MenuNode>> {
        let Some(items) = children.get(&parent) else {
            return Ok(Vec::new());
        };
        let max_depth = self.limits.max_menu_depth;
        if depth > max_depth {
            return Err(HierarchyError::TooDeep { max_depth }.into());
        }

        let mut nodes = Vec::with_capacity(items.len());
        for item in items {
            if !visited.insert(item.id) {
                return Err(HierarchyError::CorruptChain {
                    node: item.id.to_string(),
                }
                .into());
            }
            nodes.push(MenuNode {
                id: Some(item.id),
                label: item.label.clone(),
                url: item.url.clone(),
                children: self.build_nodes(children, Some(item.id), depth + 1, visited)?,
            });
        }
        Ok(nodes)
    }

    /// Pretty-printed JSON of a menu and its tree, without row ids
    pub fn export_menu_json(&self, menu_id: MenuId) -> Result<String> {
        let menu = self.get_menu(menu_id)?;
        let export = MenuExport {
            name: menu.name,
            location: menu.location,
            items: strip_ids(self.menu_tree(menu_id)?),
        };
        serde_json::to_string_pretty(&export).map_err(|e| DeskError::internal(e.to_string()))
    }

    /// Replace the items of `menu_id` with the tree in `json`.
    ///
    /// The whole tree is validated first; nothing changes unless every node
    /// passes and the tree fits within the menu depth limit.
    pub fn import_menu_json(&self, menu_id: MenuId, json: &str) -> Result<usize> {
        let export: MenuExport =
            serde_json::from_str(json).map_err(|e| DeskError::field("json", e.to_string()))?;

        let mut errors = Vec::new();
        check_nodes(&export.items, "items", &mut errors);
        into_result(errors)?;

        let max_depth = self.limits.max_menu_depth;
        if export.items.iter().any(|n| n.depth() > max_depth) {
            return Err(HierarchyError::TooDeep { max_depth }.into());
        }

        let count = self.store.replace_menu_tree(menu_id, &export.items)?;

        info!(menu_id = %menu_id, item_count = count, "Menu imported");
        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::MenuImported {
            menu_id,
            item_count: count,
        }));
        Ok(count)
    }
}

fn strip_ids(nodes: Vec<MenuNode>) -> Vec<MenuNode> {
    nodes
        .into_iter()
        .map(|n| MenuNode {
            id: None,
            children: strip_ids(n.children),
            ..n
        })
        .collect()
}
