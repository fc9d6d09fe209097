//! CMS content types: menus, media folders, pages, templates, redirects

use chrono::{DateTime, Local};
use deskline_util::{FolderId, MenuId, MenuItemId, PageId, RedirectId, TemplateId};
use serde::{Deserialize, Serialize};

use crate::named_enum;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Menu {
    pub id: MenuId,
    pub name: String,
    /// Theme slot the menu renders in (e.g. "header")
    pub location: Option<String>,
}

/// A menu entry; siblings are ordered by `sort_order`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuItem {
    pub id: MenuItemId,
    pub menu_id: MenuId,
    pub parent_id: Option<MenuItemId>,
    pub label: String,
    pub url: String,
    pub sort_order: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMenuItem {
    pub menu_id: MenuId,
    pub parent_id: Option<MenuItemId>,
    pub label: String,
    pub url: String,
}

/// Nested view of a menu, also the JSON export format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MenuItemId>,
    pub label: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<MenuNode>,
}

impl MenuNode {
    /// Levels in this subtree, counting the node itself
    pub fn depth(&self) -> usize {
        1 + self.children.iter().map(MenuNode::depth).max().unwrap_or(0)
    }

    /// Nodes in this subtree, counting the node itself
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(MenuNode::count).sum::<usize>()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaFolder {
    pub id: FolderId,
    pub name: String,
    pub parent_id: Option<FolderId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PageStatus {
    #[default]
    Draft,
    Published,
    Archived,
}

named_enum!(PageStatus, "page status" {
    Draft => "draft",
    Published => "published",
    Archived => "archived",
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub id: PageId,
    pub title: String,
    pub slug: String,
    pub status: PageStatus,
    pub template_id: Option<TemplateId>,
    pub parent_id: Option<PageId>,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPage {
    pub title: String,
    pub slug: String,
    #[serde(default)]
    pub status: PageStatus,
    pub template_id: Option<TemplateId>,
    pub parent_id: Option<PageId>,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub id: TemplateId,
    pub name: String,
    pub slug: String,
}

/// HTTP status codes a redirect may answer with
pub const REDIRECT_STATUS_CODES: [u16; 4] = [301, 302, 307, 308];

fn default_status_code() -> u16 {
    301
}

/// A stored URL redirect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redirect {
    pub id: RedirectId,
    /// Normalized source path, unique
    pub source: String,
    /// Path or absolute URL
    pub target: String,
    pub status_code: u16,
    pub active: bool,
    pub hits: u64,
    pub last_hit_at: Option<DateTime<Local>>,
}

/// Redirect input; also the CSV/JSON import row format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRedirect {
    pub source: String,
    pub target: String,
    #[serde(default = "default_status_code")]
    pub status_code: u16,
}

impl NewRedirect {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            status_code: default_status_code(),
        }
    }
}

/// Outcome of following a redirect chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectResolution {
    pub source: String,
    /// Where the chain ends
    pub target: String,
    /// Status code of the first hop
    pub status_code: u16,
    /// Every URL visited after the source, ending with `target`
    pub hops: Vec<String>,
}
