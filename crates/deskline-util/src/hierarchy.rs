//! Bounded walks over parent/child hierarchies
//!
//! Menu items, media folders and pages all store a nullable parent id.
//! Before a new parent is accepted the ancestor chain of that parent is
//! walked, with a depth bound so that a corrupted table can never spin
//! forever.

use std::collections::HashSet;
use std::fmt::Display;
use std::hash::Hash;
use thiserror::Error;

/// Rejections produced by hierarchy checks
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HierarchyError {
    #[error("'{node}' cannot be its own parent")]
    SelfParent { node: String },

    #[error("moving '{node}' under '{parent}' would create a circular reference")]
    Cycle { node: String, parent: String },

    #[error("hierarchy would exceed the maximum depth of {max_depth}")]
    TooDeep { max_depth: usize },

    #[error("existing circular reference detected at '{node}'")]
    CorruptChain { node: String },
}

/// Collect the ancestor chain of `start`, starting with `start` itself and
/// ending at a root.
///
/// Fails with [`HierarchyError::CorruptChain`] if a node is visited twice and
/// with [`HierarchyError::TooDeep`] if the chain is longer than `max_depth`.
pub fn ancestor_chain<Id, E, F>(start: Id, max_depth: usize, mut parent_of: F) -> Result<Vec<Id>, E>
where
    Id: Copy + Eq + Hash + Display,
    E: From<HierarchyError>,
    F: FnMut(Id) -> Result<Option<Id>, E>,
{
    let mut chain = vec![start];
    let mut seen = HashSet::from([start]);
    let mut current = start;

    while let Some(parent) = parent_of(current)? {
        if !seen.insert(parent) {
            return Err(HierarchyError::CorruptChain {
                node: parent.to_string(),
            }
            .into());
        }
        chain.push(parent);
        if chain.len() > max_depth {
            return Err(HierarchyError::TooDeep { max_depth }.into());
        }
        current = parent;
    }

    Ok(chain)
}

/// Number of levels below `node` (0 for a leaf), bounded by `max_depth`.
pub fn subtree_height<Id, E, F>(node: Id, max_depth: usize, mut children_of: F) -> Result<usize, E>
where
    Id: Copy + Eq + Hash + Display,
    E: From<HierarchyError>,
    F: FnMut(Id) -> Result<Vec<Id>, E>,
{
    let mut seen = HashSet::from([node]);
    let mut level = vec![node];
    let mut height = 0;

    loop {
        let mut next = Vec::new();
        for id in &level {
            for child in children_of(*id)? {
                if !seen.insert(child) {
                    return Err(HierarchyError::CorruptChain {
                        node: child.to_string(),
                    }
                    .into());
                }
                next.push(child);
            }
        }
        if next.is_empty() {
            return Ok(height);
        }
        height += 1;
        if height >= max_depth {
            return Err(HierarchyError::TooDeep { max_depth }.into());
        }
        level = next;
    }
}

/// Decide whether `node` (whose subtree is `height` levels deep) may hang
/// under `new_parent`.
///
/// Depth counts levels from the root, so a root-level leaf has depth 1.
pub fn check_reparent<Id, E, F>(
    node: Id,
    new_parent: Option<Id>,
    height: usize,
    max_depth: usize,
    parent_of: F,
) -> Result<(), E>
where
    Id: Copy + Eq + Hash + Display,
    E: From<HierarchyError>,
    F: FnMut(Id) -> Result<Option<Id>, E>,
{
    let parent_depth = match new_parent {
        None => 0,
        Some(parent) if parent == node => {
            return Err(HierarchyError::SelfParent {
                node: node.to_string(),
            }
            .into());
        }
        Some(parent) => {
            let chain = ancestor_chain(parent, max_depth, parent_of)?;
            if chain.contains(&node) {
                return Err(HierarchyError::Cycle {
                    node: node.to_string(),
                    parent: parent.to_string(),
                }
                .into());
            }
            chain.len()
        }
    };

    if parent_depth + 1 + height > max_depth {
        return Err(HierarchyError::TooDeep { max_depth }.into());
    }

    Ok(())
}
