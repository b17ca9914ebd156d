//! Role-based category permissions.
//!
//! A role grants a set of document categories. A user sees a chunk only if
//! the chunk's category is in the set granted by the user's role. The user
//! store lives outside this crate and hands a [`UserPermissionView`] to the
//! search layer by value.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::index::ChunkRecord;

/// Categories granted to a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePermission {
    pub role: String,
    pub allowed_categories: BTreeSet<String>,
    #[serde(default)]
    pub description: String,
}

impl RolePermission {
    pub fn new<I, S>(role: &str, categories: I, description: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            role: role.to_string(),
            allowed_categories: categories.into_iter().map(Into::into).collect(),
            description: description.to_string(),
        }
    }
}

/// What the search layer needs to know about the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPermissionView {
    pub user_id: String,
    pub username: String,
    pub role: String,
    pub allowed_categories: BTreeSet<String>,
}

impl UserPermissionView {
    /// View of `user_id` holding `permission`'s role.
    pub fn for_role(user_id: &str, username: &str, permission: &RolePermission) -> Self {
        Self {
            user_id: user_id.to_string(),
            username: username.to_string(),
            role: permission.role.clone(),
            allowed_categories: permission.allowed_categories.clone(),
        }
    }

    pub fn can_view(&self, category: &str) -> bool {
        is_allowed(category, &self.allowed_categories)
    }
}

/// `true` iff `category` is one of `allowed_categories`.
pub fn is_allowed(category: &str, allowed_categories: &BTreeSet<String>) -> bool {
    allowed_categories.contains(category)
}

/// Restricts index entries to those a user may see.
#[derive(Debug, Clone, Copy)]
pub struct PermissionFilter<'a> {
    allowed: &'a BTreeSet<String>,
}

impl<'a> PermissionFilter<'a> {
    pub fn new(view: &'a UserPermissionView) -> Self {
        Self {
            allowed: &view.allowed_categories,
        }
    }

    /// Iterate the admissible entries of `entries`, keeping their order.
    pub fn eligible<'e>(
        &self,
        entries: &'e [ChunkRecord],
    ) -> impl Iterator<Item = (usize, &'e ChunkRecord)> + 'e
    where
        'a: 'e,
    {
        let allowed = self.allowed;
        entries
            .iter()
            .enumerate()
            .filter(move |(_, e)| is_allowed(e.category(), allowed))
    }
}
