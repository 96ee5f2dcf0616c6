//! Core authorization types

use crate::error::{AuthzError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Item name (unique across roles and permissions)
pub type ItemName = String;

/// Opaque principal identifier (e.g. a user id)
pub type PrincipalId = String;

/// Parameter bag passed unmodified to every business rule on a path
pub type Params = serde_json::Map<String, serde_json::Value>;

/// Kind of an authorization item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    /// May contain other roles and permissions
    Role,
    /// An action that may be granted
    Permission,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Role => "role",
            ItemKind::Permission => "permission",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ItemKind {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "role" => Ok(ItemKind::Role),
            "permission" => Ok(ItemKind::Permission),
            other => Err(AuthzError::InvalidInput(format!(
                "unknown item kind '{}' (expected 'role' or 'permission')",
                other
            ))),
        }
    }
}

/// Node of the authorization graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Unique item name (e.g., "editor", "create_post")
    pub name: ItemName,

    /// Role or permission
    pub kind: ItemKind,

    /// Human readable description
    #[serde(default)]
    pub description: String,

    /// Display order used when listing items
    #[serde(default)]
    pub order: i32,

    /// Registered business rule kind gating this item
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
}

impl Item {
    /// Create a new item
    pub fn new(name: impl Into<String>, kind: ItemKind) -> Self {
        Self {
            name: name.into(),
            kind,
            description: String::new(),
            order: 0,
            rule: None,
        }
    }

    /// Create a new role
    pub fn role(name: impl Into<String>) -> Self {
        Self::new(name, ItemKind::Role)
    }

    /// Create a new permission
    pub fn permission(name: impl Into<String>) -> Self {
        Self::new(name, ItemKind::Permission)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    /// Gate this item with a registered business rule
    pub fn with_rule(mut self, rule: impl Into<String>) -> Self {
        self.rule = Some(rule.into());
        self
    }

    pub fn is_role(&self) -> bool {
        self.kind == ItemKind::Role
    }

    /// Validate the item definition
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AuthzError::InvalidInput(
                "Item name cannot be empty".to_string(),
            ));
        }

        if let Some(rule) = &self.rule {
            if rule.trim().is_empty() {
                return Err(AuthzError::InvalidInput(format!(
                    "Item '{}' has an empty rule reference",
                    self.name
                )));
            }
        }

        Ok(())
    }
}

/// Partial update of an item; the name and kind are immutable
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i32>,

    /// `Some(None)` clears the rule
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<Option<String>>,
}

impl ItemPatch {
    pub fn apply_to(&self, item: &mut Item) {
        if let Some(description) = &self.description {
            item.description = description.clone();
        }
        if let Some(order) = self.order {
            item.order = order;
        }
        if let Some(rule) = &self.rule {
            item.rule = rule.clone();
        }
    }
}
