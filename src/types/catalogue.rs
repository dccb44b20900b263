//! Catalogue Types
//!
//! The catalogue is the hierarchical documentation plan produced before any
//! content is generated. Synthesis yields a [`CatalogueOutline`]; the
//! planning phase flattens it into [`PendingItem`]s consumed by the
//! orchestrator.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{DocError, Result};

// =============================================================================
// Outline
// =============================================================================

/// One node of the synthesized documentation plan
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutlineNode {
    /// Stable slug used for paths and item identity
    pub name: String,
    /// Human-readable section title
    pub title: String,
    /// Authoring instruction handed to the generation agent
    #[serde(alias = "prompt")]
    pub authoring_prompt: String,
    /// Nested sections; absent or non-empty, never empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<OutlineNode>>,
}

/// A validated hierarchical documentation outline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogueOutline {
    pub items: Vec<OutlineNode>,
}

impl CatalogueOutline {
    /// Validate the structural invariants: a non-empty root sequence where
    /// every node carries a non-empty name, title, and authoring prompt, and
    /// children (if present) are non-empty and recursively valid.
    pub fn validate(&self) -> Result<()> {
        if self.items.is_empty() {
            return Err(DocError::OutlineInvalid("outline has no items".into()));
        }
        for node in &self.items {
            Self::validate_node(node, node.name.as_str())?;
        }
        Ok(())
    }

    fn validate_node(node: &OutlineNode, path: &str) -> Result<()> {
        if node.name.trim().is_empty() {
            return Err(DocError::OutlineInvalid(format!(
                "node at '{path}' has an empty name"
            )));
        }
        if node.title.trim().is_empty() {
            return Err(DocError::OutlineInvalid(format!(
                "node '{path}' has an empty title"
            )));
        }
        if node.authoring_prompt.trim().is_empty() {
            return Err(DocError::OutlineInvalid(format!(
                "node '{path}' has an empty authoring prompt"
            )));
        }
        if let Some(children) = &node.children {
            if children.is_empty() {
                return Err(DocError::OutlineInvalid(format!(
                    "node '{path}' has an empty children array"
                )));
            }
            for child in children {
                Self::validate_node(child, &format!("{path}/{}", child.name))?;
            }
        }
        Ok(())
    }

    /// Flatten the outline into pending items, depth-first, preserving order.
    pub fn to_pending_items(&self, scope: &str) -> Vec<PendingItem> {
        let mut items = Vec::new();
        for (idx, node) in self.items.iter().enumerate() {
            Self::collect(node, scope, None, idx as i64, &mut items);
        }
        items
    }

    fn collect(
        node: &OutlineNode,
        scope: &str,
        parent_id: Option<Uuid>,
        order: i64,
        out: &mut Vec<PendingItem>,
    ) {
        let item = PendingItem {
            id: Uuid::new_v4(),
            scope: scope.to_string(),
            name: node.name.clone(),
            title: node.title.clone(),
            authoring_prompt: node.authoring_prompt.clone(),
            parent_id,
            order,
            completed: false,
        };
        let id = item.id;
        out.push(item);
        if let Some(children) = &node.children {
            for (idx, child) in children.iter().enumerate() {
                Self::collect(child, scope, Some(id), idx as i64, out);
            }
        }
    }
}

// =============================================================================
// Pending Item
// =============================================================================

/// A planned documentation section awaiting generated content.
///
/// Created once by the planning phase and consumed exactly once by the
/// orchestrator; the only mutation is flipping `completed` on success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingItem {
    pub id: Uuid,
    /// Catalogue scope (one scope per repository run)
    pub scope: String,
    pub name: String,
    pub title: String,
    pub authoring_prompt: String,
    pub parent_id: Option<Uuid>,
    /// Ordering among siblings
    pub order: i64,
    pub completed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str, children: Option<Vec<OutlineNode>>) -> OutlineNode {
        OutlineNode {
            name: name.to_string(),
            title: format!("{name} title"),
            authoring_prompt: format!("write about {name}"),
            children,
        }
    }

    #[test]
    fn test_empty_outline_invalid() {
        let outline = CatalogueOutline { items: vec![] };
        assert!(outline.validate().is_err());
    }

    #[test]
    fn test_missing_title_invalid() {
        let mut bad = node("overview", None);
        bad.title = "  ".to_string();
        let outline = CatalogueOutline { items: vec![bad] };
        assert!(outline.validate().is_err());
    }

    #[test]
    fn test_missing_prompt_in_child_invalid() {
        let mut child = node("internals", None);
        child.authoring_prompt = String::new();
        let outline = CatalogueOutline {
            items: vec![node("arch", Some(vec![child]))],
        };
        assert!(outline.validate().is_err());
    }

    #[test]
    fn test_empty_children_array_invalid() {
        let outline = CatalogueOutline {
            items: vec![node("arch", Some(vec![]))],
        };
        assert!(outline.validate().is_err());
    }

    #[test]
    fn test_deep_nesting_valid() {
        let deep = node(
            "l1",
            Some(vec![node(
                "l2",
                Some(vec![node("l3", Some(vec![node("l4", None)]))]),
            )]),
        );
        let outline = CatalogueOutline {
            items: vec![deep, node("sibling", None)],
        };
        assert!(outline.validate().is_ok());
    }

    #[test]
    fn test_flatten_preserves_parentage() {
        let outline = CatalogueOutline {
            items: vec![node("a", Some(vec![node("a1", None), node("a2", None)]))],
        };
        let items = outline.to_pending_items("run-1");
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].parent_id, None);
        assert_eq!(items[1].parent_id, Some(items[0].id));
        assert_eq!(items[2].parent_id, Some(items[0].id));
        assert_eq!(items[1].order, 0);
        assert_eq!(items[2].order, 1);
        assert!(items.iter().all(|i| !i.completed));
    }

    #[test]
    fn test_prompt_alias_deserializes() {
        let json = r#"{"items":[{"name":"a","title":"A","prompt":"p"}]}"#;
        let outline: CatalogueOutline = serde_json::from_str(json).unwrap();
        assert_eq!(outline.items[0].authoring_prompt, "p");
    }
}
