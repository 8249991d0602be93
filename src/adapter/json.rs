//! Generic JSON dialect
//!
//! Transposes a JSON tree into the canonical model with a per-key dispatch
//! table: every node is a single-key object whose key names the element
//! kind, e.g. `{"package": {"name": "core", "children": [...]}}`. File
//! values may carry a `path` and a `lines` array of
//! `{"number", "hits", "covered", "total"}` records.

use serde_json::Value;

use super::ReportAdapter;
use crate::error::{CoverageError, Result};
use crate::model::CoverageElement;
use crate::tree::{CoverageTree, NodeId};

const KEY_TABLE: &[(&str, CoverageElement)] = &[
    ("report", CoverageElement::Report),
    ("group", CoverageElement::Group),
    ("package", CoverageElement::Package),
    ("file", CoverageElement::File),
    ("class", CoverageElement::Class),
    ("method", CoverageElement::Method),
    ("data", CoverageElement::Data),
    ("directory", CoverageElement::Directory),
    ("function", CoverageElement::Function),
];

fn element_for(key: &str) -> Option<CoverageElement> {
    KEY_TABLE.iter().find(|(k, _)| *k == key).map(|(_, e)| *e)
}

/// The single `(key, value)` pair of a node object, if it is one.
fn node_entry(value: &Value) -> Option<(&String, &Value)> {
    let map = value.as_object()?;
    if map.len() != 1 {
        return None;
    }
    map.iter().next()
}

pub struct JsonReportAdapter;

impl JsonReportAdapter {
    pub fn new() -> Self {
        JsonReportAdapter
    }

    fn fill(&self, tree: &mut CoverageTree, id: NodeId, value: &Value) -> Result<()> {
        // Line records belong to file nodes; anything else ignores them.
        if tree.node(id).element().is_file() {
            self.fill_lines(tree, id, value);
        }

        if let Some(children) = value.get("children").and_then(Value::as_array) {
            for child in children {
                let Some((key, body)) = node_entry(child) else {
                    tracing::warn!("json child is not a single-key node object, skipped");
                    continue;
                };
                let Some(element) = element_for(key) else {
                    tracing::warn!(key = %key, "unknown json node kind, skipped");
                    continue;
                };
                let name = body.get("name").and_then(Value::as_str).unwrap_or("");
                let child_id = tree.add_child(id, element, name);
                if element.is_file() {
                    let path = body.get("path").and_then(Value::as_str).unwrap_or(name);
                    tree.set_relative_path(child_id, path)?;
                }
                self.fill(tree, child_id, body)?;
            }
        }

        Ok(())
    }

    fn fill_lines(&self, tree: &mut CoverageTree, id: NodeId, value: &Value) {
        if let Some(lines) = value.get("lines").and_then(Value::as_array) {
            for entry in lines {
                let Some(number) = entry.get("number").and_then(Value::as_u64) else {
                    tracing::warn!("json line without a numeric 'number', skipped");
                    continue;
                };
                let Some(hits) = entry.get("hits").and_then(Value::as_u64) else {
                    tracing::warn!(line = number, "json line without numeric 'hits', skipped");
                    continue;
                };
                let covered = entry.get("covered").and_then(Value::as_u64).unwrap_or(0);
                let total = entry.get("total").and_then(Value::as_u64).unwrap_or(0);
                tree.paint(id, number as u32, hits as u32, covered as u32, total as u32);
            }
        }
    }
}

impl Default for JsonReportAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportAdapter for JsonReportAdapter {
    fn id(&self) -> &'static str {
        "json"
    }

    fn detect(&self, bytes: &[u8]) -> bool {
        let Ok(value) = serde_json::from_slice::<Value>(bytes) else {
            return false;
        };
        match node_entry(&value) {
            Some((key, _)) => element_for(key).map(|e| e.rank() == 0).unwrap_or(false),
            None => false,
        }
    }

    fn parse(&self, bytes: &[u8], label: &str) -> Result<CoverageTree> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| CoverageError::parse("json", e))?;
        let Some((key, body)) = node_entry(&value) else {
            return Err(CoverageError::parse("json", "expected a single-key root object"));
        };
        let element = element_for(key)
            .filter(|e| e.rank() == 0)
            .ok_or_else(|| CoverageError::parse("json", format!("unrecognized root key '{key}'")))?;

        let name = body
            .get("name")
            .and_then(Value::as_str)
            .filter(|n| !n.is_empty())
            .unwrap_or(label);
        let mut tree = CoverageTree::new(element, name);
        let root = tree.root();
        self.fill(&mut tree, root, body)?;
        Ok(tree)
    }
}
