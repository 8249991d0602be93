//! Durable snapshot schema and storage collaborators
//!
//! Trees are persisted per build as a stable, serde-backed record: element
//! kind, name, optional relative path, metric map, line map, children.
//! Actual storage backends live outside this crate; the traits here are the
//! whole contract.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoverageError, Result};
use crate::model::{CoverageElement, CoverageMetric, LineRecord};
use crate::ratio::Ratio;
use crate::tree::{CoverageTree, NodeId};

/// Stable serialized form of one tree node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub element: CoverageElement,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relative_path: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metrics: BTreeMap<CoverageMetric, Ratio>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub lines: BTreeMap<u32, LineRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeSnapshot>,
}

/// A snapshot keyed by the build that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedTree {
    pub build_id: String,
    pub recorded_at: DateTime<Utc>,
    pub root: NodeSnapshot,
}

impl PersistedTree {
    pub fn new(build_id: &str, tree: &CoverageTree) -> Self {
        PersistedTree {
            build_id: build_id.to_string(),
            recorded_at: Utc::now(),
            root: snapshot(tree),
        }
    }
}

/// Serialize a tree into its durable form.
pub fn snapshot(tree: &CoverageTree) -> NodeSnapshot {
    snapshot_node(tree, tree.root())
}

fn snapshot_node(tree: &CoverageTree, id: NodeId) -> NodeSnapshot {
    let node = tree.node(id);
    NodeSnapshot {
        element: node.element(),
        name: node.name().to_string(),
        relative_path: node.relative_path().map(String::from),
        metrics: node.metrics().clone(),
        lines: node.lines().clone(),
        children: node
            .children()
            .iter()
            .map(|child| snapshot_node(tree, *child))
            .collect(),
    }
}

/// Rebuild a tree from its durable form. Path uniqueness is re-enforced, so
/// a tampered or hand-built snapshot with duplicate relative paths fails
/// with [`CoverageError::AmbiguousPath`].
pub fn restore(snapshot: &NodeSnapshot) -> Result<CoverageTree> {
    let mut tree = CoverageTree::new(snapshot.element, &snapshot.name);
    let root = tree.root();
    restore_into(&mut tree, root, snapshot)?;
    Ok(tree)
}

fn restore_into(tree: &mut CoverageTree, id: NodeId, snapshot: &NodeSnapshot) -> Result<()> {
    if let Some(path) = &snapshot.relative_path {
        tree.set_relative_path(id, path)?;
    }
    tree.set_metrics_raw(id, snapshot.metrics.clone());
    tree.set_lines_raw(id, snapshot.lines.clone());
    for child in &snapshot.children {
        let child_id = tree.add_child(id, child.element, &child.name);
        restore_into(tree, child_id, child)?;
    }
    Ok(())
}

pub fn to_json(snapshot: &NodeSnapshot) -> Result<String> {
    serde_json::to_string(snapshot).map_err(|e| CoverageError::parse("snapshot", e))
}

pub fn from_json(json: &str) -> Result<CoverageTree> {
    let snapshot: NodeSnapshot =
        serde_json::from_str(json).map_err(|e| CoverageError::parse("snapshot", e))?;
    restore(&snapshot)
}

/// Per-build persistence collaborator.
pub trait CoverageStore: Send + Sync {
    fn save(&self, record: &PersistedTree) -> anyhow::Result<()>;
    fn load(&self, build_id: &str) -> anyhow::Result<Option<PersistedTree>>;
}

/// Build-history collaborator consulted by the diff engine when searching
/// for a reference tree.
pub trait BuildHistory: Send + Sync {
    fn load_tree(&self, build_id: &str) -> anyhow::Result<Option<NodeSnapshot>>;
}

/// Persist a build's tree through a storage collaborator.
pub fn save_build(store: &dyn CoverageStore, build_id: &str, tree: &CoverageTree) -> Result<()> {
    store
        .save(&PersistedTree::new(build_id, tree))
        .map_err(CoverageError::Storage)
}

/// Load and restore a build's tree, if the collaborator has one.
pub fn load_build(store: &dyn CoverageStore, build_id: &str) -> Result<Option<CoverageTree>> {
    let record = store.load(build_id).map_err(CoverageError::Storage)?;
    record.map(|r| restore(&r.root)).transpose()
}

/// In-memory reference implementation of both collaborators.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, PersistedTree>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CoverageStore for MemoryStore {
    fn save(&self, record: &PersistedTree) -> anyhow::Result<()> {
        self.records
            .lock()
            .expect("store lock poisoned")
            .insert(record.build_id.clone(), record.clone());
        Ok(())
    }

    fn load(&self, build_id: &str) -> anyhow::Result<Option<PersistedTree>> {
        Ok(self
            .records
            .lock()
            .expect("store lock poisoned")
            .get(build_id)
            .cloned())
    }
}

impl BuildHistory for MemoryStore {
    fn load_tree(&self, build_id: &str) -> anyhow::Result<Option<NodeSnapshot>> {
        Ok(self.load(build_id)?.map(|record| record.root))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CoverageMetric;

    fn sample_tree() -> CoverageTree {
        let mut tree = CoverageTree::new(CoverageElement::Report, "report");
        let pkg = tree.add_child(tree.root(), CoverageElement::Package, "core");
        let file = tree.add_child(pkg, CoverageElement::File, "a.rs");
        tree.set_relative_path(file, "src/a.rs").unwrap();
        tree.paint(file, 1, 2, 0, 0);
        tree.paint(file, 2, 0, 1, 2);
        tree
    }

    #[test]
    fn test_snapshot_restore_round_trip() {
        let tree = sample_tree();
        let restored = restore(&snapshot(&tree)).unwrap();

        assert_eq!(
            restored.get_coverage(restored.root(), CoverageMetric::Line),
            tree.get_coverage(tree.root(), CoverageMetric::Line)
        );
        let file = restored.find_file("src/a.rs").unwrap();
        assert_eq!(restored.node(file).lines().len(), 2);
        assert_eq!(restored.node_path(file), "report/core/a.rs");
    }

    #[test]
    fn test_json_round_trip() {
        let tree = sample_tree();
        let json = to_json(&snapshot(&tree)).unwrap();
        let restored = from_json(&json).unwrap();
        assert_eq!(
            restored.get_coverage(restored.root(), CoverageMetric::Branch),
            Some(Ratio::new(1, 2))
        );
    }

    #[test]
    fn test_restore_rejects_duplicate_paths() {
        let dup = NodeSnapshot {
            element: CoverageElement::Report,
            name: "r".into(),
            relative_path: None,
            metrics: BTreeMap::new(),
            lines: BTreeMap::new(),
            children: vec![
                NodeSnapshot {
                    element: CoverageElement::File,
                    name: "a".into(),
                    relative_path: Some("src/a.rs".into()),
                    metrics: BTreeMap::new(),
                    lines: BTreeMap::new(),
                    children: Vec::new(),
                },
                NodeSnapshot {
                    element: CoverageElement::File,
                    name: "b".into(),
                    relative_path: Some("src/a.rs".into()),
                    metrics: BTreeMap::new(),
                    lines: BTreeMap::new(),
                    children: Vec::new(),
                },
            ],
        };
        let err = restore(&dup).unwrap_err();
        assert!(matches!(err, CoverageError::AmbiguousPath(_)));
    }

    #[test]
    fn test_save_and_load_build() {
        let store = MemoryStore::new();
        let tree = sample_tree();
        save_build(&store, "build-1", &tree).unwrap();

        let loaded = load_build(&store, "build-1").unwrap().unwrap();
        assert_eq!(
            loaded.get_coverage(loaded.root(), CoverageMetric::Line),
            tree.get_coverage(tree.root(), CoverageMetric::Line)
        );
        assert!(load_build(&store, "build-2").unwrap().is_none());
    }

    struct BrokenStore;

    impl CoverageStore for BrokenStore {
        fn save(&self, _record: &PersistedTree) -> anyhow::Result<()> {
            anyhow::bail!("disk full")
        }

        fn load(&self, _build_id: &str) -> anyhow::Result<Option<PersistedTree>> {
            anyhow::bail!("disk full")
        }
    }

    #[test]
    fn test_collaborator_failures_surface_as_storage_errors() {
        let err = save_build(&BrokenStore, "b", &sample_tree()).unwrap_err();
        assert!(matches!(err, CoverageError::Storage(_)));
        let err = load_build(&BrokenStore, "b").unwrap_err();
        assert!(matches!(err, CoverageError::Storage(_)));
    }

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryStore::new();
        let tree = sample_tree();
        store.save(&PersistedTree::new("build-7", &tree)).unwrap();

        let loaded = store.load("build-7").unwrap().unwrap();
        assert_eq!(loaded.build_id, "build-7");
        assert!(store.load("build-8").unwrap().is_none());

        let snapshot = store.load_tree("build-7").unwrap().unwrap();
        let restored = restore(&snapshot).unwrap();
        assert!(restored.find_file("src/a.rs").is_some());
    }
}
