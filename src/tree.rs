//! Canonical coverage tree
//!
//! Arena-backed node hierarchy with metric bookkeeping and the structural
//! transforms (package splitting, group stripping, tree grafting). Nodes are
//! addressed by [`NodeId`]; the arena owns every node, and parent links are
//! plain indices, so path reconstruction never needs shared ownership.

use std::collections::{BTreeMap, HashMap};

use crate::error::{CoverageError, Result};
use crate::model::{CoverageElement, CoverageMetric, LineRecord};
use crate::ratio::Ratio;

/// Index of a node inside its owning [`CoverageTree`].
///
/// Ids are only meaningful for the tree that produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// One node of the hierarchy.
#[derive(Debug, Clone)]
pub struct Node {
    element: CoverageElement,
    name: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    metrics: BTreeMap<CoverageMetric, Ratio>,
    lines: BTreeMap<u32, LineRecord>,
    relative_path: Option<String>,
}

impl Node {
    fn new(element: CoverageElement, name: &str, parent: Option<NodeId>) -> Self {
        Node {
            element,
            name: name.to_string(),
            parent,
            children: Vec::new(),
            metrics: BTreeMap::new(),
            lines: BTreeMap::new(),
            relative_path: None,
        }
    }

    pub fn element(&self) -> CoverageElement {
        self.element
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn metrics(&self) -> &BTreeMap<CoverageMetric, Ratio> {
        &self.metrics
    }

    pub fn metric(&self, metric: CoverageMetric) -> Option<Ratio> {
        self.metrics.get(&metric).copied()
    }

    pub fn lines(&self) -> &BTreeMap<u32, LineRecord> {
        &self.lines
    }

    pub fn relative_path(&self) -> Option<&str> {
        self.relative_path.as_deref()
    }

    /// First and last painted line, if any line was painted.
    pub fn line_extent(&self) -> Option<(u32, u32)> {
        let first = *self.lines.keys().next()?;
        let last = *self.lines.keys().next_back()?;
        Some((first, last))
    }
}

/// The canonical hierarchy for one parsed report (or a merged forest).
#[derive(Debug, Clone)]
pub struct CoverageTree {
    nodes: Vec<Node>,
    root: NodeId,
    paths: HashMap<String, NodeId>,
}

impl CoverageTree {
    pub fn new(element: CoverageElement, name: &str) -> Self {
        CoverageTree {
            nodes: vec![Node::new(element, name, None)],
            root: NodeId(0),
            paths: HashMap::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Find or create a child. Sibling names are unique: re-adding an
    /// existing name returns the existing child. Insertion order is kept
    /// for display; aggregation does not depend on it.
    pub fn add_child(&mut self, parent: NodeId, element: CoverageElement, name: &str) -> NodeId {
        if let Some(existing) = self.child_by_name(parent, name) {
            return existing;
        }
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node::new(element, name, Some(parent)));
        self.nodes[parent.index()].children.push(id);
        id
    }

    pub fn child_by_name(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.nodes[parent.index()]
            .children
            .iter()
            .copied()
            .find(|c| self.nodes[c.index()].name == name)
    }

    /// Register the relative source path of a file node. The path must be
    /// unique across the whole tree: later diffing keys on it.
    pub fn set_relative_path(&mut self, id: NodeId, path: &str) -> Result<()> {
        match self.paths.get(path) {
            Some(owner) if *owner != id => {
                Err(CoverageError::AmbiguousPath(path.to_string()))
            }
            Some(_) => Ok(()),
            None => {
                self.nodes[id.index()].relative_path = Some(path.to_string());
                self.paths.insert(path.to_string(), id);
                Ok(())
            }
        }
    }

    pub fn find_file(&self, path: &str) -> Option<NodeId> {
        self.paths.get(path).copied()
    }

    /// Relative path to file-node index for the whole tree.
    pub fn file_index(&self) -> &HashMap<String, NodeId> {
        &self.paths
    }

    /// Merge `ratio` into the node's metric and propagate the same merge up
    /// every ancestor to the root.
    pub fn update_metric(&mut self, id: NodeId, metric: CoverageMetric, ratio: Ratio) {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let node = &mut self.nodes[current.index()];
            let entry = node.metrics.entry(metric).or_insert(Ratio::ZERO);
            *entry = entry.combine(ratio);
            cursor = node.parent;
        }
    }

    pub fn get_coverage(&self, id: NodeId, metric: CoverageMetric) -> Option<Ratio> {
        self.nodes[id.index()].metrics.get(&metric).copied()
    }

    /// Record the execution state of one source line on a file node and
    /// roll its LINE (and BRANCH, when branch data is present) contribution
    /// up the ancestor chain.
    ///
    /// Painting is idempotent per (node, line): repainting the identical
    /// record is a no-op, and a differing record replaces the previous
    /// contribution instead of adding to it. Report dialects that repeat the
    /// same physical line under class and method elements therefore cannot
    /// double-count.
    pub fn paint(
        &mut self,
        file: NodeId,
        line: u32,
        hits: u32,
        branch_covered: u32,
        branch_total: u32,
    ) {
        let record = LineRecord {
            hits,
            branch_covered: branch_covered.min(branch_total),
            branch_total,
        };
        let previous = self.nodes[file.index()].lines.insert(line, record);
        if previous == Some(record) {
            return;
        }

        let (old_covered, old_total) = match previous {
            Some(prev) => (i64::from(prev.is_hit()), 1),
            None => (0, 0),
        };
        self.apply_delta(
            file,
            CoverageMetric::Line,
            i64::from(record.is_hit()) - old_covered,
            1 - old_total,
        );

        let (old_bc, old_bt) = match previous {
            Some(prev) => (i64::from(prev.branch_covered), i64::from(prev.branch_total)),
            None => (0, 0),
        };
        if record.branch_total > 0 || old_bt > 0 {
            self.apply_delta(
                file,
                CoverageMetric::Branch,
                i64::from(record.branch_covered) - old_bc,
                i64::from(record.branch_total) - old_bt,
            );
        }
    }

    fn apply_delta(&mut self, start: NodeId, metric: CoverageMetric, d_num: i64, d_den: i64) {
        if d_num == 0 && d_den == 0 {
            return;
        }
        let mut cursor = Some(start);
        while let Some(current) = cursor {
            let node = &mut self.nodes[current.index()];
            let entry = node.metrics.entry(metric).or_insert(Ratio::ZERO);
            entry.numerator = add_signed(entry.numerator, d_num);
            entry.denominator = add_signed(entry.denominator, d_den);
            cursor = node.parent;
        }
    }

    /// Rewrite dot-delimited PACKAGE children of the root (`"a.b.c"`) into
    /// nested package chains, merging chains that share prefixes. Structural
    /// metrics are recomputed bottom-up afterwards, so every aggregated
    /// ratio round-trips exactly.
    pub fn split_packages(&mut self) {
        let root = self.root;
        let dotted: Vec<NodeId> = self.nodes[root.index()]
            .children
            .iter()
            .copied()
            .filter(|id| {
                let node = &self.nodes[id.index()];
                node.element == CoverageElement::Package && node.name.contains('.')
            })
            .collect();
        if dotted.is_empty() {
            return;
        }

        for id in dotted {
            let full = self.nodes[id.index()].name.clone();
            let mut segments: Vec<String> =
                full.split('.').filter(|s| !s.is_empty()).map(String::from).collect();
            if segments.len() <= 1 {
                continue;
            }
            self.detach(root, id);
            let leaf = segments.pop().unwrap();

            let mut parent = root;
            for segment in &segments {
                parent = self.add_child(parent, CoverageElement::Package, segment);
            }

            match self.child_by_name(parent, &leaf) {
                Some(existing) => {
                    // Same package produced by two chains: adopt the children,
                    // the leftover node becomes unreachable.
                    let adopted = std::mem::take(&mut self.nodes[id.index()].children);
                    for child in adopted {
                        self.nodes[child.index()].parent = Some(existing);
                        self.nodes[existing.index()].children.push(child);
                    }
                }
                None => {
                    self.nodes[id.index()].name = leaf;
                    self.nodes[id.index()].parent = Some(parent);
                    self.nodes[parent.index()].children.push(id);
                }
            }
        }

        self.recompute_structural(root);
    }

    /// Inverse of [`split_packages`](Self::split_packages): chains of
    /// single-child packages fold back into one dotted package name.
    pub fn collapse_packages(&mut self) {
        for child in self.nodes[self.root.index()].children.clone() {
            self.collapse_node(child);
        }
    }

    fn collapse_node(&mut self, id: NodeId) {
        while self.nodes[id.index()].element == CoverageElement::Package {
            let children = &self.nodes[id.index()].children;
            if children.len() != 1 {
                break;
            }
            let only = children[0];
            if self.nodes[only.index()].element != CoverageElement::Package {
                break;
            }
            let absorbed_name = self.nodes[only.index()].name.clone();
            let absorbed_metrics = self.nodes[only.index()].metrics.clone();
            let grandchildren = std::mem::take(&mut self.nodes[only.index()].children);
            for g in &grandchildren {
                self.nodes[g.index()].parent = Some(id);
            }
            let node = &mut self.nodes[id.index()];
            node.name = format!("{}.{}", node.name, absorbed_name);
            node.children = grandchildren;
            node.metrics = absorbed_metrics;
        }
        for child in self.nodes[id.index()].children.clone() {
            self.collapse_node(child);
        }
    }

    /// If the root has exactly one GROUP child, that child becomes the new
    /// root. Ratios are untouched.
    pub fn strip_group(&mut self) {
        let children = &self.nodes[self.root.index()].children;
        if children.len() != 1 {
            return;
        }
        let only = children[0];
        if self.nodes[only.index()].element == CoverageElement::Group {
            self.nodes[only.index()].parent = None;
            self.root = only;
        }
    }

    /// Adopt another tree's nodes under `under`. Fails with
    /// [`CoverageError::AmbiguousPath`] if any relative path exists in both
    /// trees; on success the grafted root keeps its name unless a sibling
    /// already uses it, in which case a numeric suffix is appended.
    pub fn graft(&mut self, other: CoverageTree, under: NodeId) -> Result<NodeId> {
        for path in other.paths.keys() {
            if self.paths.contains_key(path) {
                return Err(CoverageError::AmbiguousPath(path.clone()));
            }
        }

        let offset = self.nodes.len() as u32;
        let remap = |id: NodeId| NodeId(id.0 + offset);
        for mut node in other.nodes {
            node.parent = node.parent.map(remap);
            for child in &mut node.children {
                *child = remap(*child);
            }
            self.nodes.push(node);
        }

        let grafted = remap(other.root);
        let base = self.nodes[grafted.index()].name.clone();
        let mut name = base.clone();
        let mut n = 2;
        while self.child_by_name(under, &name).is_some() {
            tracing::debug!(root = %base, "grafted root name collision, renaming");
            name = format!("{} #{}", base, n);
            n += 1;
        }
        self.nodes[grafted.index()].name = name;
        self.nodes[grafted.index()].parent = Some(under);
        self.nodes[under.index()].children.push(grafted);

        for (path, id) in other.paths {
            self.paths.insert(path, remap(id));
        }

        Ok(grafted)
    }

    /// Recompute the metrics of structural nodes (report, group, package,
    /// directory, data) as the per-metric combine of their children,
    /// post-order. Leaf-held data (file lines, class/method ratios) is the
    /// ground truth and is never touched.
    pub fn recompute_structural(&mut self, id: NodeId) {
        for child in self.nodes[id.index()].children.clone() {
            self.recompute_structural(child);
        }
        let node = &self.nodes[id.index()];
        if node.children.is_empty() || !node.element.is_structural() {
            return;
        }
        let mut rolled: BTreeMap<CoverageMetric, Ratio> = BTreeMap::new();
        for child in self.nodes[id.index()].children.clone() {
            for (metric, ratio) in &self.nodes[child.index()].metrics {
                let entry = rolled.entry(*metric).or_insert(Ratio::ZERO);
                *entry = entry.combine(*ratio);
            }
        }
        self.nodes[id.index()].metrics = rolled;
    }

    /// Preorder walk of every node reachable from the root.
    pub fn descendants(&self) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            out.push(id);
            for child in self.nodes[id.index()].children.iter().rev() {
                stack.push(*child);
            }
        }
        out
    }

    /// Full slash-joined path of names from the root to `id`.
    pub fn node_path(&self, id: NodeId) -> String {
        let mut parts = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            parts.push(self.nodes[current.index()].name.clone());
            cursor = self.nodes[current.index()].parent;
        }
        parts.reverse();
        parts.join("/")
    }

    fn detach(&mut self, parent: NodeId, child: NodeId) {
        let children = &mut self.nodes[parent.index()].children;
        if let Some(pos) = children.iter().position(|c| *c == child) {
            children.remove(pos);
        }
        self.nodes[child.index()].parent = None;
    }

    /// Snapshot restore only: install stored metrics without propagation.
    pub(crate) fn set_metrics_raw(
        &mut self,
        id: NodeId,
        metrics: BTreeMap<CoverageMetric, Ratio>,
    ) {
        self.nodes[id.index()].metrics = metrics;
    }

    /// Snapshot restore only: install stored line records without repainting.
    pub(crate) fn set_lines_raw(&mut self, id: NodeId, lines: BTreeMap<u32, LineRecord>) {
        self.nodes[id.index()].lines = lines;
    }
}

fn add_signed(base: u64, delta: i64) -> u64 {
    if delta >= 0 {
        base + delta as u64
    } else {
        base.saturating_sub(delta.unsigned_abs())
    }
}
