//! Tree aggregation
//!
//! Combines independently parsed trees into one queryable forest under a
//! synthetic root. Ratio combination is associative and commutative, so the
//! order adapters finished in never changes the result.

use crate::error::Result;
use crate::model::CoverageElement;
use crate::tree::CoverageTree;

/// Merge parsed trees under one synthetic root.
///
/// A single input tree is reused as-is. Otherwise each input root becomes a
/// child of a fresh REPORT root and the structural metrics are recomputed as
/// the per-metric combine of the children. Fails with
/// [`crate::CoverageError::AmbiguousPath`] when two inputs claim the same
/// relative file path, since coverage could then not be attributed to either.
pub fn merge(trees: Vec<CoverageTree>) -> Result<CoverageTree> {
    let mut iter = trees.into_iter();
    let Some(first) = iter.next() else {
        return Ok(CoverageTree::new(CoverageElement::Report, "aggregate"));
    };
    let rest: Vec<CoverageTree> = iter.collect();
    if rest.is_empty() {
        return Ok(first);
    }

    let mut merged = CoverageTree::new(CoverageElement::Report, "aggregate");
    let root = merged.root();
    merged.graft(first, root)?;
    for tree in rest {
        merged.graft(tree, root)?;
    }
    merged.recompute_structural(root);
    tracing::debug!(
        children = merged.node(root).children().len(),
        "merged report trees under synthetic root"
    );
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoverageError;
    use crate::model::{CoverageElement, CoverageMetric};
    use crate::ratio::Ratio;

    fn report(name: &str, path: &str, hits: &[u32]) -> CoverageTree {
        let mut tree = CoverageTree::new(CoverageElement::Report, name);
        let pkg = tree.add_child(tree.root(), CoverageElement::Package, "pkg");
        let file = tree.add_child(pkg, CoverageElement::File, path);
        tree.set_relative_path(file, path).unwrap();
        for (i, h) in hits.iter().enumerate() {
            tree.paint(file, i as u32 + 1, *h, 0, 0);
        }
        tree
    }

    #[test]
    fn test_single_tree_reused() {
        let tree = report("only", "src/a.rs", &[1, 0]);
        let merged = merge(vec![tree]).unwrap();
        assert_eq!(merged.node(merged.root()).name(), "only");
        assert_eq!(
            merged.get_coverage(merged.root(), CoverageMetric::Line),
            Some(Ratio::new(1, 2))
        );
    }

    #[test]
    fn test_merge_combines_root_ratios() {
        let a = report("a", "src/a.rs", &[1, 1, 0]); // 2/3
        let b = report("b", "src/b.rs", &[1, 0]); // 1/2
        let merged = merge(vec![a, b]).unwrap();

        assert_eq!(
            merged.get_coverage(merged.root(), CoverageMetric::Line),
            Some(Ratio::new(3, 5))
        );
        assert_eq!(merged.node(merged.root()).children().len(), 2);
        assert!(merged.find_file("src/a.rs").is_some());
        assert!(merged.find_file("src/b.rs").is_some());
    }

    #[test]
    fn test_merge_order_is_irrelevant() {
        let forward = merge(vec![
            report("a", "src/a.rs", &[1, 1, 0]),
            report("b", "src/b.rs", &[1, 0]),
            report("c", "src/c.rs", &[0, 0, 0, 1]),
        ])
        .unwrap();
        let backward = merge(vec![
            report("c", "src/c.rs", &[0, 0, 0, 1]),
            report("b", "src/b.rs", &[1, 0]),
            report("a", "src/a.rs", &[1, 1, 0]),
        ])
        .unwrap();

        assert_eq!(
            forward.get_coverage(forward.root(), CoverageMetric::Line),
            backward.get_coverage(backward.root(), CoverageMetric::Line),
        );
    }

    #[test]
    fn test_merge_rejects_duplicate_paths() {
        let a = report("a", "src/a.rs", &[1]);
        let b = report("b", "src/a.rs", &[0]);
        let err = merge(vec![a, b]).unwrap_err();
        assert!(matches!(err, CoverageError::AmbiguousPath(_)));
    }

    #[test]
    fn test_merge_disambiguates_colliding_root_names() {
        let a = report("nightly", "src/a.rs", &[1]);
        let b = report("nightly", "src/b.rs", &[1]);
        let merged = merge(vec![a, b]).unwrap();
        let root = merged.root();
        let names: Vec<&str> = merged
            .node(root)
            .children()
            .iter()
            .map(|c| merged.node(*c).name())
            .collect();
        assert_eq!(names.len(), 2);
        assert_ne!(names[0], names[1]);
    }

    #[test]
    fn test_merge_empty_input() {
        let merged = merge(Vec::new()).unwrap();
        assert_eq!(merged.get_coverage(merged.root(), CoverageMetric::Line), None);
    }
}
