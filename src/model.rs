//! Core model definitions
//!
//! Structural node kinds, measured metric kinds, and the per-line record
//! stored on file nodes.

use serde::{Deserialize, Serialize};

/// Structural kind of a tree node.
///
/// Java-style dialects produce report/group/package/file/class/method;
/// LLVM-style dialects produce data/directory/file/function. Both share the
/// FILE kind, which is where line records live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverageElement {
    Report,
    Group,
    Package,
    File,
    Class,
    Method,
    Data,
    Directory,
    Function,
}

impl CoverageElement {
    /// Fixed aggregation rank, coarse to fine. Used for ordering and for
    /// deciding which nodes are pure rollups of their children.
    pub fn rank(&self) -> u8 {
        match self {
            CoverageElement::Report | CoverageElement::Data => 0,
            CoverageElement::Group => 1,
            CoverageElement::Package | CoverageElement::Directory => 2,
            CoverageElement::File => 3,
            CoverageElement::Class => 4,
            CoverageElement::Method | CoverageElement::Function => 5,
        }
    }

    /// Structural nodes carry no data of their own; their metrics are the
    /// combine of their children's.
    pub fn is_structural(&self) -> bool {
        self.rank() <= CoverageElement::Package.rank()
    }

    /// File nodes are the paint targets: line records attach here.
    pub fn is_file(&self) -> bool {
        matches!(self, CoverageElement::File)
    }

    pub fn label(&self) -> &'static str {
        match self {
            CoverageElement::Report => "report",
            CoverageElement::Group => "group",
            CoverageElement::Package => "package",
            CoverageElement::File => "file",
            CoverageElement::Class => "class",
            CoverageElement::Method => "method",
            CoverageElement::Data => "data",
            CoverageElement::Directory => "directory",
            CoverageElement::Function => "function",
        }
    }
}

/// Measured dimension, each carrying its own [`crate::Ratio`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverageMetric {
    Line,
    Branch,
    Instruction,
    Method,
    Class,
    File,
    Package,
    Module,
}

impl CoverageMetric {
    pub fn label(&self) -> &'static str {
        match self {
            CoverageMetric::Line => "line",
            CoverageMetric::Branch => "branch",
            CoverageMetric::Instruction => "instruction",
            CoverageMetric::Method => "method",
            CoverageMetric::Class => "class",
            CoverageMetric::File => "file",
            CoverageMetric::Package => "package",
            CoverageMetric::Module => "module",
        }
    }
}

/// Execution record for one source line of a file node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LineRecord {
    pub hits: u32,
    pub branch_covered: u32,
    pub branch_total: u32,
}

impl LineRecord {
    pub fn is_hit(&self) -> bool {
        self.hits > 0
    }

    /// A line with branches where some but not all were taken.
    pub fn is_partial(&self) -> bool {
        self.branch_total > 0 && self.branch_covered < self.branch_total
    }
}
