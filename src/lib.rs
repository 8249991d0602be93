//! Covtree - canonical coverage model core
//!
//! A library for turning heterogeneous code-coverage reports into one
//! canonical hierarchical model with:
//! - Dialect adapters (Java-style XML, LLVM-style XML, generic JSON) behind
//!   a signature-checked registry
//! - Exact covered/total ratio arithmetic with bottom-up rollup
//! - Concurrent multi-report ingestion merged under a synthetic root
//! - Baseline diffing with trend classification and change-coverage views
//! - Run-length block compression of classified changed lines

pub mod adapter;
pub mod aggregate;
pub mod blocks;
pub mod config;
pub mod diff;
pub mod error;
pub mod ingest;
pub mod model;
pub mod ratio;
pub mod store;
pub mod tree;

pub use adapter::{AdapterRegistry, JavaXmlAdapter, JsonReportAdapter, LlvmXmlAdapter, ReportAdapter};
pub use blocks::{Block, LineClass};
pub use config::EngineConfig;
pub use diff::{ChangeSet, DiffEngine, FileDelta, MetricDelta, Tendency, TreeDelta};
pub use error::{CoverageError, Result};
pub use ingest::{ReportInput, ingest, parse_reports};
pub use model::{CoverageElement, CoverageMetric, LineRecord};
pub use ratio::Ratio;
pub use store::{BuildHistory, CoverageStore, MemoryStore, NodeSnapshot, PersistedTree};
pub use tree::{CoverageTree, Node, NodeId};
