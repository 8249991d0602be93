//! Baseline diff engine
//!
//! Matches two trees by file relative path, computes per-metric percentage
//! deltas with a trend classification, restricts results to externally
//! supplied changed-line ranges, and reports indirect coverage changes
//! separately. Delta results for a (reference, current) build pair are kept
//! in a bounded LRU cache keyed by a digest of the two refs.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::blocks::{self, Block};
use crate::config::{BaselineConfig, CacheConfig, EngineConfig};
use crate::model::{CoverageMetric, LineRecord};
use crate::ratio::Ratio;
use crate::store::{self, BuildHistory};
use crate::tree::CoverageTree;

/// Direction of a coverage change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tendency {
    Increased,
    Decreased,
    Equals,
    /// Undefined: the file is missing on one side, or either ratio is unset.
    Na,
}

impl Tendency {
    fn from_delta(delta: Option<f64>) -> Self {
        match delta {
            None => Tendency::Na,
            Some(d) if d > 0.0 => Tendency::Increased,
            Some(d) if d < 0.0 => Tendency::Decreased,
            Some(_) => Tendency::Equals,
        }
    }
}

/// Delta of one metric on one matched file pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricDelta {
    pub metric: CoverageMetric,
    pub current: Option<Ratio>,
    pub reference: Option<Ratio>,
    /// Current percentage minus reference percentage; `None` when either
    /// side is missing or unset.
    pub delta: Option<f64>,
    pub tendency: Tendency,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDelta {
    pub path: String,
    pub metrics: Vec<MetricDelta>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeDelta {
    /// False when no reference build could be found in time; every tendency
    /// is then [`Tendency::Na`].
    pub has_baseline: bool,
    pub files: Vec<FileDelta>,
}

/// Changed line ranges per file, handed in by the VCS-diff collaborator.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    ranges: HashMap<String, Vec<LineRange>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRange {
    pub start: u32,
    pub end: u32,
}

impl LineRange {
    pub fn contains(&self, line: u32) -> bool {
        self.start <= line && line <= self.end
    }

    fn overlaps(&self, lo: u32, hi: u32) -> bool {
        self.start <= hi && self.end >= lo
    }
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, path: &str, start: u32, end: u32) {
        self.ranges
            .entry(path.to_string())
            .or_default()
            .push(LineRange { start, end });
    }

    pub fn ranges_for(&self, path: &str) -> &[LineRange] {
        self.ranges.get(path).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, path: &str, line: u32) -> bool {
        self.ranges_for(path).iter().any(|r| r.contains(line))
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

/// Change-coverage view of one file: classification of its changed
/// instrumented lines, compressed into display blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub covered: Vec<u32>,
    pub missed: Vec<u32>,
    pub partial: Vec<u32>,
    /// Hit changed lines over all changed instrumented lines.
    pub ratio: Ratio,
    pub blocks: Vec<Block>,
}

/// A coverage shift on a line that was not itself edited. Reported apart
/// from change coverage, never merged into it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndirectChange {
    pub path: String,
    pub line: u32,
    pub reference: Option<LineRecord>,
    pub current: LineRecord,
}

pub struct DiffEngine {
    baseline: BaselineConfig,
    cache: DiffCache,
}

impl DiffEngine {
    pub fn new(config: &EngineConfig) -> Self {
        DiffEngine {
            baseline: config.baseline.clone(),
            cache: DiffCache::new(&config.diff_cache),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(&EngineConfig::default())
    }

    /// Compare `current` against a reference tree. Neither tree is mutated;
    /// the result is an independent delta structure.
    pub fn diff(&self, current: &CoverageTree, reference: &CoverageTree) -> TreeDelta {
        let mut paths: Vec<&String> = current
            .file_index()
            .keys()
            .chain(reference.file_index().keys())
            .collect();
        paths.sort();
        paths.dedup();

        let files = paths
            .into_iter()
            .map(|path| {
                let cur = current.find_file(path).map(|id| current.node(id));
                let refn = reference.find_file(path).map(|id| reference.node(id));

                let mut metrics: BTreeSet<CoverageMetric> = BTreeSet::new();
                if let Some(node) = cur {
                    metrics.extend(node.metrics().keys().copied());
                }
                if let Some(node) = refn {
                    metrics.extend(node.metrics().keys().copied());
                }

                let metrics = metrics
                    .into_iter()
                    .map(|metric| {
                        let current_ratio = cur.and_then(|n| n.metric(metric));
                        let reference_ratio = refn.and_then(|n| n.metric(metric));
                        let delta = match (
                            current_ratio.and_then(|r| r.percentage()),
                            reference_ratio.and_then(|r| r.percentage()),
                        ) {
                            (Some(c), Some(r)) => Some(c - r),
                            _ => None,
                        };
                        MetricDelta {
                            metric,
                            current: current_ratio,
                            reference: reference_ratio,
                            delta,
                            tendency: Tendency::from_delta(delta),
                        }
                    })
                    .collect();

                FileDelta { path: path.clone(), metrics }
            })
            .collect();

        TreeDelta { has_baseline: true, files }
    }

    /// The degraded result when no reference build is available: every
    /// metric of every file classifies as [`Tendency::Na`].
    pub fn no_baseline(&self, current: &CoverageTree) -> TreeDelta {
        let mut paths: Vec<&String> = current.file_index().keys().collect();
        paths.sort();

        let files = paths
            .into_iter()
            .map(|path| {
                let node = current.node(current.find_file(path).expect("indexed path"));
                let metrics = node
                    .metrics()
                    .keys()
                    .map(|metric| MetricDelta {
                        metric: *metric,
                        current: node.metric(*metric),
                        reference: None,
                        delta: None,
                        tendency: Tendency::Na,
                    })
                    .collect();
                FileDelta { path: path.clone(), metrics }
            })
            .collect();

        TreeDelta { has_baseline: false, files }
    }

    /// Diff with memoization keyed by the `(old_ref, new_ref)` build pair.
    pub fn diff_cached(
        &mut self,
        old_ref: &str,
        new_ref: &str,
        current: &CoverageTree,
        reference: &CoverageTree,
    ) -> TreeDelta {
        let key = cache_key(old_ref, new_ref);
        if let Some(hit) = self.cache.get(&key) {
            tracing::debug!(old_ref, new_ref, "delta cache hit");
            return hit;
        }
        let delta = self.diff(current, reference);
        self.cache.insert(key, delta.clone());
        delta
    }

    /// Walk backward through candidate build ids until one yields a
    /// restorable reference tree. Every lookup is bounded by the configured
    /// timeout; a timeout abandons the search entirely so a hung store
    /// cannot stall the build, while a per-candidate error just skips to
    /// the next candidate.
    pub async fn baseline(
        &self,
        history: Arc<dyn BuildHistory>,
        candidates: &[String],
    ) -> Option<CoverageTree> {
        let per_lookup = Duration::from_millis(self.baseline.timeout_ms);
        for build_id in candidates.iter().take(self.baseline.max_lookback) {
            let lookup_history = Arc::clone(&history);
            let lookup_id = build_id.clone();
            let lookup =
                tokio::task::spawn_blocking(move || lookup_history.load_tree(&lookup_id));

            match tokio::time::timeout(per_lookup, lookup).await {
                Err(_) => {
                    tracing::warn!(build = %build_id, "baseline lookup timed out, degrading to no baseline");
                    return None;
                }
                Ok(Err(join_err)) => {
                    tracing::warn!(build = %build_id, error = %join_err, "baseline lookup task failed, degrading to no baseline");
                    return None;
                }
                Ok(Ok(Err(err))) => {
                    tracing::warn!(build = %build_id, error = %err, "build history lookup failed, trying next candidate");
                }
                Ok(Ok(Ok(None))) => {}
                Ok(Ok(Ok(Some(snapshot)))) => match store::restore(&snapshot) {
                    Ok(tree) => {
                        tracing::debug!(build = %build_id, "reference tree found");
                        return Some(tree);
                    }
                    Err(err) => {
                        tracing::warn!(build = %build_id, error = %err, "stored reference tree is unusable, trying next candidate");
                    }
                },
            }
        }
        None
    }

    /// Diff against the first usable historical reference, or degrade to
    /// the all-`Na` result when none exists.
    pub async fn diff_against_history(
        &self,
        current: &CoverageTree,
        candidates: &[String],
        history: Arc<dyn BuildHistory>,
    ) -> TreeDelta {
        match self.baseline(history, candidates).await {
            Some(reference) => self.diff(current, &reference),
            None => self.no_baseline(current),
        }
    }
}

/// Files whose painted-line extent intersects a changed range, with their
/// changed instrumented lines classified and block-compressed.
pub fn change_coverage(current: &CoverageTree, changes: &ChangeSet) -> Vec<FileChange> {
    let mut paths: Vec<&String> = current.file_index().keys().collect();
    paths.sort();

    let mut out = Vec::new();
    for path in paths {
        let node = current.node(current.find_file(path).expect("indexed path"));
        let Some((lo, hi)) = node.line_extent() else {
            continue;
        };
        let ranges = changes.ranges_for(path);
        if !ranges.iter().any(|r| r.overlaps(lo, hi)) {
            continue;
        }

        let mut covered = Vec::new();
        let mut missed = Vec::new();
        let mut partial = Vec::new();
        for (line, record) in node.lines() {
            if !ranges.iter().any(|r| r.contains(*line)) {
                continue;
            }
            if !record.is_hit() {
                missed.push(*line);
            } else if record.is_partial() {
                partial.push(*line);
            } else {
                covered.push(*line);
            }
        }

        let hit = covered.len() + partial.len();
        let total = hit + missed.len();
        out.push(FileChange {
            path: path.clone(),
            ratio: Ratio::new(hit as u64, total as u64),
            blocks: blocks::compress(&covered, &missed, &partial),
            covered,
            missed,
            partial,
        });
    }
    out
}

/// Coverage shifts on lines outside the changed ranges, per matched file.
pub fn indirect_changes(
    current: &CoverageTree,
    reference: &CoverageTree,
    changes: &ChangeSet,
) -> Vec<IndirectChange> {
    let mut paths: Vec<&String> = current.file_index().keys().collect();
    paths.sort();

    let mut out = Vec::new();
    for path in paths {
        let cur = current.node(current.find_file(path).expect("indexed path"));
        let refn = reference.find_file(path).map(|id| reference.node(id));
        for (line, record) in cur.lines() {
            if changes.contains(path, *line) {
                continue;
            }
            let previous = refn.and_then(|n| n.lines().get(line)).copied();
            if previous != Some(*record) {
                out.push(IndirectChange {
                    path: path.clone(),
                    line: *line,
                    reference: previous,
                    current: *record,
                });
            }
        }
    }
    out
}

fn cache_key(old_ref: &str, new_ref: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(old_ref.as_bytes());
    hasher.update([0]);
    hasher.update(new_ref.as_bytes());
    hex::encode(hasher.finalize())
}

/// Bounded LRU of computed deltas.
struct DiffCache {
    capacity: usize,
    entries: HashMap<String, TreeDelta>,
    order: VecDeque<String>,
}

impl DiffCache {
    fn new(config: &CacheConfig) -> Self {
        DiffCache {
            capacity: config.capacity.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn get(&mut self, key: &str) -> Option<TreeDelta> {
        let hit = self.entries.get(key).cloned()?;
        self.touch(key);
        Some(hit)
    }

    fn insert(&mut self, key: String, value: TreeDelta) {
        if self.entries.insert(key.clone(), value).is_some() {
            self.touch(&key);
            return;
        }
        self.order.push_back(key);
        if self.entries.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                tracing::debug!(key = %evicted, "evicting least recently used delta");
                self.entries.remove(&evicted);
            }
        }
    }

    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            let key = self.order.remove(pos).expect("position just found");
            self.order.push_back(key);
        }
    }
}
