//! Concurrent report ingestion
//!
//! Every report of a build parses independently (each adapter touches only
//! its own input and produces its own tree), so a batch fans out across a
//! bounded set of tokio tasks and joins before the single aggregation step.
//! One malformed report fails only itself; the rest of the batch proceeds.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::adapter::AdapterRegistry;
use crate::aggregate;
use crate::error::{CoverageError, Result};
use crate::tree::CoverageTree;

/// One raw report plus the label shown when the document carries no name.
#[derive(Debug, Clone)]
pub struct ReportInput {
    pub label: String,
    pub bytes: Vec<u8>,
}

impl ReportInput {
    pub fn new(label: &str, bytes: Vec<u8>) -> Self {
        ReportInput { label: label.to_string(), bytes }
    }

    /// Read a report file; the file stem becomes the label.
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let label = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        Ok(ReportInput { label, bytes })
    }
}

/// A report that failed to parse, kept apart from the surviving trees.
#[derive(Debug)]
pub struct IngestFailure {
    pub label: String,
    pub error: CoverageError,
}

#[derive(Debug, Default)]
pub struct ParseOutcome {
    /// Successfully parsed trees with their labels, ordered by label so the
    /// downstream merge is deterministic regardless of completion order.
    pub trees: Vec<(String, CoverageTree)>,
    pub failures: Vec<IngestFailure>,
}

/// Parse a batch of reports concurrently with at most `max_workers` in
/// flight.
pub async fn parse_reports(
    registry: Arc<AdapterRegistry>,
    inputs: Vec<ReportInput>,
    max_workers: usize,
) -> ParseOutcome {
    let semaphore = Arc::new(Semaphore::new(max_workers.max(1)));
    let mut join_set = JoinSet::new();

    for input in inputs {
        let sem = semaphore.clone();
        let reg = registry.clone();

        join_set.spawn(async move {
            let _permit = sem.acquire().await.expect("Semaphore closed");
            let result = reg.parse_auto(&input.bytes, &input.label);
            (input.label, result)
        });
    }

    let mut outcome = ParseOutcome::default();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((label, Ok(tree))) => outcome.trees.push((label, tree)),
            Ok((label, Err(error))) => {
                tracing::warn!(report = %label, error = %error, "report failed to parse");
                outcome.failures.push(IngestFailure { label, error });
            }
            Err(join_err) => {
                tracing::warn!(error = %join_err, "report parse task panicked");
                outcome.failures.push(IngestFailure {
                    label: "unknown".to_string(),
                    error: CoverageError::parse("batch", join_err),
                });
            }
        }
    }

    outcome.trees.sort_by(|a, b| a.0.cmp(&b.0));
    outcome
}

/// Fan-out parse, fan-in merge. The merge runs only after every parse task
/// has joined.
pub async fn ingest(
    registry: Arc<AdapterRegistry>,
    inputs: Vec<ReportInput>,
    max_workers: usize,
) -> Result<(CoverageTree, Vec<IngestFailure>)> {
    let outcome = parse_reports(registry, inputs, max_workers).await;
    let trees = outcome.trees.into_iter().map(|(_, tree)| tree).collect();
    let merged = aggregate::merge(trees)?;
    Ok((merged, outcome.failures))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CoverageMetric;
    use crate::ratio::Ratio;
    use std::io::Write;

    fn java_report(pkg: &str, path: &str, hits: &[u32]) -> String {
        let lines: String = hits
            .iter()
            .enumerate()
            .map(|(i, h)| format!("<line number=\"{}\" hits=\"{}\"/>", i + 1, h))
            .collect();
        format!(
            "<report name=\"{pkg}\"><package name=\"{pkg}\"><file name=\"f\" path=\"{path}\">{lines}</file></package></report>"
        )
    }

    #[tokio::test]
    async fn test_batch_parses_and_merges() {
        let registry = Arc::new(AdapterRegistry::default());
        let inputs = vec![
            ReportInput::new("a", java_report("a", "src/a.rs", &[1, 0]).into_bytes()),
            ReportInput::new("b", java_report("b", "src/b.rs", &[1, 1, 1]).into_bytes()),
        ];

        let (merged, failures) = ingest(registry, inputs, 4).await.unwrap();
        assert!(failures.is_empty());
        assert_eq!(
            merged.get_coverage(merged.root(), CoverageMetric::Line),
            Some(Ratio::new(4, 5))
        );
    }

    #[tokio::test]
    async fn test_one_bad_report_does_not_abort_batch() {
        let registry = Arc::new(AdapterRegistry::default());
        let inputs = vec![
            ReportInput::new("good", java_report("g", "src/g.rs", &[1]).into_bytes()),
            ReportInput::new("bad", b"<report><package".to_vec()),
        ];

        let (merged, failures) = ingest(registry, inputs, 2).await.unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].label, "bad");
        assert!(merged.find_file("src/g.rs").is_some());
    }

    #[tokio::test]
    async fn test_mixed_dialects_in_one_batch() {
        let registry = Arc::new(AdapterRegistry::default());
        let llvm = "<data name=\"n\"><directory name=\"d\"><file name=\"f\" path=\"src/l.rs\"><line number=\"1\" hits=\"1\"/></file></directory></data>";
        let json = r#"{"report": {"children": [{"file": {"name": "j", "path": "src/j.rs", "lines": [{"number": 1, "hits": 0}]}}]}}"#;
        let inputs = vec![
            ReportInput::new("llvm", llvm.as_bytes().to_vec()),
            ReportInput::new("json", json.as_bytes().to_vec()),
            ReportInput::new("java", java_report("p", "src/p.rs", &[1]).into_bytes()),
        ];

        let (merged, failures) = ingest(registry, inputs, 3).await.unwrap();
        assert!(failures.is_empty());
        assert!(merged.find_file("src/l.rs").is_some());
        assert!(merged.find_file("src/j.rs").is_some());
        assert!(merged.find_file("src/p.rs").is_some());
        assert_eq!(
            merged.get_coverage(merged.root(), CoverageMetric::Line),
            Some(Ratio::new(2, 3))
        );
    }

    #[tokio::test]
    async fn test_unknown_format_is_reported() {
        let registry = Arc::new(AdapterRegistry::default());
        let inputs = vec![ReportInput::new("weird", b"plain text".to_vec())];
        let outcome = parse_reports(registry, inputs, 1).await;
        assert!(outcome.trees.is_empty());
        assert!(matches!(
            outcome.failures[0].error,
            CoverageError::UnknownFormat
        ));
    }

    #[test]
    fn test_input_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "<report/>").unwrap();
        let input = ReportInput::from_path(file.path()).unwrap();
        assert_eq!(input.bytes, b"<report/>");
        assert!(!input.label.is_empty());
    }
}
