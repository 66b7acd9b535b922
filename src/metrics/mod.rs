//! Metrics pass over annotation blocks, and the request stage that runs it.
//!
//! Serialization is a two-stage pipeline. [`MetricsRequest::spawn`] starts a
//! metrics pass on the blocking pool and hands back a handle; the serializer
//! only runs after [`MetricsRequest::ready`] resolves, so the snapshot it reads
//! is consistent as of that point.

use std::collections::BTreeMap;

use tokio::task::JoinHandle;

use crate::error::HostResult;
use crate::models::{Block, FeatureMetrics, Location, ProjectMetrics};

/// Source of project metrics.
pub trait MetricsProvider {
    fn compute_metrics(&self) -> HostResult<ProjectMetrics>;
}

/// One annotation block, attributed to a feature by LPQ.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationRecord {
    pub lpq: String,
    pub path: String,
    pub block: Block,
}

/// Compute line counts, scattering and tangling from annotation blocks.
///
/// Two distinct features tangle when they own overlapping blocks in the same
/// file. The resulting relation is symmetric.
pub fn compute_project_metrics(records: &[AnnotationRecord]) -> ProjectMetrics {
    let mut by_feature: BTreeMap<&str, BTreeMap<&str, Vec<Block>>> = BTreeMap::new();
    let mut by_path: BTreeMap<&str, Vec<&AnnotationRecord>> = BTreeMap::new();

    for record in records {
        by_feature
            .entry(record.lpq.as_str())
            .or_default()
            .entry(record.path.as_str())
            .or_default()
            .push(record.block);
        by_path.entry(record.path.as_str()).or_default().push(record);
    }

    let mut metrics = ProjectMetrics::default();

    for (lpq, files) in by_feature {
        let locations: Vec<Location> = files
            .into_iter()
            .map(|(path, mut blocks)| {
                blocks.sort_by_key(|b| (b.start, b.end));
                Location {
                    path: path.to_string(),
                    blocks,
                }
            })
            .collect();

        metrics.features.insert(
            lpq.to_string(),
            FeatureMetrics {
                lines: locations.iter().map(Location::line_count).sum(),
                scattering_degree: locations.len() as u32,
                locations,
            },
        );
    }

    for records in by_path.values() {
        for (i, a) in records.iter().enumerate() {
            for b in &records[i + 1..] {
                if a.lpq == b.lpq || !a.block.overlaps(&b.block) {
                    continue;
                }
                metrics
                    .tangling
                    .entry(a.lpq.clone())
                    .or_default()
                    .insert(b.lpq.clone());
                metrics
                    .tangling
                    .entry(b.lpq.clone())
                    .or_default()
                    .insert(a.lpq.clone());
            }
        }
    }

    metrics
}

/// Handle to a metrics pass running in the background.
pub struct MetricsRequest {
    handle: JoinHandle<HostResult<ProjectMetrics>>,
}

impl MetricsRequest {
    /// Start a metrics pass. Must be called from within a tokio runtime.
    pub fn spawn<P>(provider: P) -> Self
    where
        P: MetricsProvider + Send + 'static,
    {
        let handle = tokio::task::spawn_blocking(move || provider.compute_metrics());
        Self { handle }
    }

    /// Wait for the pass to finish.
    ///
    /// Unavailable metrics are not fatal: the caller gets an empty snapshot
    /// and every derived number serializes as zero.
    pub async fn ready(self) -> ProjectMetrics {
        match self.handle.await {
            Ok(Ok(metrics)) => metrics,
            Ok(Err(e)) => {
                tracing::warn!("Metrics unavailable, serializing without them: {}", e);
                ProjectMetrics::default()
            }
            Err(e) => {
                tracing::warn!("Metrics pass did not complete: {}", e);
                ProjectMetrics::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HostError;
    use crate::models::AnnotationType;

    fn record(lpq: &str, path: &str, start: u32, end: u32) -> AnnotationRecord {
        AnnotationRecord {
            lpq: lpq.to_string(),
            path: path.to_string(),
            block: Block {
                start,
                end,
                annotation_type: AnnotationType::Code,
            },
        }
    }

    #[test]
    fn sums_lines_and_counts_files() {
        let metrics = compute_project_metrics(&[
            record("A", "src/a.rs", 1, 10),
            record("A", "src/a.rs", 20, 24),
            record("A", "src/b.rs", 5, 5),
        ]);

        let a = metrics.feature("A").expect("metrics for A");
        assert_eq!(a.lines, 16);
        assert_eq!(a.scattering_degree, 2);
        assert_eq!(a.locations[0].path, "src/a.rs");
        assert_eq!(a.locations[0].line_count(), 15);
    }

    #[test]
    fn own_overlapping_blocks_are_not_double_counted() {
        let metrics = compute_project_metrics(&[
            record("A", "src/a.rs", 1, 10),
            record("A", "src/a.rs", 5, 15),
        ]);

        let a = metrics.feature("A").expect("metrics for A");
        assert_eq!(a.lines, 15);
        assert!(metrics.tangling.is_empty());
    }

    #[test]
    fn overlapping_blocks_in_one_file_tangle_both_ways() {
        let metrics = compute_project_metrics(&[
            record("A", "src/a.rs", 1, 10),
            record("B", "src/a.rs", 8, 12),
            record("C", "src/a.rs", 11, 30),
            record("D", "src/other.rs", 1, 100),
        ]);

        assert!(metrics.tangling["A"].contains("B"));
        assert!(metrics.tangling["B"].contains("A"));
        assert!(metrics.tangling["B"].contains("C"));
        assert!(!metrics.tangling["A"].contains("C"));
        assert!(!metrics.tangling.contains_key("D"));
    }

    #[test]
    fn a_feature_never_tangles_with_itself() {
        let metrics = compute_project_metrics(&[
            record("A", "src/a.rs", 1, 10),
            record("A", "src/a.rs", 5, 15),
        ]);
        assert!(metrics.tangling.is_empty());
    }

    struct Failing;

    impl MetricsProvider for Failing {
        fn compute_metrics(&self) -> HostResult<ProjectMetrics> {
            Err(HostError::Corrupt("index missing".to_string()))
        }
    }

    #[tokio::test]
    async fn failed_pass_degrades_to_empty_metrics() {
        let metrics = MetricsRequest::spawn(Failing).ready().await;
        assert!(metrics.is_empty());
    }
}
