use std::collections::{BTreeMap, BTreeSet};

use super::Location;

/// Tangling relation keyed by LPQ.
///
/// Expected to be symmetric, but consumers must not rely on it.
pub type TanglingMap = BTreeMap<String, BTreeSet<String>>;

/// Metrics of a single feature, counting only its own annotations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureMetrics {
    pub lines: u32,
    pub scattering_degree: u32,
    pub locations: Vec<Location>,
}

/// Snapshot of a completed metrics pass over the whole model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectMetrics {
    pub features: BTreeMap<String, FeatureMetrics>,
    pub tangling: TanglingMap,
}

impl ProjectMetrics {
    pub fn feature(&self, lpq: &str) -> Option<&FeatureMetrics> {
        self.features.get(lpq)
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty() && self.tangling.is_empty()
    }
}
