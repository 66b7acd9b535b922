//! Feature history time-series encoding.
//!
//! Two payload schemas are in use. The current one buckets points by kind:
//!
//! ```json
//! { "type": "featureHistory", "features": ["Auth"], "commits": ["2024-05-01 10:00:00"],
//!   "codeAnnotations": [ { "featureIndex": 0, "commitIndex": 0, "commitHash": "ab12",
//!                          "message": "add login", "author": "dev" } ],
//!   "fileMappings": [], "folderMappings": [],
//!   "deletedFeatures": [ { "featureName": "Old", "lastCommitTime": "...", "commitHash": "..." } ] }
//! ```
//!
//! The legacy one carries a single flat `seriesData` array of
//! `{featureIndex, commitIndex, commitHash}` in place of the three buckets.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::models::{CommitRef, DeletedFeatureRecord, HistoryInput, HistoryKind, RawHistoryPoint};

/// Value of the `type` field of every history payload.
pub const HISTORY_PAYLOAD_TYPE: &str = "featureHistory";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistorySchema {
    #[default]
    Current,
    Legacy,
}

impl HistorySchema {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::Legacy => "legacy",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "current" => Some(Self::Current),
            "legacy" => Some(Self::Legacy),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeAnnotationPoint {
    pub feature_index: usize,
    pub commit_index: usize,
    pub commit_hash: String,
    pub message: String,
    pub author: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingPoint {
    pub feature_index: usize,
    pub commit_index: usize,
    pub commit_hash: String,
    pub timestamp: String,
    pub entity_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesPoint {
    pub feature_index: usize,
    pub commit_index: usize,
    pub commit_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentHistoryPayload {
    #[serde(rename = "type")]
    pub payload_type: String,
    pub features: Vec<String>,
    pub commits: Vec<String>,
    pub code_annotations: Vec<CodeAnnotationPoint>,
    pub file_mappings: Vec<MappingPoint>,
    pub folder_mappings: Vec<MappingPoint>,
    pub deleted_features: Vec<DeletedFeatureRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyHistoryPayload {
    #[serde(rename = "type")]
    pub payload_type: String,
    pub features: Vec<String>,
    pub commits: Vec<String>,
    pub series_data: Vec<SeriesPoint>,
    pub deleted_features: Vec<DeletedFeatureRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HistoryPayload {
    Current(CurrentHistoryPayload),
    Legacy(LegacyHistoryPayload),
}

/// A raw point that passed validation, with its parsed kind.
struct ValidPoint<'a> {
    kind: HistoryKind,
    raw: &'a RawHistoryPoint,
}

impl ValidPoint<'_> {
    fn mapping(&self) -> MappingPoint {
        MappingPoint {
            feature_index: self.raw.feature_index,
            commit_index: self.raw.commit_index,
            commit_hash: self.raw.commit_hash.clone(),
            timestamp: self.raw.timestamp.clone().unwrap_or_default(),
            entity_name: self.raw.entity_name.clone().unwrap_or_default(),
        }
    }
}

/// Encode a history input into the requested schema.
pub fn encode(input: &HistoryInput, schema: HistorySchema) -> HistoryPayload {
    let features = input.features.clone();
    let commits: Vec<String> = input.commits.iter().map(CommitRef::label).collect();
    let points = valid_points(input);
    let deleted_features = input.deleted.clone();

    match schema {
        HistorySchema::Current => {
            let mut code_annotations = Vec::new();
            let mut file_mappings = Vec::new();
            let mut folder_mappings = Vec::new();

            for point in &points {
                match point.kind {
                    HistoryKind::CodeAnnotation => code_annotations.push(CodeAnnotationPoint {
                        feature_index: point.raw.feature_index,
                        commit_index: point.raw.commit_index,
                        commit_hash: point.raw.commit_hash.clone(),
                        message: point.raw.message.clone().unwrap_or_default(),
                        author: point.raw.author.clone().unwrap_or_default(),
                    }),
                    HistoryKind::FileMapping => file_mappings.push(point.mapping()),
                    HistoryKind::FolderMapping => folder_mappings.push(point.mapping()),
                }
            }

            HistoryPayload::Current(CurrentHistoryPayload {
                payload_type: HISTORY_PAYLOAD_TYPE.to_string(),
                features,
                commits,
                code_annotations,
                file_mappings,
                folder_mappings,
                deleted_features,
            })
        }
        HistorySchema::Legacy => HistoryPayload::Legacy(LegacyHistoryPayload {
            payload_type: HISTORY_PAYLOAD_TYPE.to_string(),
            features,
            commits,
            series_data: points
                .iter()
                .map(|point| SeriesPoint {
                    feature_index: point.raw.feature_index,
                    commit_index: point.raw.commit_index,
                    commit_hash: point.raw.commit_hash.clone(),
                })
                .collect(),
            deleted_features,
        }),
    }
}

fn valid_points(input: &HistoryInput) -> Vec<ValidPoint<'_>> {
    input
        .points
        .iter()
        .filter_map(|raw| {
            let Some(kind) = HistoryKind::from_str(&raw.kind) else {
                tracing::debug!("Dropping history point of unknown kind '{}'", raw.kind);
                return None;
            };
            if raw.feature_index >= input.features.len() || raw.commit_index >= input.commits.len()
            {
                tracing::debug!(
                    "Dropping history point outside the series: feature {} commit {}",
                    raw.feature_index,
                    raw.commit_index
                );
                return None;
            }
            Some(ValidPoint { kind, raw })
        })
        .collect()
}

/// Features that appear in history but not among the `live` LPQs.
///
/// Each record points at the latest commit that mentions the feature.
/// Features without any point are skipped.
pub fn derive_deleted_features(
    features: &[String],
    commits: &[CommitRef],
    points: &[RawHistoryPoint],
    live: &BTreeSet<String>,
) -> Vec<DeletedFeatureRecord> {
    features
        .iter()
        .enumerate()
        .filter(|(_, name)| !live.contains(name.as_str()))
        .filter_map(|(index, name)| {
            let last = points
                .iter()
                .filter(|p| p.feature_index == index)
                .map(|p| p.commit_index)
                .filter(|&ci| ci < commits.len())
                .max()?;
            let commit = &commits[last];
            Some(DeletedFeatureRecord {
                feature_name: name.clone(),
                last_commit_time: commit.label(),
                commit_hash: commit.hash.clone(),
            })
        })
        .collect()
}
