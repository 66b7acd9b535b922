use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Display format for commit timestamps in history payloads.
pub const COMMIT_LABEL_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A commit in the ordered commit sequence of a history request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRef {
    pub hash: String,
    pub committed_at: DateTime<Utc>,
    pub message: String,
    pub author: String,
}

impl CommitRef {
    pub fn label(&self) -> String {
        self.committed_at.format(COMMIT_LABEL_FORMAT).to_string()
    }
}

/// Discriminant of a history observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HistoryKind {
    CodeAnnotation,
    FileMapping,
    FolderMapping,
}

impl HistoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CodeAnnotation => "codeAnnotation",
            Self::FileMapping => "fileMapping",
            Self::FolderMapping => "folderMapping",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "codeAnnotation" => Some(Self::CodeAnnotation),
            "fileMapping" => Some(Self::FileMapping),
            "folderMapping" => Some(Self::FolderMapping),
            _ => None,
        }
    }
}

/// An observation as delivered by a history source.
///
/// `kind` stays a string here: sources may emit kinds this build does not
/// know about, and those are dropped during encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawHistoryPoint {
    pub feature_index: usize,
    pub commit_index: usize,
    pub commit_hash: String,
    pub kind: String,
    /// Commit message, for code annotations.
    pub message: Option<String>,
    pub author: Option<String>,
    /// Commit timestamp label, for file and folder mappings.
    pub timestamp: Option<String>,
    /// Mapped file or folder, for file and folder mappings.
    pub entity_name: Option<String>,
}

/// A feature that appears in history but no longer in the live model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedFeatureRecord {
    pub feature_name: String,
    pub last_commit_time: String,
    pub commit_hash: String,
}

/// Everything a history payload is built from.
///
/// `features` and `commits` are the parallel sequences that point indices
/// refer to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryInput {
    pub features: Vec<String>,
    pub commits: Vec<CommitRef>,
    pub points: Vec<RawHistoryPoint>,
    pub deleted: Vec<DeletedFeatureRecord>,
}

/// Input for recording one commit and what it touched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordCommitInput {
    pub hash: String,
    pub committed_at: DateTime<Utc>,
    pub message: String,
    pub author: String,
    #[serde(default)]
    pub events: Vec<HistoryEventInput>,
}

/// One feature touched by a commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEventInput {
    pub feature_name: String,
    pub kind: String,
    /// File or folder name for mapping events.
    pub entity_name: Option<String>,
}
