use serde::{Deserialize, Serialize};

use super::{AnnotationType, RecordCommitInput};

/// A complete feature model in JSON form.
///
/// ```json
/// {
///   "root": "MyProject",
///   "features": [
///     { "name": "Auth", "children": [ { "name": "Login" } ],
///       "blocks": [ { "path": "src/auth.rs", "type": "code", "start": 1, "end": 20 } ] }
///   ],
///   "commits": []
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelImport {
    /// Name of the model root.
    pub root: String,
    #[serde(default)]
    pub features: Vec<FeatureImport>,
    #[serde(default)]
    pub commits: Vec<RecordCommitInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureImport {
    pub name: String,
    #[serde(default)]
    pub children: Vec<FeatureImport>,
    #[serde(default)]
    pub blocks: Vec<BlockImport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockImport {
    pub path: String,
    #[serde(rename = "type")]
    pub annotation_type: AnnotationType,
    pub start: u32,
    pub end: u32,
}
