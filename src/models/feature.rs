use serde::{Deserialize, Serialize};

/// Separator between feature names inside an LPQ.
pub const LPQ_SEPARATOR: char = '.';

/// An owned, read-only view of one feature and its subtree.
///
/// Snapshots are taken once per request. They are never kept across requests
/// because every mutation can change names and positions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feature {
    /// Least-path-qualified identifier, derived from ancestry.
    pub lpq: String,
    /// Display name. Unique among siblings.
    pub name: String,
    pub children: Vec<Feature>,
}

impl Feature {
    pub fn new(lpq: impl Into<String>, name: impl Into<String>, children: Vec<Feature>) -> Self {
        Self {
            lpq: lpq.into(),
            name: name.into(),
            children,
        }
    }

    /// Visit this feature and its descendants in pre-order.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Feature)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }
}

/// Flatten a forest of features into pre-order.
pub fn preorder(roots: &[Feature]) -> Vec<&Feature> {
    let mut out = Vec::new();
    for root in roots {
        root.walk(&mut |f| out.push(f));
    }
    out
}

/// A live feature resolved from an LPQ for the duration of one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureHandle {
    /// Host-side identity. Only meaningful to the host that issued it.
    pub id: i64,
    pub lpq: String,
    pub name: String,
}

/// Kind of annotation a block came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationType {
    /// Inline `begin`/`end` region inside a file.
    Code,
    /// Whole file mapped to the feature.
    File,
    /// Whole folder mapped to the feature.
    Folder,
}

impl AnnotationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::File => "file",
            Self::Folder => "folder",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "code" => Some(Self::Code),
            "file" => Some(Self::File),
            "folder" => Some(Self::Folder),
            _ => None,
        }
    }
}

/// A contiguous, inclusive line range annotated for a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub start: u32,
    pub end: u32,
    pub annotation_type: AnnotationType,
}

impl Block {
    pub fn line_count(&self) -> u32 {
        if self.end < self.start {
            0
        } else {
            self.end - self.start + 1
        }
    }

    pub fn overlaps(&self, other: &Block) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// True when `other` lies entirely inside this block.
    pub fn contains(&self, other: &Block) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// All blocks a feature owns in one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub path: String,
    pub blocks: Vec<Block>,
}

impl Location {
    /// Distinct lines covered by the blocks. Overlapping blocks count once.
    pub fn line_count(&self) -> u32 {
        let mut ranges: Vec<(u32, u32)> = self
            .blocks
            .iter()
            .filter(|b| b.start <= b.end)
            .map(|b| (b.start, b.end))
            .collect();
        ranges.sort_unstable();

        let mut total = 0;
        let mut current: Option<(u32, u32)> = None;
        for (start, end) in ranges {
            current = match current {
                Some((s, e)) if start <= e.saturating_add(1) => Some((s, e.max(end))),
                Some((s, e)) => {
                    total += e - s + 1;
                    Some((start, end))
                }
                None => Some((start, end)),
            };
        }
        if let Some((s, e)) = current {
            total += e - s + 1;
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_line_count_is_inclusive() {
        let block = Block {
            start: 3,
            end: 7,
            annotation_type: AnnotationType::Code,
        };
        assert_eq!(block.line_count(), 5);
    }

    #[test]
    fn inverted_block_counts_no_lines() {
        let block = Block {
            start: 9,
            end: 2,
            annotation_type: AnnotationType::Code,
        };
        assert_eq!(block.line_count(), 0);
    }

    fn code(start: u32, end: u32) -> Block {
        Block {
            start,
            end,
            annotation_type: AnnotationType::Code,
        }
    }

    #[test]
    fn overlapping_blocks_in_one_file_count_once() {
        let location = Location {
            path: "src/a.rs".to_string(),
            blocks: vec![code(5, 15), code(1, 10)],
        };
        assert_eq!(location.line_count(), 15);
    }

    #[test]
    fn disjoint_and_adjacent_blocks_add_up() {
        let location = Location {
            path: "src/a.rs".to_string(),
            blocks: vec![code(1, 3), code(4, 6), code(10, 10), code(8, 2)],
        };
        assert_eq!(location.line_count(), 7);
    }

    #[test]
    fn preorder_visits_parents_before_children() {
        let tree = vec![
            Feature::new("A", "A", vec![Feature::new("A.A1", "A1", vec![])]),
            Feature::new("B", "B", vec![]),
        ];
        let order: Vec<_> = preorder(&tree).iter().map(|f| f.lpq.as_str()).collect();
        assert_eq!(order, vec!["A", "A.A1", "B"]);
    }
}
