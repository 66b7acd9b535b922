//! Feature tree to graph serialization.
//!
//! Turns a snapshot of the feature model plus a completed metrics pass into
//! the payload the visualization renders:
//!
//! ```json
//! { "features": [ { "id": "A", "name": "A", "children": [...], "tanglingDegree": 1,
//!                   "scatteringDegree": 2, "lines": 40, "totalLines": 65,
//!                   "locations": [ { "lines": 40, "blocks": [ { "start": 1, "end": 40, "type": "code" } ],
//!                                    "path": "src/a.rs", "fileName": "a.rs" } ] } ],
//!   "tanglingLinks": [ { "source": "A.A1", "target": "B" } ] }
//! ```

mod path;

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::models::{preorder, Feature, Location, ProjectMetrics};

pub use path::{file_name, shorten_to_source};

/// Which features a payload lists at its top level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphView {
    /// Top-level features, children nested.
    Tree,
    /// Every feature at the top level, each still carrying its children.
    Tangling,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphPayload {
    pub features: Vec<FeatureNode>,
    pub tangling_links: Vec<TanglingLink>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureNode {
    /// The feature's LPQ.
    pub id: String,
    pub name: String,
    pub children: Vec<FeatureNode>,
    pub tangling_degree: usize,
    pub scattering_degree: u32,
    /// Lines annotated for this feature alone.
    pub lines: u32,
    /// `lines` of this feature and all its descendants.
    pub total_lines: u64,
    pub locations: Vec<LocationNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationNode {
    pub lines: u32,
    pub blocks: Vec<BlockNode>,
    pub path: String,
    pub file_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockNode {
    pub start: u32,
    pub end: u32,
    #[serde(rename = "type")]
    pub annotation_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TanglingLink {
    pub source: String,
    pub target: String,
}

/// Serializes feature snapshots into [`GraphPayload`]s.
#[derive(Debug, Clone, Default)]
pub struct TreeGraphSerializer {
    project_root: Option<PathBuf>,
}

impl TreeGraphSerializer {
    /// `project_root` is stripped from location paths for display.
    pub fn new(project_root: Option<PathBuf>) -> Self {
        Self { project_root }
    }

    pub fn serialize(
        &self,
        roots: &[Feature],
        metrics: &ProjectMetrics,
        view: GraphView,
    ) -> GraphPayload {
        let order = preorder(roots);

        let mut ids: HashMap<&str, usize> = HashMap::new();
        for feature in &order {
            let next = ids.len();
            ids.entry(feature.lpq.as_str()).or_insert(next);
        }

        let partners = live_partners(metrics, &ids);

        let mut totals = HashMap::new();
        for root in roots {
            collect_total_lines(root, metrics, &mut totals);
        }

        let ctx = NodeContext {
            metrics,
            partners: &partners,
            totals: &totals,
        };

        let features = match view {
            GraphView::Tree => roots.iter().map(|f| self.node(f, &ctx)).collect(),
            GraphView::Tangling => {
                let mut seen = BTreeSet::new();
                order
                    .iter()
                    .filter(|f| seen.insert(f.lpq.as_str()))
                    .map(|f| self.node(f, &ctx))
                    .collect()
            }
        };

        GraphPayload {
            features,
            tangling_links: tangling_links(&ids, &partners),
        }
    }

    fn node(&self, feature: &Feature, ctx: &NodeContext<'_>) -> FeatureNode {
        let children = feature
            .children
            .iter()
            .map(|child| self.node(child, ctx))
            .collect();

        let own = ctx.metrics.feature(&feature.lpq);
        let locations = own
            .map(|m| m.locations.iter().map(|l| self.location(l)).collect())
            .unwrap_or_default();

        FeatureNode {
            id: feature.lpq.clone(),
            name: feature.name.clone(),
            children,
            tangling_degree: ctx
                .partners
                .get(feature.lpq.as_str())
                .map_or(0, BTreeSet::len),
            scattering_degree: own.map_or(0, |m| m.scattering_degree),
            lines: own.map_or(0, |m| m.lines),
            total_lines: ctx.totals.get(feature.lpq.as_str()).copied().unwrap_or(0),
            locations,
        }
    }

    fn location(&self, location: &Location) -> LocationNode {
        LocationNode {
            lines: location.line_count(),
            blocks: location
                .blocks
                .iter()
                .map(|b| BlockNode {
                    start: b.start,
                    end: b.end,
                    annotation_type: b.annotation_type.as_str().to_string(),
                })
                .collect(),
            path: shorten_to_source(self.project_root.as_deref(), &location.path),
            file_name: file_name(&location.path),
        }
    }
}

struct NodeContext<'a> {
    metrics: &'a ProjectMetrics,
    partners: &'a HashMap<&'a str, BTreeSet<&'a str>>,
    totals: &'a HashMap<&'a str, u64>,
}

/// Tangling relation closed under symmetry and restricted to features that
/// received an id. Self entries are dropped.
fn live_partners<'a>(
    metrics: &'a ProjectMetrics,
    ids: &HashMap<&str, usize>,
) -> HashMap<&'a str, BTreeSet<&'a str>> {
    let mut partners: HashMap<&str, BTreeSet<&str>> = HashMap::new();
    for (a, tangled) in &metrics.tangling {
        if !ids.contains_key(a.as_str()) {
            continue;
        }
        for b in tangled {
            if a == b || !ids.contains_key(b.as_str()) {
                continue;
            }
            partners.entry(a.as_str()).or_default().insert(b.as_str());
            partners.entry(b.as_str()).or_default().insert(a.as_str());
        }
    }
    partners
}

/// One link per tangled pair, source always the lower id, ordered by
/// (source id, target id).
fn tangling_links(
    ids: &HashMap<&str, usize>,
    partners: &HashMap<&str, BTreeSet<&str>>,
) -> Vec<TanglingLink> {
    let mut pairs: Vec<(usize, usize, &str, &str)> = Vec::new();
    for (a, tangled) in partners {
        let Some(&id_a) = ids.get(a) else { continue };
        for b in tangled {
            let Some(&id_b) = ids.get(b) else { continue };
            if id_a < id_b {
                pairs.push((id_a, id_b, *a, *b));
            }
        }
    }
    pairs.sort_unstable_by_key(|&(id_a, id_b, _, _)| (id_a, id_b));
    pairs
        .into_iter()
        .map(|(_, _, source, target)| TanglingLink {
            source: source.to_string(),
            target: target.to_string(),
        })
        .collect()
}

/// Post-order sum of own lines over a subtree, recorded per LPQ.
fn collect_total_lines<'a>(
    feature: &'a Feature,
    metrics: &ProjectMetrics,
    totals: &mut HashMap<&'a str, u64>,
) -> u64 {
    let own = metrics.feature(&feature.lpq).map_or(0, |m| u64::from(m.lines));
    let children: u64 = feature
        .children
        .iter()
        .map(|child| collect_total_lines(child, metrics, totals))
        .sum();
    let total = own + children;
    totals.insert(feature.lpq.as_str(), total);
    total
}
