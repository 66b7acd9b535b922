//! Domain models for feature-lens.
//!
//! # Core Concepts
//!
//! - [`Feature`]: read-only snapshot of a node in the feature model and its subtree,
//!   addressed by its LPQ (least-path-qualified identifier).
//! - [`FeatureHandle`]: a live feature resolved from an LPQ for the duration of one call.
//! - [`Location`] / [`Block`]: where a feature's annotations sit in the source tree.
//! - [`ProjectMetrics`]: result of a metrics pass (line counts, scattering, tangling).
//! - [`HistoryInput`]: commits and per-feature observations a history payload is built from.
//! - [`ModelImport`]: a whole feature model in JSON form, used to seed a host.

mod feature;
mod history;
mod import;
mod metrics;

pub use feature::*;
pub use history::*;
pub use import::*;
pub use metrics::*;
