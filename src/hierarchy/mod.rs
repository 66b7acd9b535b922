//! Capability interfaces of the host that owns the feature model.
//!
//! The core never touches a concrete tree. It resolves LPQs to handles on every
//! call, reads snapshots, and asks the host to perform structural edits. The
//! host serializes those edits against each other and against metrics passes
//! through [`FeatureHierarchy::with_edit_lock`].

use crate::error::HostResult;
use crate::models::{Feature, FeatureHandle, HistoryInput, LPQ_SEPARATOR};

/// Result of a host edit that takes a new display name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameEdit {
    Applied,
    InvalidName,
    DuplicateName,
}

/// Read and write access to the feature model.
pub trait FeatureHierarchy {
    /// Resolve an LPQ to a live feature. The model root resolves by its name.
    fn resolve(&self, lpq: &str) -> HostResult<Option<FeatureHandle>>;

    /// Parent of a feature, `None` for the model root.
    fn parent(&self, feature: &FeatureHandle) -> HostResult<Option<FeatureHandle>>;

    /// Direct children in model order.
    fn children(&self, feature: &FeatureHandle) -> HostResult<Vec<FeatureHandle>>;

    /// Top-level features (children of the model root) with their subtrees.
    fn snapshot(&self) -> HostResult<Vec<Feature>>;

    /// Add a child named `name`. Name format and sibling uniqueness are the
    /// host's call.
    fn add_child(&self, parent: &FeatureHandle, name: &str) -> HostResult<NameEdit>;

    fn rename(&self, feature: &FeatureHandle, name: &str) -> HostResult<NameEdit>;

    /// Remove the feature, its subtree and their annotations. Code stays.
    fn delete_annotations(&self, feature: &FeatureHandle) -> HostResult<()>;

    /// Enqueue removal of the feature together with the code it annotates.
    ///
    /// Returns once the job is accepted by the host's edit queue, which may be
    /// before it is applied. An error means nothing was enqueued.
    fn schedule_delete_with_code(&self, feature: &FeatureHandle) -> HostResult<()>;

    /// Re-parent `child` (with its subtree) under `new_parent`.
    fn move_feature(&self, child: &FeatureHandle, new_parent: &FeatureHandle) -> HostResult<()>;

    /// Run `edit` with exclusive access to the model. Lookups and edits made
    /// through the handed-in view see no concurrent writer, so a check and
    /// the edit it guards apply together or not at all.
    ///
    /// Hosts without concurrent writers can keep the default.
    fn with_edit_lock<R>(
        &self,
        edit: impl FnOnce(&dyn FeatureHierarchy) -> HostResult<R>,
    ) -> HostResult<R>
    where
        Self: Sized,
    {
        edit(self)
    }
}

/// Editor-side navigation requested from the visualization.
pub trait HostNavigator {
    fn highlight_feature(&self, lpq: &str) -> HostResult<()>;

    /// Open a file, optionally at `(line, column)`.
    fn open_path(&self, path: &str, position: Option<(u32, u32)>) -> HostResult<()>;
}

/// Supplies the commits and feature observations of the project history.
pub trait HistorySource {
    fn history(&self) -> HostResult<HistoryInput>;
}

/// Feature names are identifiers: ASCII letters, digits and underscores.
pub fn is_valid_feature_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// LPQ of a child given its parent's LPQ. Top-level features have no parent LPQ.
pub fn child_lpq(parent: Option<&str>, name: &str) -> String {
    match parent {
        Some(parent) => format!("{}{}{}", parent, LPQ_SEPARATOR, name),
        None => name.to_string(),
    }
}

/// Split an LPQ into its name segments.
pub fn lpq_segments(lpq: &str) -> Vec<&str> {
    lpq.split(LPQ_SEPARATOR).collect()
}
