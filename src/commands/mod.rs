//! Validated mutations of the feature model.
//!
//! Each request is resolved, validated and then either applied once or
//! rejected. Nothing is kept between calls: LPQs are re-resolved every time.

use std::collections::HashSet;

use crate::error::HostResult;
use crate::hierarchy::{FeatureHierarchy, NameEdit};
use crate::models::FeatureHandle;

/// A structural edit requested by the visualization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationRequest {
    AddChild { parent: String, name: String },
    /// Remove the feature and the code it annotates.
    DeleteSubtree { target: String },
    /// Remove the feature and its annotations, keeping the code.
    DeleteAnnotationsOnly { target: String },
    Move { child: String, new_parent: String },
    Rename { target: String, name: String },
}

impl MutationRequest {
    pub fn kind(&self) -> MutationKind {
        match self {
            Self::AddChild { .. } => MutationKind::AddChild,
            Self::DeleteSubtree { .. } => MutationKind::DeleteSubtree,
            Self::DeleteAnnotationsOnly { .. } => MutationKind::DeleteAnnotationsOnly,
            Self::Move { .. } => MutationKind::Move,
            Self::Rename { .. } => MutationKind::Rename,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    AddChild,
    DeleteSubtree,
    DeleteAnnotationsOnly,
    Move,
    Rename,
}

/// How a mutation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    Applied,
    FeatureNotFound,
    InvalidNameFormat,
    DuplicateSiblingName,
    /// The new parent is the moved feature or one of its descendants.
    CyclicMove,
    /// Already a direct child of the requested parent; nothing to do.
    AlreadyChild,
    /// Delete-with-code could not be handed to the host's edit queue.
    SchedulingFailure,
}

/// Code reported for any request whose target LPQ does not resolve.
pub const FEATURE_NOT_FOUND_CODE: i32 = -4;

impl MutationOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }

    /// Stable failure code for the transport, `None` when applied.
    ///
    /// Codes are per command: a duplicate sibling is -2 for add and rename
    /// but -3 for move, where -2 already means "already a child".
    pub fn code(&self, kind: MutationKind) -> Option<i32> {
        match self {
            Self::Applied => None,
            Self::FeatureNotFound => Some(FEATURE_NOT_FOUND_CODE),
            Self::InvalidNameFormat | Self::CyclicMove | Self::SchedulingFailure => Some(-1),
            Self::AlreadyChild => Some(-2),
            Self::DuplicateSiblingName => match kind {
                MutationKind::Move => Some(-3),
                _ => Some(-2),
            },
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::Applied => "Applied",
            Self::FeatureNotFound => "Feature not found",
            Self::InvalidNameFormat => "Feature name is invalid",
            Self::DuplicateSiblingName => "A sibling feature with this name already exists",
            Self::CyclicMove => "Cannot move a feature below itself or one of its descendants",
            Self::AlreadyChild => "Feature is already a direct child of the target parent",
            Self::SchedulingFailure => "Could not delete feature with code",
        }
    }
}

impl From<NameEdit> for MutationOutcome {
    fn from(edit: NameEdit) -> Self {
        match edit {
            NameEdit::Applied => Self::Applied,
            NameEdit::InvalidName => Self::InvalidNameFormat,
            NameEdit::DuplicateName => Self::DuplicateSiblingName,
        }
    }
}

/// Runs the validate-then-apply step for each mutation kind.
///
/// Each request runs inside one [`FeatureHierarchy::with_edit_lock`] call, so
/// resolution, validation and the edit see the same model.
#[derive(Debug, Clone)]
pub struct MutationProcessor<H> {
    hierarchy: H,
}

impl<H: FeatureHierarchy> MutationProcessor<H> {
    pub fn new(hierarchy: H) -> Self {
        Self { hierarchy }
    }

    /// Validate and apply one request.
    ///
    /// Rejections come back as `Ok` outcomes; `Err` is reserved for host
    /// failures.
    pub fn apply(&self, request: &MutationRequest) -> HostResult<MutationOutcome> {
        let outcome = self.hierarchy.with_edit_lock(|model| match request {
            MutationRequest::AddChild { parent, name } => add_child(model, parent, name),
            MutationRequest::Rename { target, name } => rename(model, target, name),
            MutationRequest::DeleteAnnotationsOnly { target } => {
                delete_annotations(model, target)
            }
            MutationRequest::DeleteSubtree { target } => delete_with_code(model, target),
            MutationRequest::Move { child, new_parent } => {
                move_feature(model, child, new_parent)
            }
        })?;

        if outcome.is_applied() {
            tracing::info!("Applied {:?}", request);
        } else {
            tracing::warn!("Rejected {:?}: {}", request, outcome.message());
        }
        Ok(outcome)
    }
}

fn add_child(model: &dyn FeatureHierarchy, parent: &str, name: &str) -> HostResult<MutationOutcome> {
    let Some(parent) = model.resolve(parent)? else {
        return Ok(MutationOutcome::FeatureNotFound);
    };
    Ok(model.add_child(&parent, name)?.into())
}

fn rename(model: &dyn FeatureHierarchy, target: &str, name: &str) -> HostResult<MutationOutcome> {
    let Some(target) = model.resolve(target)? else {
        return Ok(MutationOutcome::FeatureNotFound);
    };
    Ok(model.rename(&target, name)?.into())
}

fn delete_annotations(model: &dyn FeatureHierarchy, target: &str) -> HostResult<MutationOutcome> {
    let Some(target) = model.resolve(target)? else {
        return Ok(MutationOutcome::FeatureNotFound);
    };
    model.delete_annotations(&target)?;
    Ok(MutationOutcome::Applied)
}

fn delete_with_code(model: &dyn FeatureHierarchy, target: &str) -> HostResult<MutationOutcome> {
    let Some(target) = model.resolve(target)? else {
        return Ok(MutationOutcome::FeatureNotFound);
    };
    match model.schedule_delete_with_code(&target) {
        Ok(()) => Ok(MutationOutcome::Applied),
        Err(e) => {
            tracing::error!("Could not schedule deletion of {}: {}", target.lpq, e);
            Ok(MutationOutcome::SchedulingFailure)
        }
    }
}

fn move_feature(
    model: &dyn FeatureHierarchy,
    child: &str,
    new_parent: &str,
) -> HostResult<MutationOutcome> {
    let Some(child) = model.resolve(child)? else {
        return Ok(MutationOutcome::FeatureNotFound);
    };
    let Some(new_parent) = model.resolve(new_parent)? else {
        return Ok(MutationOutcome::FeatureNotFound);
    };

    // A cycle is reported ahead of any sibling conflict.
    if is_self_or_ancestor(model, &child, &new_parent)? {
        return Ok(MutationOutcome::CyclicMove);
    }

    let siblings = model.children(&new_parent)?;
    if siblings.iter().any(|s| s.lpq == child.lpq) {
        return Ok(MutationOutcome::AlreadyChild);
    }
    if siblings.iter().any(|s| s.name == child.name) {
        return Ok(MutationOutcome::DuplicateSiblingName);
    }

    model.move_feature(&child, &new_parent)?;
    Ok(MutationOutcome::Applied)
}

/// Walk up from `node` and report whether `candidate` is on the chain,
/// `node` itself included. Compares LPQs, not handles.
fn is_self_or_ancestor(
    model: &dyn FeatureHierarchy,
    candidate: &FeatureHandle,
    node: &FeatureHandle,
) -> HostResult<bool> {
    let mut visited = HashSet::new();
    let mut current = Some(node.clone());
    while let Some(feature) = current {
        if feature.lpq == candidate.lpq {
            return Ok(true);
        }
        if !visited.insert(feature.lpq.clone()) {
            break;
        }
        current = model.parent(&feature)?;
    }
    Ok(false)
}
