//! Ordered resource collections.
//!
//! Drag-and-drop reordering is applied locally as a *pending* layer, persisted one
//! `SetOrder` call per moved element, and then either promoted to the confirmed list or
//! thrown away in favour of a fresh fetch. Commits never interleave: a drop that lands
//! while another commit is in flight is queued behind it.

mod controller;
mod state;

pub use controller::{OrderedCollectionController, RefreshOutcome, ReorderEvent, ReorderOutcome};

use crate::api::{ApiError, ResourceFilter, ResourceRecord};

/// Source of truth for a collection.
#[allow(async_fn_in_trait)]
pub trait ResourceStore {
    async fn list_resources(&self, filter: &ResourceFilter)
        -> Result<Vec<ResourceRecord>, ApiError>;

    async fn set_order(&self, id: &str, order: i64) -> Result<(), ApiError>;
}

/// Rejected drag; the list is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("an item cannot be dropped onto itself")]
    SameTarget,

    #[error("resource {0} is not in the list")]
    UnknownId(String),

    #[error("the list has nothing to reorder")]
    TooShort,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReorderError {
    #[error("invalid drag: {0}")]
    Validation(#[from] ValidationError),

    #[error("Failed to save order: {reason}")]
    Persistence { reason: String, reloaded: bool },
}

/// A single `SetOrder` write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderAssignment {
    pub id: String,
    pub order: i64,
}

/// Positions of `dragged` and `target` in `list`, if the drag is meaningful.
pub fn validate_reorder(
    list: &[ResourceRecord],
    dragged_id: &str,
    target_id: &str,
) -> Result<(usize, usize), ValidationError> {
    if list.len() <= 1 {
        return Err(ValidationError::TooShort);
    }
    if dragged_id == target_id {
        return Err(ValidationError::SameTarget);
    }
    let from = list
        .iter()
        .position(|record| record.id == dragged_id)
        .ok_or_else(|| ValidationError::UnknownId(dragged_id.to_string()))?;
    let to = list
        .iter()
        .position(|record| record.id == target_id)
        .ok_or_else(|| ValidationError::UnknownId(target_id.to_string()))?;
    Ok((from, to))
}

/// Moves `dragged_id` to the slot `target_id` occupied. Invalid drags return the list unchanged.
pub fn reorder(list: &[ResourceRecord], dragged_id: &str, target_id: &str) -> Vec<ResourceRecord> {
    let mut reordered = list.to_vec();
    if let Ok((from, to)) = validate_reorder(list, dragged_id, target_id) {
        let moved = reordered.remove(from);
        reordered.insert(to, moved);
    }
    reordered
}

/// Writes needed to make `order` equal each element's index.
pub fn order_changes(list: &[ResourceRecord]) -> Vec<OrderAssignment> {
    list.iter()
        .enumerate()
        .filter(|(index, record)| record.order != *index as i64)
        .map(|(index, record)| OrderAssignment {
            id: record.id.clone(),
            order: index as i64,
        })
        .collect()
}

pub(crate) fn densify(list: &mut [ResourceRecord]) {
    for (index, record) in list.iter_mut().enumerate() {
        record.order = index as i64;
    }
}

pub(crate) fn ids_of(list: &[ResourceRecord]) -> Vec<String> {
    list.iter().map(|record| record.id.clone()).collect()
}
