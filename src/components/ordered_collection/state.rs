use std::collections::VecDeque;

use super::{densify, reorder, validate_reorder, ValidationError};
use crate::api::ResourceRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ReorderRequest {
    pub dragged: String,
    pub target: String,
}

pub(crate) enum Admission {
    Staged(Vec<ResourceRecord>),
    Queued,
}

/// Confirmed list, optional pending layer and the commit queue.
#[derive(Debug, Default)]
pub(crate) struct CollectionState {
    confirmed: Vec<ResourceRecord>,
    pending: Option<Vec<ResourceRecord>>,
    queued: VecDeque<ReorderRequest>,
    in_flight: bool,
    reload_deferred: bool,
}

impl CollectionState {
    pub fn displayed(&self) -> &[ResourceRecord] {
        self.pending.as_deref().unwrap_or(&self.confirmed)
    }

    #[cfg(test)]
    pub fn confirmed(&self) -> &[ResourceRecord] {
        &self.confirmed
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    #[cfg(test)]
    pub fn queued_len(&self) -> usize {
        self.queued.len()
    }

    /// Validates against what the operator sees, then stages or queues.
    pub fn admit(&mut self, dragged: &str, target: &str) -> Result<Admission, ValidationError> {
        validate_reorder(self.displayed(), dragged, target)?;
        let request = ReorderRequest {
            dragged: dragged.to_string(),
            target: target.to_string(),
        };
        if self.in_flight {
            self.queued.push_back(request);
            return Ok(Admission::Queued);
        }
        self.stage(&request).map(Admission::Staged)
    }

    /// Builds the pending layer from the confirmed list.
    pub fn stage(&mut self, request: &ReorderRequest) -> Result<Vec<ResourceRecord>, ValidationError> {
        validate_reorder(&self.confirmed, &request.dragged, &request.target)?;
        let staged = reorder(&self.confirmed, &request.dragged, &request.target);
        self.pending = Some(staged.clone());
        self.in_flight = true;
        Ok(staged)
    }

    pub fn promote(&mut self) -> Vec<ResourceRecord> {
        if let Some(mut pending) = self.pending.take() {
            densify(&mut pending);
            self.confirmed = pending;
        }
        self.confirmed.clone()
    }

    pub fn discard_pending(&mut self) {
        self.pending = None;
    }

    pub fn replace_confirmed(&mut self, records: Vec<ResourceRecord>) {
        self.pending = None;
        self.confirmed = records;
    }

    pub fn next_queued(&mut self) -> Option<ReorderRequest> {
        self.queued.pop_front()
    }

    pub fn defer_reload(&mut self) {
        self.reload_deferred = true;
    }

    pub fn take_deferred_reload(&mut self) -> bool {
        std::mem::take(&mut self.reload_deferred)
    }

    pub fn release(&mut self) {
        self.in_flight = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::ordered_collection::fixtures::list;

    #[test]
    fn staged_layer_is_displayed_but_not_confirmed() {
        let mut state = CollectionState::default();
        state.replace_confirmed(list(&["a", "b", "c"]));

        let Ok(Admission::Staged(staged)) = state.admit("c", "a") else {
            panic!("expected the drag to be staged");
        };
        assert_eq!(staged[0].id, "c");
        assert!(state.is_pending());
        assert_eq!(state.displayed()[0].id, "c");
        assert_eq!(state.confirmed()[0].id, "a");
    }

    #[test]
    fn drops_while_in_flight_are_queued() {
        let mut state = CollectionState::default();
        state.replace_confirmed(list(&["a", "b", "c"]));
        assert!(matches!(state.admit("a", "b"), Ok(Admission::Staged(_))));
        assert!(matches!(state.admit("c", "a"), Ok(Admission::Queued)));
        assert_eq!(state.queued_len(), 1);
        assert_eq!(
            state.next_queued(),
            Some(ReorderRequest {
                dragged: "c".into(),
                target: "a".into()
            })
        );
    }

    #[test]
    fn promote_writes_dense_order() {
        let mut state = CollectionState::default();
        let mut records = list(&["a", "b", "c"]);
        records[0].order = 10;
        records[1].order = 20;
        records[2].order = 30;
        state.replace_confirmed(records);
        assert!(state.admit("c", "a").is_ok());

        let confirmed = state.promote();
        let orders: Vec<i64> = confirmed.iter().map(|r| r.order).collect();
        assert_eq!(orders, [0, 1, 2]);
        assert!(!state.is_pending());
    }
}
