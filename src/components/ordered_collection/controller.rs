use std::cell::RefCell;
use std::rc::Rc;

use futures_util::future::try_join_all;

use super::state::{Admission, CollectionState};
use super::{ids_of, order_changes, ReorderError, ResourceStore, ValidationError};
use crate::api::{ApiError, ResourceFilter, ResourceRecord};
use crate::diagnostics::log_perf;

/// Notifications for the surrounding page.
#[derive(Debug, Clone, PartialEq)]
pub enum ReorderEvent {
    /// A commit started; ids in their pending order.
    Pending(Vec<String>),
    /// `onReorderCommitted`: ids in their new confirmed order.
    Committed(Vec<String>),
    /// `onReorderFailed`.
    Failed(String),
    /// The list was replaced from the source of truth.
    Reloaded(Vec<ResourceRecord>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReorderOutcome {
    Queued,
    Committed(Vec<ResourceRecord>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    Reloaded(Vec<ResourceRecord>),
    /// A commit is in flight; the reload runs once the queue drains.
    Deferred,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectionView {
    pub records: Vec<ResourceRecord>,
    pub is_pending: bool,
}

type Listener = Rc<dyn Fn(&ReorderEvent)>;

pub struct OrderedCollectionController<S> {
    store: S,
    filter: RefCell<ResourceFilter>,
    state: RefCell<CollectionState>,
    listeners: RefCell<Vec<Listener>>,
}

impl<S: ResourceStore> OrderedCollectionController<S> {
    pub fn new(store: S, filter: ResourceFilter) -> Self {
        Self {
            store,
            filter: RefCell::new(filter),
            state: RefCell::new(CollectionState::default()),
            listeners: RefCell::new(Vec::new()),
        }
    }

    #[cfg(test)]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Takes effect on the next reload.
    pub fn set_filter(&self, filter: ResourceFilter) {
        *self.filter.borrow_mut() = filter;
    }

    pub fn on_event(&self, listener: impl Fn(&ReorderEvent) + 'static) {
        self.listeners.borrow_mut().push(Rc::new(listener));
    }

    fn emit(&self, event: ReorderEvent) {
        let listeners = self.listeners.borrow().clone();
        for listener in listeners {
            listener(&event);
        }
    }

    pub fn view(&self) -> CollectionView {
        let state = self.state.borrow();
        CollectionView {
            records: state.displayed().to_vec(),
            is_pending: state.is_pending(),
        }
    }

    #[cfg(test)]
    pub fn is_in_flight(&self) -> bool {
        self.state.borrow().in_flight()
    }

    pub async fn hydrate(&self) -> Result<RefreshOutcome, ApiError> {
        self.refresh().await
    }

    pub async fn refresh(&self) -> Result<RefreshOutcome, ApiError> {
        if self.state.borrow().in_flight() {
            self.state.borrow_mut().defer_reload();
            tracing::debug!("refresh deferred until the reorder queue drains");
            return Ok(RefreshOutcome::Deferred);
        }
        self.reload().await.map(RefreshOutcome::Reloaded)
    }

    async fn reload(&self) -> Result<Vec<ResourceRecord>, ApiError> {
        let started_at = chrono::Utc::now();
        let filter = self.filter.borrow().clone();
        let records = self.store.list_resources(&filter).await?;
        self.state.borrow_mut().replace_confirmed(records.clone());
        log_perf("collection.reload", started_at, &format!("{} records", records.len()));
        self.emit(ReorderEvent::Reloaded(records.clone()));
        Ok(records)
    }

    /// Applies a drop of `dragged_id` onto `target_id` and persists it.
    ///
    /// Returns `Queued` immediately when another commit is in flight; the queued drop is
    /// committed by the in-flight caller and reported through [`ReorderEvent`]s.
    pub async fn commit_reorder(
        &self,
        dragged_id: &str,
        target_id: &str,
    ) -> Result<ReorderOutcome, ReorderError> {
        let admission = self.state.borrow_mut().admit(dragged_id, target_id)?;
        let staged = match admission {
            Admission::Queued => {
                tracing::debug!("reorder {dragged_id} -> {target_id} queued behind in-flight commit");
                return Ok(ReorderOutcome::Queued);
            }
            Admission::Staged(staged) => staged,
        };

        let outcome = self.persist(staged).await;
        self.drain_queue().await;
        outcome
    }

    async fn persist(&self, staged: Vec<ResourceRecord>) -> Result<ReorderOutcome, ReorderError> {
        let started_at = chrono::Utc::now();
        self.emit(ReorderEvent::Pending(ids_of(&staged)));

        let changes = order_changes(&staged);
        let writes = changes
            .iter()
            .map(|change| self.store.set_order(&change.id, change.order));

        match try_join_all(writes).await {
            Ok(_) => {
                let confirmed = self.state.borrow_mut().promote();
                log_perf(
                    "collection.commit",
                    started_at,
                    &format!("{} writes", changes.len()),
                );
                self.emit(ReorderEvent::Committed(ids_of(&confirmed)));
                Ok(ReorderOutcome::Committed(confirmed))
            }
            Err(err) => Err(self.recover(err.to_string()).await),
        }
    }

    /// Drops the pending layer and replaces the list from the source of truth.
    async fn recover(&self, reason: String) -> ReorderError {
        self.state.borrow_mut().discard_pending();
        tracing::warn!("reorder commit failed: {reason}");

        let reloaded = match self.reload().await {
            Ok(_) => true,
            Err(err) => {
                tracing::warn!("reload after failed reorder also failed: {err}");
                false
            }
        };

        self.emit(ReorderEvent::Failed(reason.clone()));
        ReorderError::Persistence { reason, reloaded }
    }

    async fn drain_queue(&self) {
        loop {
            let next = self.state.borrow_mut().next_queued();
            if let Some(request) = next {
                let staged = self.state.borrow_mut().stage(&request);
                match staged {
                    Ok(staged) => {
                        let _ = self.persist(staged).await;
                    }
                    Err(ValidationError::UnknownId(id)) => {
                        let _ = self
                            .recover(format!("resource {id} is no longer in the list"))
                            .await;
                    }
                    Err(err) => tracing::debug!("dropping queued reorder: {err}"),
                }
                continue;
            }

            let reload = self.state.borrow_mut().take_deferred_reload();
            if reload {
                if let Err(err) = self.reload().await {
                    tracing::warn!("deferred refresh failed: {err}");
                }
                continue;
            }

            self.state.borrow_mut().release();
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::ordered_collection::fixtures::{audio, list};
    use std::cell::Cell;
    use std::collections::HashSet;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct FakeStore {
        server: RefCell<Vec<ResourceRecord>>,
        writes: RefCell<Vec<(String, i64)>>,
        fail_on: RefCell<Option<String>>,
        gate: RefCell<Option<Rc<Notify>>>,
        list_calls: Cell<usize>,
    }

    impl FakeStore {
        fn with(records: Vec<ResourceRecord>) -> Self {
            Self {
                server: RefCell::new(records),
                ..Default::default()
            }
        }

        fn hold_next_write(&self, gate: Rc<Notify>) {
            *self.gate.borrow_mut() = Some(gate);
        }

        fn fail_writes_to(&self, id: &str) {
            *self.fail_on.borrow_mut() = Some(id.to_string());
        }

        fn writes(&self) -> Vec<(String, i64)> {
            self.writes.borrow().clone()
        }
    }

    impl ResourceStore for FakeStore {
        async fn list_resources(
            &self,
            _filter: &ResourceFilter,
        ) -> Result<Vec<ResourceRecord>, ApiError> {
            self.list_calls.set(self.list_calls.get() + 1);
            let mut records = self.server.borrow().clone();
            records.sort_by_key(|record| record.order);
            Ok(records)
        }

        async fn set_order(&self, id: &str, order: i64) -> Result<(), ApiError> {
            let gate = self.gate.borrow_mut().take();
            if let Some(gate) = gate {
                gate.notified().await;
            }
            self.writes.borrow_mut().push((id.to_string(), order));
            if self.fail_on.borrow().as_deref() == Some(id) {
                return Err(ApiError::Status {
                    endpoint: format!("SetOrder({id})"),
                    status: 500,
                });
            }
            let mut server = self.server.borrow_mut();
            let Some(record) = server.iter_mut().find(|r| r.id == id) else {
                return Err(ApiError::Status {
                    endpoint: format!("SetOrder({id})"),
                    status: 404,
                });
            };
            record.order = order;
            Ok(())
        }
    }

    fn ids(records: &[ResourceRecord]) -> Vec<&str> {
        records.iter().map(|r| r.id.as_str()).collect()
    }

    fn recorder<S: ResourceStore>(
        controller: &OrderedCollectionController<S>,
    ) -> Rc<RefCell<Vec<ReorderEvent>>> {
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        controller.on_event(move |event| sink.borrow_mut().push(event.clone()));
        events
    }

    #[tokio::test]
    async fn successful_commit_confirms_dense_order() {
        let controller = OrderedCollectionController::new(
            FakeStore::with(list(&["a", "b", "c", "d"])),
            ResourceFilter::default(),
        );
        controller.hydrate().await.unwrap();
        let events = recorder(&controller);

        let outcome = controller.commit_reorder("a", "c").await.unwrap();
        let ReorderOutcome::Committed(confirmed) = outcome else {
            panic!("expected a committed outcome");
        };
        assert_eq!(ids(&confirmed), ["b", "c", "a", "d"]);

        let view = controller.view();
        assert!(!view.is_pending);
        let orders: Vec<i64> = view.records.iter().map(|r| r.order).collect();
        assert_eq!(orders, [0, 1, 2, 3]);

        // d kept its slot, so it is never written
        let written: HashSet<_> = controller.store().writes().into_iter().collect();
        let expected: HashSet<_> = [("b".to_string(), 0), ("c".to_string(), 1), ("a".to_string(), 2)]
            .into_iter()
            .collect();
        assert_eq!(written, expected);

        assert_eq!(
            events.borrow().last(),
            Some(&ReorderEvent::Committed(vec![
                "b".into(),
                "c".into(),
                "a".into(),
                "d".into()
            ]))
        );
    }

    #[tokio::test]
    async fn failed_commit_shows_the_reloaded_list() {
        let store = FakeStore::with(list(&["a", "b", "c"]));
        let controller = OrderedCollectionController::new(store, ResourceFilter::default());
        controller.hydrate().await.unwrap();

        // someone else adds a record while we drag
        controller.store().server.borrow_mut().push(audio("z", 3));
        controller.store().fail_writes_to("a");
        let events = recorder(&controller);

        let err = controller.commit_reorder("c", "a").await.unwrap_err();
        assert!(matches!(err, ReorderError::Persistence { reloaded: true, .. }));

        let view = controller.view();
        assert!(!view.is_pending);
        let fresh = controller
            .store()
            .list_resources(&ResourceFilter::default())
            .await
            .unwrap();
        assert_eq!(view.records, fresh);
        assert!(ids(&view.records).contains(&"z"));

        let events = events.borrow();
        assert!(matches!(events.first(), Some(ReorderEvent::Pending(_))));
        assert!(matches!(events.last(), Some(ReorderEvent::Failed(_))));
    }

    #[tokio::test]
    async fn invalid_drop_is_rejected_without_touching_state() {
        let controller = OrderedCollectionController::new(
            FakeStore::with(list(&["a", "b"])),
            ResourceFilter::default(),
        );
        controller.hydrate().await.unwrap();
        let before = controller.view();

        let err = controller.commit_reorder("a", "missing").await.unwrap_err();
        assert_eq!(
            err,
            ReorderError::Validation(ValidationError::UnknownId("missing".into()))
        );
        assert_eq!(controller.view(), before);
        assert!(controller.store().writes().is_empty());
        assert!(!controller.is_in_flight());
    }

    #[tokio::test]
    async fn second_drop_waits_for_the_first_commit() {
        let controller = OrderedCollectionController::new(
            FakeStore::with(list(&["a", "b", "c", "d"])),
            ResourceFilter::default(),
        );
        controller.hydrate().await.unwrap();
        let gate = Rc::new(Notify::new());
        controller.store().hold_next_write(gate.clone());

        let first = controller.commit_reorder("a", "c");
        let second = async {
            tokio::task::yield_now().await;
            assert!(controller.is_in_flight());
            assert!(controller.view().is_pending);
            let outcome = controller.commit_reorder("d", "a").await;
            gate.notify_one();
            outcome
        };
        let (first, second) = futures_util::join!(first, second);

        assert!(matches!(first, Ok(ReorderOutcome::Committed(_))));
        assert_eq!(second, Ok(ReorderOutcome::Queued));

        let writes = controller.store().writes();
        assert_eq!(writes.len(), 5);
        let first_batch: HashSet<_> = writes[..3].iter().cloned().collect();
        let expected: HashSet<_> = [("b".to_string(), 0), ("c".to_string(), 1), ("a".to_string(), 2)]
            .into_iter()
            .collect();
        assert_eq!(first_batch, expected);
        let second_batch: HashSet<_> = writes[3..].iter().cloned().collect();
        let expected: HashSet<_> = [("d".to_string(), 2), ("a".to_string(), 3)]
            .into_iter()
            .collect();
        assert_eq!(second_batch, expected);

        let view = controller.view();
        assert_eq!(ids(&view.records), ["b", "c", "d", "a"]);
        assert!(!controller.is_in_flight());
    }

    #[tokio::test]
    async fn queued_drop_of_a_deleted_record_reloads() {
        let controller = OrderedCollectionController::new(
            FakeStore::with(list(&["a", "b", "c"])),
            ResourceFilter::default(),
        );
        controller.hydrate().await.unwrap();
        let events = recorder(&controller);
        let gate = Rc::new(Notify::new());
        controller.store().hold_next_write(gate.clone());

        let first = controller.commit_reorder("a", "b");
        let second = async {
            tokio::task::yield_now().await;
            let outcome = controller.commit_reorder("c", "a").await;
            controller.store().server.borrow_mut().retain(|r| r.id != "c");
            gate.notify_one();
            outcome
        };
        let (first, second) = futures_util::join!(first, second);
        assert!(first.is_ok());
        assert_eq!(second, Ok(ReorderOutcome::Queued));

        let view = controller.view();
        assert!(!view.is_pending);
        assert_eq!(ids(&view.records), ["b", "a"]);
        assert!(!controller.is_in_flight());

        let events = events.borrow();
        assert!(events
            .iter()
            .any(|event| matches!(event, ReorderEvent::Committed(_))));
        assert!(matches!(events.last(), Some(ReorderEvent::Failed(_))));
    }

    #[tokio::test]
    async fn queued_drop_is_rechecked_against_the_reloaded_list() {
        let controller = OrderedCollectionController::new(
            FakeStore::with(list(&["a", "b", "c"])),
            ResourceFilter::default(),
        );
        controller.hydrate().await.unwrap();
        let events = recorder(&controller);
        let gate = Rc::new(Notify::new());
        controller.store().hold_next_write(gate.clone());
        controller.store().fail_writes_to("b");

        let first = controller.commit_reorder("a", "b");
        let second = async {
            tokio::task::yield_now().await;
            let outcome = controller.commit_reorder("c", "a").await;
            controller.store().server.borrow_mut().retain(|r| r.id != "c");
            gate.notify_one();
            outcome
        };
        let (first, second) = futures_util::join!(first, second);
        assert!(matches!(first, Err(ReorderError::Persistence { .. })));
        assert_eq!(second, Ok(ReorderOutcome::Queued));

        let failures = events
            .borrow()
            .iter()
            .filter(|event| matches!(event, ReorderEvent::Failed(_)))
            .count();
        assert_eq!(failures, 2);
        assert_eq!(ids(&controller.view().records), ["a", "b"]);
        assert!(!controller.is_in_flight());
    }

    #[tokio::test]
    async fn refresh_during_commit_is_deferred() {
        let controller = OrderedCollectionController::new(
            FakeStore::with(list(&["a", "b"])),
            ResourceFilter::default(),
        );
        controller.hydrate().await.unwrap();
        let gate = Rc::new(Notify::new());
        controller.store().hold_next_write(gate.clone());

        let commit = controller.commit_reorder("b", "a");
        let refresh = async {
            tokio::task::yield_now().await;
            let outcome = controller.refresh().await;
            gate.notify_one();
            outcome
        };
        let (commit, refresh) = futures_util::join!(commit, refresh);
        assert!(commit.is_ok());
        assert_eq!(refresh, Ok(RefreshOutcome::Deferred));
        // hydrate + the deferred reload
        assert_eq!(controller.store().list_calls.get(), 2);
        assert_eq!(ids(&controller.view().records), ["b", "a"]);
    }
}
