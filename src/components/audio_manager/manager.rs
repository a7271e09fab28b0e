use std::collections::HashSet;
use std::rc::Rc;

use super::media::{MediaBackend, MediaError, MediaHandle, MediaSignal};
use super::registry::MediaHandleRegistry;
use super::resolve::{
    resolve_descriptor, LinkedAudio, OriginProvider, PlaybackDescriptor, ResolutionError,
};
use super::session::{
    PlaybackErrorKind, PlaybackSession, PlaybackStateChanged, SessionKey, SessionTable, Transition,
};
use crate::api::ResourceRecord;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlaybackError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error("{}", .0.message())]
    Playback(PlaybackErrorKind),

    #[error(transparent)]
    Handle(#[from] MediaError),
}

/// URL to check for reachability once playback has started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeRequest {
    pub key: SessionKey,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleOutcome {
    Started { probe: ProbeRequest },
    Stopped,
}

pub type StateObserver = Rc<dyn Fn(&PlaybackStateChanged)>;

/// At most one session is loading or playing at a time.
///
/// Observers run synchronously while the manager is mutably borrowed and
/// must not call back into it.
pub struct PlaybackSessionManager<B: MediaBackend> {
    registry: MediaHandleRegistry<B>,
    table: SessionTable,
    origin: Rc<dyn OriginProvider>,
    candidates: Vec<LinkedAudio>,
    observers: Vec<StateObserver>,
}

impl<B: MediaBackend> PlaybackSessionManager<B> {
    pub fn new(backend: B, origin: Rc<dyn OriginProvider>) -> Self {
        Self {
            registry: MediaHandleRegistry::new(backend),
            table: SessionTable::default(),
            origin,
            candidates: Vec::new(),
            observers: Vec::new(),
        }
    }

    #[cfg(test)]
    pub fn registry(&self) -> &MediaHandleRegistry<B> {
        &self.registry
    }

    pub fn on_state_changed(&mut self, observer: StateObserver) {
        self.observers.push(observer);
    }

    pub fn set_candidates(&mut self, candidates: Vec<LinkedAudio>) {
        self.candidates = candidates;
    }

    /// Adds or replaces candidates by id.
    pub fn extend_candidates(&mut self, extra: impl IntoIterator<Item = LinkedAudio>) {
        for audio in extra {
            match self.candidates.iter_mut().find(|known| known.id == audio.id) {
                Some(known) => *known = audio,
                None => self.candidates.push(audio),
            }
        }
    }

    pub fn candidates(&self) -> &[LinkedAudio] {
        &self.candidates
    }

    pub fn session(&self, key: &SessionKey) -> Option<&PlaybackSession> {
        self.table.get(key)
    }

    pub fn active_sessions(&self) -> Vec<SessionKey> {
        self.table.live_keys()
    }

    pub fn handle_position(&self, key: &SessionKey) -> Option<f64> {
        self.registry.get(key).map(MediaHandle::position)
    }

    /// Stops `key` when it is the live session, otherwise makes it the live session.
    pub fn toggle(
        &mut self,
        key: SessionKey,
        descriptor: &PlaybackDescriptor,
    ) -> Result<ToggleOutcome, PlaybackError> {
        if self.table.active_key() == Some(&key) {
            self.stop(&key);
            return Ok(ToggleOutcome::Stopped);
        }

        let origin = self.origin.current_origin();
        let source = resolve_descriptor(descriptor, &self.candidates, origin.as_deref())
            .inspect_err(|err| tracing::warn!("[audio] cannot play {key}: {err}"))?;

        // creating a handle loads nothing; other sessions stay untouched on failure
        self.registry
            .get_or_create(&key)
            .inspect_err(|err| tracing::warn!("[audio] cannot play {key}: {err}"))?;
        self.release_others(&key);

        self.registry.set_source(&key, &source.url);
        let changes = self.table.apply(
            &key,
            Transition::Begin {
                resolved_url: source.url.clone(),
                title: source.title,
            },
        );
        self.emit(changes);

        let started = match self.registry.get(&key) {
            Some(handle) => start_playback(handle),
            None => Err(PlaybackErrorKind::Unknown),
        };
        if let Err(kind) = started {
            self.fail(&key, kind);
            return Err(PlaybackError::Playback(kind));
        }

        tracing::debug!("[audio] started {key} from {}", source.url);
        Ok(ToggleOutcome::Started {
            probe: ProbeRequest { key, url: source.url },
        })
    }

    /// Feeds an asynchronous handle notification. Signals for sessions that
    /// are no longer live are dropped.
    pub fn handle_signal(&mut self, key: &SessionKey, signal: MediaSignal) {
        if !self.table.is_live(key) {
            tracing::debug!("[audio] ignoring {signal:?} for inactive {key}");
            return;
        }
        match signal {
            MediaSignal::Ready => {
                let changes = self.table.apply(key, Transition::Ready);
                self.emit(changes);
            }
            MediaSignal::Ended => {
                let changes = self.table.apply(key, Transition::Ended);
                self.registry.dispose(key);
                self.emit(changes);
            }
            MediaSignal::Failed(kind) => self.fail(key, kind),
        }
    }

    /// Applies a reachability result. `None` is inconclusive and ignored; an
    /// unreachable URL only fails the session if it is still playing it.
    pub fn report_probe(&mut self, probe: &ProbeRequest, reachable: Option<bool>) {
        if reachable != Some(false) {
            return;
        }
        let current = self
            .table
            .get(&probe.key)
            .is_some_and(|session| session.state.is_live() && session.resolved_url == probe.url);
        if current {
            tracing::warn!("[audio] {} is unreachable", probe.url);
            self.fail(&probe.key, PlaybackErrorKind::NetworkOrMissing);
        }
    }

    /// Disposes direct sessions whose resource left the list. Linked sessions
    /// are kept. Returns the pruned keys.
    pub fn prune(&mut self, records: &[ResourceRecord]) -> Vec<SessionKey> {
        let present: HashSet<&str> = records.iter().map(|record| record.id.as_str()).collect();
        let stale: Vec<SessionKey> = self
            .table
            .keys()
            .into_iter()
            .filter(|key| matches!(key, SessionKey::Direct(id) if !present.contains(id.as_str())))
            .collect();
        for key in &stale {
            self.dispose(key);
        }
        stale
    }

    pub fn dispose(&mut self, key: &SessionKey) {
        self.registry.dispose(key);
        let changes = self.table.apply(key, Transition::Forget);
        self.emit(changes);
    }

    /// Releases every handle. Observers are detached first; the page is going away.
    pub fn teardown(&mut self) {
        self.observers.clear();
        for key in self.table.keys() {
            self.dispose(&key);
        }
        self.registry.dispose_all();
    }

    /// Stops the live session and disposes every handle except `keep`'s.
    fn release_others(&mut self, keep: &SessionKey) {
        if let Some(active) = self.table.active_key().filter(|active| *active != keep).cloned() {
            self.stop(&active);
        }
        for key in self.registry.keys() {
            if &key != keep {
                self.registry.dispose(&key);
            }
        }
    }

    /// Pauses and rewinds; the handle is kept for the next toggle of `key`.
    fn stop(&mut self, key: &SessionKey) {
        if let Some(handle) = self.registry.get(key) {
            handle.pause();
            handle.seek(0.0);
        }
        let changes = self.table.apply(key, Transition::Stop);
        self.emit(changes);
    }

    fn fail(&mut self, key: &SessionKey, kind: PlaybackErrorKind) {
        tracing::warn!("[audio] {key} failed: {kind:?}");
        let mut changes = self.table.apply(key, Transition::Fail(kind));
        changes.extend(self.table.apply(key, Transition::Settle));
        self.registry.dispose(key);
        self.emit(changes);
    }

    fn emit(&self, changes: Vec<PlaybackStateChanged>) {
        for change in changes {
            tracing::debug!("[audio] {} -> {}", change.key, change.state.label());
            for observer in &self.observers {
                observer(&change);
            }
        }
    }
}

/// Calls `play()`, retrying once if the handle stays paused.
fn start_playback<H: MediaHandle>(handle: &H) -> Result<(), PlaybackErrorKind> {
    handle.play()?;
    if handle.is_paused() {
        tracing::debug!("[audio] handle still paused after play(), retrying");
        handle.play()?;
        if handle.is_paused() {
            return Err(PlaybackErrorKind::NotAllowed);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::api::ResourceKind;
    use crate::components::audio_manager::headless::{HeadlessBackend, HeadlessPolicy, MediaOp};
    use crate::components::audio_manager::resolve::{candidates_from, SharedOrigin};
    use crate::components::audio_manager::session::SessionState;
    use crate::components::ordered_collection::fixtures::{audio, list};

    struct Harness {
        manager: PlaybackSessionManager<HeadlessBackend>,
        origin: SharedOrigin,
        changes: Rc<RefCell<Vec<PlaybackStateChanged>>>,
    }

    fn harness() -> Harness {
        let origin = SharedOrigin::new("https://admin.test");
        let mut manager =
            PlaybackSessionManager::new(HeadlessBackend::default(), Rc::new(origin.clone()));
        let changes = Rc::new(RefCell::new(Vec::new()));
        let sink = changes.clone();
        manager.on_state_changed(Rc::new(move |change: &PlaybackStateChanged| {
            sink.borrow_mut().push(change.clone())
        }));
        Harness {
            manager,
            origin,
            changes,
        }
    }

    fn direct(id: &str) -> (SessionKey, PlaybackDescriptor) {
        let record = audio(id, 0);
        (
            SessionKey::Direct(id.to_string()),
            PlaybackDescriptor::for_record(&record),
        )
    }

    fn image(id: &str, linked: &str) -> ResourceRecord {
        ResourceRecord {
            kind: ResourceKind::Image,
            linked_audio_id: Some(linked.to_string()),
            ..audio(id, 0)
        }
    }

    #[test]
    fn starting_a_second_session_stops_the_first() {
        let mut h = harness();
        let (first, first_desc) = direct("audio-1");
        let (second, second_desc) = direct("audio-2");

        h.manager.toggle(first.clone(), &first_desc).unwrap();
        h.manager.handle_signal(&first, MediaSignal::Ready);
        h.manager.registry().get(&first).unwrap().seek(42.0);
        h.manager.toggle(second.clone(), &second_desc).unwrap();

        assert_eq!(h.manager.active_sessions(), vec![second.clone()]);
        assert_eq!(h.manager.session(&first).unwrap().state, SessionState::Idle);
        assert_eq!(h.manager.handle_position(&first), None);
        assert_eq!(h.manager.registry().len(), 1);
        let released = h.manager.registry().backend().media(&first).unwrap();
        assert!(released.paused);
        assert_eq!(released.src, None);

        let ops = h.manager.registry().backend().ops();
        let first_rewound = ops
            .iter()
            .position(|(key, op)| key == &first && *op == MediaOp::Seek(0.0))
            .unwrap();
        let second_loaded = ops
            .iter()
            .position(|(key, op)| key == &second && *op == MediaOp::Reload)
            .unwrap();
        assert!(first_rewound < second_loaded);
    }

    #[test]
    fn toggling_twice_returns_to_idle_at_the_start() {
        let mut h = harness();
        let (key, descriptor) = direct("audio-1");

        let outcome = h.manager.toggle(key.clone(), &descriptor).unwrap();
        assert!(matches!(outcome, ToggleOutcome::Started { .. }));
        h.manager.handle_signal(&key, MediaSignal::Ready);
        h.manager.registry().get(&key).unwrap().seek(12.5);

        assert_eq!(
            h.manager.toggle(key.clone(), &descriptor).unwrap(),
            ToggleOutcome::Stopped
        );
        assert_eq!(h.manager.session(&key).unwrap().state, SessionState::Idle);
        assert_eq!(h.manager.handle_position(&key), Some(0.0));
        assert!(h.manager.registry().contains(&key));

        let states: Vec<SessionState> = h.changes.borrow().iter().map(|c| c.state).collect();
        assert_eq!(
            states,
            [SessionState::Loading, SessionState::Playing, SessionState::Idle]
        );
    }

    #[test]
    fn linked_audio_plays_from_the_page_origin() {
        let mut h = harness();
        h.manager.set_candidates(candidates_from(&[audio("a1", 0)]));
        let owner = image("img-1", "a1");
        let key = SessionKey::for_record(&owner).unwrap();

        let outcome = h
            .manager
            .toggle(key.clone(), &PlaybackDescriptor::for_record(&owner))
            .unwrap();

        let ToggleOutcome::Started { probe } = outcome else {
            panic!("expected playback to start");
        };
        assert_eq!(probe.url, "https://admin.test/audio/a1.mp3");
        assert_eq!(key, SessionKey::Linked("img-1".into(), "a1".into()));
    }

    #[test]
    fn unresolvable_link_creates_no_handle_and_keeps_the_active_session() {
        let mut h = harness();
        let (playing, playing_desc) = direct("audio-1");
        h.manager.toggle(playing.clone(), &playing_desc).unwrap();

        let owner = image("img-1", "missing");
        let key = SessionKey::for_record(&owner).unwrap();
        let result = h.manager.toggle(key.clone(), &PlaybackDescriptor::for_record(&owner));

        assert_eq!(
            result,
            Err(PlaybackError::Resolution(ResolutionError::Unresolved("missing".into())))
        );
        assert!(!h.manager.registry().contains(&key));
        assert_eq!(h.manager.active_sessions(), vec![playing]);
    }

    #[test]
    fn origin_is_read_when_play_is_clicked() {
        let mut h = harness();
        let (key, descriptor) = direct("a1");
        h.origin.set("https://moved.test");

        let Ok(ToggleOutcome::Started { probe }) = h.manager.toggle(key, &descriptor) else {
            panic!("expected playback to start");
        };
        assert_eq!(probe.url, "https://moved.test/audio/a1.mp3");
    }

    #[test]
    fn paused_handle_is_retried_once() {
        let mut h = harness();
        h.manager.registry().backend().set_policy(HeadlessPolicy {
            paused_attempts: 1,
            ..HeadlessPolicy::default()
        });
        let (key, descriptor) = direct("a1");
        assert!(h.manager.toggle(key.clone(), &descriptor).is_ok());

        let plays = h
            .manager
            .registry()
            .backend()
            .ops()
            .into_iter()
            .filter(|(_, op)| *op == MediaOp::Play)
            .count();
        assert_eq!(plays, 2);
    }

    #[test]
    fn blocked_autoplay_fails_and_disposes_the_handle() {
        let mut h = harness();
        h.manager.registry().backend().set_policy(HeadlessPolicy {
            block_autoplay: true,
            ..HeadlessPolicy::default()
        });
        let (key, descriptor) = direct("a1");

        let result = h.manager.toggle(key.clone(), &descriptor);
        assert_eq!(result, Err(PlaybackError::Playback(PlaybackErrorKind::NotAllowed)));
        let session = h.manager.session(&key).unwrap();
        assert_eq!(session.state, SessionState::Idle);
        assert_eq!(session.error_kind, Some(PlaybackErrorKind::NotAllowed));
        assert!(!h.manager.registry().contains(&key));

        let states: Vec<SessionState> = h.changes.borrow().iter().map(|c| c.state).collect();
        assert_eq!(
            states,
            [SessionState::Loading, SessionState::Error, SessionState::Idle]
        );
    }

    #[test]
    fn stale_probe_results_are_ignored() {
        let mut h = harness();
        let (first, first_desc) = direct("a1");
        let (second, second_desc) = direct("a2");

        let Ok(ToggleOutcome::Started { probe }) = h.manager.toggle(first.clone(), &first_desc) else {
            panic!("expected playback to start");
        };
        h.manager.toggle(second.clone(), &second_desc).unwrap();
        h.manager.report_probe(&probe, Some(false));

        assert_eq!(h.manager.session(&first).unwrap().error_kind, None);
        assert_eq!(h.manager.active_sessions(), vec![second]);
    }

    #[test]
    fn unreachable_source_fails_the_live_session() {
        let mut h = harness();
        let (key, descriptor) = direct("a1");
        let Ok(ToggleOutcome::Started { probe }) = h.manager.toggle(key.clone(), &descriptor) else {
            panic!("expected playback to start");
        };

        h.manager.report_probe(&probe, Some(false));
        assert_eq!(
            h.manager.session(&key).unwrap().error_kind,
            Some(PlaybackErrorKind::NetworkOrMissing)
        );
        assert!(h.manager.active_sessions().is_empty());
    }

    #[test]
    fn inconclusive_reachability_keeps_playing() {
        let mut h = harness();
        let (key, descriptor) = direct("a1");
        let Ok(ToggleOutcome::Started { probe }) = h.manager.toggle(key.clone(), &descriptor) else {
            panic!("expected playback to start");
        };
        h.manager.handle_signal(&key, MediaSignal::Ready);

        h.manager.report_probe(&probe, None);
        h.manager.report_probe(&probe, Some(true));

        let session = h.manager.session(&key).unwrap();
        assert_eq!(session.state, SessionState::Playing);
        assert_eq!(session.error_kind, None);
        assert!(h.manager.registry().contains(&key));
    }

    #[test]
    fn switching_sessions_keeps_a_single_handle() {
        let mut h = harness();
        let mut last = None;
        for index in 0..50 {
            let (key, descriptor) = direct(&format!("a{index}"));
            h.manager.toggle(key.clone(), &descriptor).unwrap();
            h.manager.handle_signal(&key, MediaSignal::Ready);
            last = Some(key);
        }
        let last = last.unwrap();
        assert_eq!(h.manager.registry().len(), 1);
        assert!(h.manager.registry().contains(&last));
        assert_eq!(h.manager.registry().backend().created(), 50);
    }

    #[test]
    fn stopped_handle_is_released_when_another_session_starts() {
        let mut h = harness();
        let (first, first_desc) = direct("a1");
        let (second, second_desc) = direct("a2");

        h.manager.toggle(first.clone(), &first_desc).unwrap();
        h.manager.toggle(first.clone(), &first_desc).unwrap();
        assert!(h.manager.registry().contains(&first));

        h.manager.toggle(second.clone(), &second_desc).unwrap();
        assert!(!h.manager.registry().contains(&first));
        assert_eq!(h.manager.active_sessions(), vec![second]);
    }

    #[test]
    fn natural_end_returns_to_idle_and_releases_the_handle() {
        let mut h = harness();
        let (key, descriptor) = direct("a1");
        h.manager.toggle(key.clone(), &descriptor).unwrap();
        h.manager.handle_signal(&key, MediaSignal::Ready);

        h.manager.handle_signal(&key, MediaSignal::Ended);

        let session = h.manager.session(&key).unwrap();
        assert_eq!(session.state, SessionState::Idle);
        assert_eq!(session.error_kind, None);
        assert!(h.manager.active_sessions().is_empty());
        assert!(h.manager.registry().is_empty());

        // the next click starts again from a fresh handle
        let outcome = h.manager.toggle(key.clone(), &descriptor).unwrap();
        assert!(matches!(outcome, ToggleOutcome::Started { .. }));
        assert_eq!(h.manager.registry().backend().created(), 2);
    }

    #[test]
    fn media_error_settles_with_its_kind_and_disposes_the_handle() {
        let mut h = harness();
        let (key, descriptor) = direct("a1");
        h.manager.toggle(key.clone(), &descriptor).unwrap();
        h.manager.handle_signal(&key, MediaSignal::Ready);

        h.manager
            .handle_signal(&key, MediaSignal::Failed(PlaybackErrorKind::Unsupported));

        let session = h.manager.session(&key).unwrap();
        assert_eq!(session.state, SessionState::Idle);
        assert_eq!(session.error_kind, Some(PlaybackErrorKind::Unsupported));
        assert!(h.manager.active_sessions().is_empty());
        assert!(!h.manager.registry().contains(&key));

        let states: Vec<SessionState> = h.changes.borrow().iter().map(|c| c.state).collect();
        assert_eq!(
            states,
            [
                SessionState::Loading,
                SessionState::Playing,
                SessionState::Error,
                SessionState::Idle
            ]
        );
    }

    #[test]
    fn rejected_play_fails_immediately() {
        let mut h = harness();
        h.manager.registry().backend().set_policy(HeadlessPolicy {
            reject_with: Some(PlaybackErrorKind::NetworkOrMissing),
            ..HeadlessPolicy::default()
        });
        let (key, descriptor) = direct("a1");

        let result = h.manager.toggle(key.clone(), &descriptor);
        assert_eq!(
            result,
            Err(PlaybackError::Playback(PlaybackErrorKind::NetworkOrMissing))
        );
        let session = h.manager.session(&key).unwrap();
        assert_eq!(session.state, SessionState::Idle);
        assert_eq!(session.error_kind, Some(PlaybackErrorKind::NetworkOrMissing));
        assert!(!h.manager.registry().contains(&key));
    }

    #[test]
    fn unavailable_handle_keeps_the_active_session() {
        let mut h = harness();
        let (playing, playing_desc) = direct("a1");
        h.manager.toggle(playing.clone(), &playing_desc).unwrap();
        h.manager.handle_signal(&playing, MediaSignal::Ready);
        h.manager.registry().backend().set_policy(HeadlessPolicy {
            unavailable: true,
            ..HeadlessPolicy::default()
        });

        let (key, descriptor) = direct("a2");
        let result = h.manager.toggle(key.clone(), &descriptor);

        assert!(matches!(result, Err(PlaybackError::Handle(_))));
        assert!(h.manager.session(&key).is_none());
        assert_eq!(h.manager.active_sessions(), vec![playing.clone()]);
        assert!(!h.manager.registry().backend().media(&playing).unwrap().paused);
    }

    #[test]
    fn prune_keeps_linked_sessions() {
        let mut h = harness();
        h.manager.set_candidates(candidates_from(&[audio("a1", 0)]));
        let owner = image("img-1", "a1");
        let linked = SessionKey::for_record(&owner).unwrap();
        let (gone, gone_desc) = direct("gone");

        h.manager.toggle(gone.clone(), &gone_desc).unwrap();
        h.manager
            .toggle(linked.clone(), &PlaybackDescriptor::for_record(&owner))
            .unwrap();

        let pruned = h.manager.prune(&list(&["a1", "a2"]));
        assert_eq!(pruned, vec![gone.clone()]);
        assert!(h.manager.session(&gone).is_none());
        assert!(!h.manager.registry().contains(&gone));
        assert_eq!(h.manager.active_sessions(), vec![linked]);
    }

    #[test]
    fn prune_stops_a_playing_resource_that_left_the_list() {
        let mut h = harness();
        let (key, descriptor) = direct("a2");
        h.manager.toggle(key.clone(), &descriptor).unwrap();
        h.manager.handle_signal(&key, MediaSignal::Ready);

        h.manager.prune(&list(&["a1"]));

        assert!(h.manager.active_sessions().is_empty());
        assert!(!h.manager.registry().contains(&key));
        let last = h.changes.borrow().last().cloned().unwrap();
        assert_eq!((last.key, last.state), (key, SessionState::Idle));
    }

    #[test]
    fn teardown_releases_everything() {
        let mut h = harness();
        let (key, descriptor) = direct("a1");
        h.manager.toggle(key.clone(), &descriptor).unwrap();

        h.manager.teardown();
        assert!(h.manager.registry().is_empty());
        assert!(h.manager.active_sessions().is_empty());
        let media = h.manager.registry().backend().media(&key).unwrap();
        assert!(media.paused);
        assert_eq!(media.src, None);
    }

    #[test]
    fn late_ready_after_stop_is_ignored() {
        let mut h = harness();
        let (key, descriptor) = direct("a1");
        h.manager.toggle(key.clone(), &descriptor).unwrap();
        h.manager.toggle(key.clone(), &descriptor).unwrap();

        h.manager.handle_signal(&key, MediaSignal::Ready);
        assert_eq!(h.manager.session(&key).unwrap().state, SessionState::Idle);
    }
}
