//! In-memory media backend used off the web and in tests.
//!
//! Nothing is decoded; a handle only tracks the attributes a browser audio
//! element would expose, so the session rules can run unchanged.

use std::cell::RefCell;
#[cfg(test)]
use std::{cell::Cell, collections::HashMap};
use std::rc::Rc;

use super::media::{HandleConfig, MediaBackend, MediaError, MediaHandle, MediaSignal, SignalSink};
use super::session::{PlaybackErrorKind, SessionKey};

#[cfg(test)]
#[derive(Debug, Clone, PartialEq)]
pub enum MediaOp {
    SetSource(String),
    ClearSource,
    Reload,
    Play,
    Pause,
    Seek(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeadlessMedia {
    pub src: Option<String>,
    pub paused: bool,
    pub position: f64,
    // only inspected by tests
    #[cfg_attr(not(test), allow(dead_code))]
    pub volume: f64,
    #[cfg_attr(not(test), allow(dead_code))]
    pub muted: bool,
}

impl Default for HeadlessMedia {
    fn default() -> Self {
        Self {
            src: None,
            paused: true,
            position: 0.0,
            volume: 1.0,
            muted: false,
        }
    }
}

/// How `play()` behaves.
#[derive(Debug, Clone, Default)]
pub struct HeadlessPolicy {
    /// Every `play()` resolves but leaves the handle paused.
    pub block_autoplay: bool,
    /// Number of upcoming `play()` calls that leave the handle paused.
    pub paused_attempts: u32,
    pub reject_with: Option<PlaybackErrorKind>,
    /// `create_handle` fails.
    pub unavailable: bool,
}

#[derive(Default)]
pub struct HeadlessBackend {
    policy: Rc<RefCell<HeadlessPolicy>>,
    #[cfg(test)]
    media: HashMap<SessionKey, Rc<RefCell<HeadlessMedia>>>,
    #[cfg(test)]
    ops: Rc<RefCell<Vec<(SessionKey, MediaOp)>>>,
    #[cfg(test)]
    created: Cell<usize>,
    sink: Option<SignalSink>,
}

impl HeadlessBackend {
    /// Reports [`MediaSignal::Ready`] through `sink` whenever playback starts.
    pub fn with_sink(sink: SignalSink) -> Self {
        Self {
            sink: Some(sink),
            ..Self::default()
        }
    }
}

#[cfg(test)]
impl HeadlessBackend {
    pub fn set_policy(&self, policy: HeadlessPolicy) {
        *self.policy.borrow_mut() = policy;
    }

    pub fn created(&self) -> usize {
        self.created.get()
    }

    /// Last known state of the handle created for `key`, disposed or not.
    pub fn media(&self, key: &SessionKey) -> Option<HeadlessMedia> {
        self.media.get(key).map(|media| media.borrow().clone())
    }

    pub fn ops(&self) -> Vec<(SessionKey, MediaOp)> {
        self.ops.borrow().clone()
    }
}

impl MediaBackend for HeadlessBackend {
    type Handle = HeadlessHandle;

    fn create_handle(&mut self, key: &SessionKey) -> Result<Self::Handle, MediaError> {
        if self.policy.borrow().unavailable {
            return Err(MediaError::Unavailable(key.to_string()));
        }
        let media = Rc::new(RefCell::new(HeadlessMedia::default()));
        // a recreated handle replaces the stale entry
        #[cfg(test)]
        self.media.insert(key.clone(), media.clone());
        #[cfg(test)]
        self.created.set(self.created.get() + 1);
        Ok(HeadlessHandle {
            key: key.clone(),
            media,
            policy: self.policy.clone(),
            #[cfg(test)]
            ops: self.ops.clone(),
            sink: self.sink.clone(),
        })
    }
}

pub struct HeadlessHandle {
    key: SessionKey,
    media: Rc<RefCell<HeadlessMedia>>,
    policy: Rc<RefCell<HeadlessPolicy>>,
    #[cfg(test)]
    ops: Rc<RefCell<Vec<(SessionKey, MediaOp)>>>,
    sink: Option<SignalSink>,
}

#[cfg(test)]
impl HeadlessHandle {
    fn record(&self, op: MediaOp) {
        self.ops.borrow_mut().push((self.key.clone(), op));
    }
}

impl MediaHandle for HeadlessHandle {
    fn configure(&self, config: &HandleConfig) {
        let mut media = self.media.borrow_mut();
        media.volume = config.volume;
        media.muted = config.muted;
    }

    fn source(&self) -> Option<String> {
        self.media.borrow().src.clone()
    }

    fn set_source(&self, url: &str) {
        #[cfg(test)]
        self.record(MediaOp::SetSource(url.to_string()));
        self.media.borrow_mut().src = Some(url.to_string());
    }

    fn clear_source(&self) {
        #[cfg(test)]
        self.record(MediaOp::ClearSource);
        let mut media = self.media.borrow_mut();
        media.src = None;
        media.position = 0.0;
    }

    fn reload(&self) {
        #[cfg(test)]
        self.record(MediaOp::Reload);
        let mut media = self.media.borrow_mut();
        media.paused = true;
        media.position = 0.0;
    }

    fn play(&self) -> Result<(), PlaybackErrorKind> {
        #[cfg(test)]
        self.record(MediaOp::Play);
        if self.media.borrow().src.is_none() {
            return Err(PlaybackErrorKind::Unsupported);
        }
        {
            let mut policy = self.policy.borrow_mut();
            if let Some(kind) = policy.reject_with {
                return Err(kind);
            }
            if policy.block_autoplay {
                return Ok(());
            }
            if policy.paused_attempts > 0 {
                policy.paused_attempts -= 1;
                return Ok(());
            }
        }
        self.media.borrow_mut().paused = false;
        if let Some(sink) = &self.sink {
            sink(self.key.clone(), MediaSignal::Ready);
        }
        Ok(())
    }

    fn pause(&self) {
        #[cfg(test)]
        self.record(MediaOp::Pause);
        self.media.borrow_mut().paused = true;
    }

    fn is_paused(&self) -> bool {
        self.media.borrow().paused
    }

    fn position(&self) -> f64 {
        self.media.borrow().position
    }

    fn seek(&self, seconds: f64) {
        #[cfg(test)]
        self.record(MediaOp::Seek(seconds));
        self.media.borrow_mut().position = seconds.max(0.0);
    }
}
