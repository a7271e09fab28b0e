use std::rc::Rc;

use super::session::{PlaybackErrorKind, SessionKey};

/// Applied once when a handle is created.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HandleConfig {
    pub volume: f64,
    pub muted: bool,
}

impl Default for HandleConfig {
    fn default() -> Self {
        Self {
            volume: 1.0,
            muted: false,
        }
    }
}

/// Asynchronous notifications raised by a handle after `play()` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaSignal {
    Ready,
    Ended,
    Failed(PlaybackErrorKind),
}

pub type SignalSink = Rc<dyn Fn(SessionKey, MediaSignal)>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MediaError {
    #[error("audio element unavailable: {0}")]
    Unavailable(String),
}

/// One audio element. Methods take `&self`; handles are driven from a single thread.
pub trait MediaHandle {
    fn configure(&self, config: &HandleConfig);
    fn source(&self) -> Option<String>;
    fn set_source(&self, url: &str);
    fn clear_source(&self);
    fn reload(&self);
    /// Starts playback. A synchronous rejection is returned; later rejections
    /// arrive as [`MediaSignal::Failed`].
    fn play(&self) -> Result<(), PlaybackErrorKind>;
    fn pause(&self);
    fn is_paused(&self) -> bool;
    fn position(&self) -> f64;
    fn seek(&self, seconds: f64);
}

pub trait MediaBackend {
    type Handle: MediaHandle;

    fn create_handle(&mut self, key: &SessionKey) -> Result<Self::Handle, MediaError>;
}
