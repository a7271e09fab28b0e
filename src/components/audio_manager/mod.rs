//! Audio Manager - exclusive playback sessions over lazily created audio handles.
//! Handle callbacks never touch signals directly; the page defers them before
//! feeding them back through [`PlaybackSessionManager::handle_signal`].

#[cfg(any(test, not(target_arch = "wasm32")))]
mod headless;
mod manager;
mod media;
mod registry;
mod resolve;
mod session;
#[cfg(target_arch = "wasm32")]
mod web;

#[cfg(not(target_arch = "wasm32"))]
use headless::HeadlessBackend;
pub use manager::{PlaybackSessionManager, ToggleOutcome};
pub use media::{MediaSignal, SignalSink};
pub use resolve::{candidates_from, missing_references, origin_of, LinkedAudio, PlaybackDescriptor, SharedOrigin};
pub use session::{PlaybackErrorKind, PlaybackStateChanged, SessionKey, SessionState};
#[cfg(target_arch = "wasm32")]
use web::WebAudioBackend;

/// Backend the page drives on this target.
#[cfg(target_arch = "wasm32")]
pub type PlatformBackend = WebAudioBackend;
#[cfg(not(target_arch = "wasm32"))]
pub type PlatformBackend = HeadlessBackend;

/// Builds the platform backend that reports through `sink`.
pub fn platform_backend(sink: SignalSink) -> PlatformBackend {
    #[cfg(target_arch = "wasm32")]
    {
        WebAudioBackend::new(sink)
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        HeadlessBackend::with_sink(sink)
    }
}
