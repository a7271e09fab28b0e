use std::collections::HashMap;
use std::fmt;

use crate::api::{ResourceKind, ResourceRecord};

/// Identity of one playback attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SessionKey {
    Direct(String),
    /// `(owner_id, audio_id)`: audio reached through another resource.
    Linked(String, String),
}

impl SessionKey {
    pub fn for_record(record: &ResourceRecord) -> Option<Self> {
        match record.kind {
            ResourceKind::Audio => Some(Self::Direct(record.id.clone())),
            ResourceKind::Image => record
                .linked_audio()
                .map(|audio| Self::Linked(record.id.clone(), audio.to_string())),
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct(id) => write!(f, "direct({id})"),
            Self::Linked(owner, audio) => write!(f, "linked({owner} -> {audio})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Loading,
    Playing,
    Error,
}

impl SessionState {
    pub fn is_live(self) -> bool {
        matches!(self, Self::Loading | Self::Playing)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Loading => "Loading",
            Self::Playing => "Playing",
            Self::Error => "Error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaybackErrorKind {
    NotAllowed,
    Unsupported,
    NetworkOrMissing,
    Unknown,
}

impl PlaybackErrorKind {
    pub fn message(self) -> &'static str {
        match self {
            Self::NotAllowed => "Playback was blocked by the browser. Click play again to allow audio.",
            Self::Unsupported => "This audio format is not supported.",
            Self::NetworkOrMissing => "The audio file could not be reached.",
            Self::Unknown => "Unable to play this audio.",
        }
    }

    /// Maps a rejected `play()` promise. `AbortError` means a pause or a new
    /// source interrupted the request, which is not a failure.
    #[cfg(any(test, target_arch = "wasm32"))]
    pub fn from_dom_exception(name: &str) -> Option<Self> {
        match name {
            "AbortError" => None,
            "NotAllowedError" | "SecurityError" => Some(Self::NotAllowed),
            "NotSupportedError" => Some(Self::Unsupported),
            "NetworkError" | "NotFoundError" => Some(Self::NetworkOrMissing),
            _ => Some(Self::Unknown),
        }
    }

    /// Maps `HTMLMediaElement.error.code`.
    #[cfg(any(test, target_arch = "wasm32"))]
    pub fn from_media_error_code(code: u16) -> Self {
        match code {
            2 => Self::NetworkOrMissing,
            3 | 4 => Self::Unsupported,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSession {
    pub key: SessionKey,
    pub resolved_url: String,
    pub title: String,
    pub state: SessionState,
    pub error_kind: Option<PlaybackErrorKind>,
}

impl PlaybackSession {
    fn new(key: SessionKey) -> Self {
        Self {
            key,
            resolved_url: String::new(),
            title: String::new(),
            state: SessionState::Idle,
            error_kind: None,
        }
    }
}

/// `onPlaybackStateChanged(sessionKey, state, errorKind?)`.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackStateChanged {
    pub key: SessionKey,
    pub state: SessionState,
    pub error_kind: Option<PlaybackErrorKind>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Begin { resolved_url: String, title: String },
    Ready,
    Stop,
    Ended,
    Fail(PlaybackErrorKind),
    Settle,
    Forget,
}

/// `{active, sessions}`; every state change goes through [`SessionTable::apply`].
#[derive(Debug, Default)]
pub struct SessionTable {
    active: Option<SessionKey>,
    sessions: HashMap<SessionKey, PlaybackSession>,
}

impl SessionTable {
    /// The active key, only while it is loading or playing.
    pub fn active_key(&self) -> Option<&SessionKey> {
        self.active.as_ref().filter(|key| self.is_live(key))
    }

    pub fn is_live(&self, key: &SessionKey) -> bool {
        self.state_of(key).is_live()
    }

    pub fn state_of(&self, key: &SessionKey) -> SessionState {
        self.sessions
            .get(key)
            .map(|session| session.state)
            .unwrap_or_default()
    }

    pub fn get(&self, key: &SessionKey) -> Option<&PlaybackSession> {
        self.sessions.get(key)
    }

    pub fn keys(&self) -> Vec<SessionKey> {
        self.sessions.keys().cloned().collect()
    }

    pub fn live_keys(&self) -> Vec<SessionKey> {
        self.sessions
            .values()
            .filter(|session| session.state.is_live())
            .map(|session| session.key.clone())
            .collect()
    }

    pub fn apply(&mut self, key: &SessionKey, transition: Transition) -> Vec<PlaybackStateChanged> {
        let mut changes = Vec::new();
        match transition {
            Transition::Begin { resolved_url, title } => {
                if let Some(other) = self.active.clone().filter(|active| active != key) {
                    if self.is_live(&other) {
                        changes.extend(self.set_state(&other, SessionState::Idle, None));
                    }
                }
                let session = self
                    .sessions
                    .entry(key.clone())
                    .or_insert_with(|| PlaybackSession::new(key.clone()));
                session.resolved_url = resolved_url;
                session.title = title;
                changes.extend(self.set_state(key, SessionState::Loading, None));
                self.active = Some(key.clone());
            }
            Transition::Ready => {
                if self.state_of(key) == SessionState::Loading {
                    changes.extend(self.set_state(key, SessionState::Playing, None));
                }
            }
            Transition::Stop | Transition::Ended => {
                if self.is_live(key) {
                    changes.extend(self.set_state(key, SessionState::Idle, None));
                }
                self.release_active(key);
            }
            Transition::Fail(kind) => {
                if self.is_live(key) {
                    changes.extend(self.set_state(key, SessionState::Error, Some(kind)));
                }
                self.release_active(key);
            }
            Transition::Settle => {
                if self.state_of(key) == SessionState::Error {
                    let kind = self.sessions.get(key).and_then(|session| session.error_kind);
                    changes.extend(self.set_state(key, SessionState::Idle, kind));
                }
            }
            Transition::Forget => {
                if self.is_live(key) {
                    changes.extend(self.set_state(key, SessionState::Idle, None));
                }
                self.release_active(key);
                self.sessions.remove(key);
            }
        }
        changes
    }

    fn release_active(&mut self, key: &SessionKey) {
        if self.active.as_ref() == Some(key) {
            self.active = None;
        }
    }

    fn set_state(
        &mut self,
        key: &SessionKey,
        state: SessionState,
        error_kind: Option<PlaybackErrorKind>,
    ) -> Option<PlaybackStateChanged> {
        let session = self.sessions.get_mut(key)?;
        if session.state == state && session.error_kind == error_kind {
            return None;
        }
        session.state = state;
        session.error_kind = error_kind;
        Some(PlaybackStateChanged {
            key: key.clone(),
            state,
            error_kind,
        })
    }
}
