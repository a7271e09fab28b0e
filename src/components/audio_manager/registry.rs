use std::collections::HashMap;

use super::media::{HandleConfig, MediaBackend, MediaError, MediaHandle};
use super::session::SessionKey;

/// Lazily created audio handles, one per session key.
pub struct MediaHandleRegistry<B: MediaBackend> {
    backend: B,
    config: HandleConfig,
    handles: HashMap<SessionKey, B::Handle>,
}

impl<B: MediaBackend> MediaHandleRegistry<B> {
    pub fn new(backend: B) -> Self {
        Self::with_config(backend, HandleConfig::default())
    }

    pub fn with_config(backend: B, config: HandleConfig) -> Self {
        Self {
            backend,
            config,
            handles: HashMap::new(),
        }
    }

    pub fn get(&self, key: &SessionKey) -> Option<&B::Handle> {
        self.handles.get(key)
    }

    pub fn keys(&self) -> Vec<SessionKey> {
        self.handles.keys().cloned().collect()
    }

    pub fn get_or_create(&mut self, key: &SessionKey) -> Result<&B::Handle, MediaError> {
        if !self.handles.contains_key(key) {
            let handle = self.backend.create_handle(key)?;
            handle.configure(&self.config);
            tracing::debug!("[audio] created handle for {key}");
            self.handles.insert(key.clone(), handle);
        }
        self.handles
            .get(key)
            .ok_or_else(|| MediaError::Unavailable(key.to_string()))
    }

    /// Points the handle at `url` and reloads it. Returns `false` when the
    /// source was already `url` or no handle exists.
    pub fn set_source(&self, key: &SessionKey, url: &str) -> bool {
        let Some(handle) = self.handles.get(key) else {
            return false;
        };
        if handle.source().as_deref() == Some(url) {
            return false;
        }
        handle.set_source(url);
        handle.reload();
        true
    }

    /// Pauses, detaches the source and drops the handle.
    pub fn dispose(&mut self, key: &SessionKey) -> bool {
        let Some(handle) = self.handles.remove(key) else {
            return false;
        };
        handle.pause();
        handle.clear_source();
        tracing::debug!("[audio] disposed handle for {key}");
        true
    }

    pub fn dispose_all(&mut self) {
        for key in self.keys() {
            self.dispose(&key);
        }
    }
}

#[cfg(test)]
impl<B: MediaBackend> MediaHandleRegistry<B> {
    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn contains(&self, key: &SessionKey) -> bool {
        self.handles.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::audio_manager::headless::{HeadlessBackend, MediaOp};

    fn key(id: &str) -> SessionKey {
        SessionKey::Direct(id.to_string())
    }

    #[test]
    fn handles_are_created_once_and_configured() {
        let mut registry = MediaHandleRegistry::new(HeadlessBackend::default());
        registry.get_or_create(&key("a")).unwrap();
        registry.get_or_create(&key("a")).unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.backend().created(), 1);
        let media = registry.backend().media(&key("a")).unwrap();
        assert_eq!(media.volume, 1.0);
        assert!(!media.muted);
    }

    #[test]
    fn same_source_is_not_reloaded() {
        let mut registry = MediaHandleRegistry::new(HeadlessBackend::default());
        registry.get_or_create(&key("a")).unwrap();

        assert!(registry.set_source(&key("a"), "https://cdn.test/a.mp3"));
        assert!(!registry.set_source(&key("a"), "https://cdn.test/a.mp3"));
        assert!(registry.set_source(&key("a"), "https://cdn.test/b.mp3"));

        let reloads = registry
            .backend()
            .ops()
            .iter()
            .filter(|(_, op)| *op == MediaOp::Reload)
            .count();
        assert_eq!(reloads, 2);
    }

    #[test]
    fn dispose_pauses_and_detaches() {
        let mut registry = MediaHandleRegistry::new(HeadlessBackend::default());
        registry.get_or_create(&key("a")).unwrap();
        registry.set_source(&key("a"), "https://cdn.test/a.mp3");

        assert!(registry.dispose(&key("a")));
        assert!(!registry.dispose(&key("a")));
        assert!(registry.is_empty());
        let media = registry.backend().media(&key("a")).unwrap();
        assert!(media.paused);
        assert_eq!(media.src, None);
    }
}
