// HTMLAudioElement-backed handles.
use wasm_bindgen::{closure::Closure, JsCast, JsValue};
use web_sys::HtmlAudioElement;

use super::media::{HandleConfig, MediaBackend, MediaError, MediaHandle, MediaSignal, SignalSink};
use super::session::{PlaybackErrorKind, SessionKey};

pub struct WebAudioBackend {
    sink: SignalSink,
}

impl WebAudioBackend {
    pub fn new(sink: SignalSink) -> Self {
        Self { sink }
    }
}

impl MediaBackend for WebAudioBackend {
    type Handle = WebAudioHandle;

    fn create_handle(&mut self, key: &SessionKey) -> Result<Self::Handle, MediaError> {
        let element = HtmlAudioElement::new()
            .map_err(|err| MediaError::Unavailable(format!("{err:?}")))?;
        let mut handle = WebAudioHandle {
            element,
            key: key.clone(),
            sink: self.sink.clone(),
            listeners: Vec::new(),
        };

        let (sink, owner) = (self.sink.clone(), key.clone());
        handle.listen("playing", move || sink(owner.clone(), MediaSignal::Ready));

        let (sink, owner) = (self.sink.clone(), key.clone());
        handle.listen("ended", move || sink(owner.clone(), MediaSignal::Ended));

        let (sink, owner, element) = (self.sink.clone(), key.clone(), handle.element.clone());
        handle.listen("error", move || {
            // A detached source raises `error` with no code; that is our own teardown.
            if element.get_attribute("src").is_none() {
                return;
            }
            let kind = element
                .error()
                .map(|error| PlaybackErrorKind::from_media_error_code(error.code()))
                .unwrap_or(PlaybackErrorKind::Unknown);
            sink(owner.clone(), MediaSignal::Failed(kind));
        });

        Ok(handle)
    }
}

pub struct WebAudioHandle {
    element: HtmlAudioElement,
    key: SessionKey,
    sink: SignalSink,
    listeners: Vec<(&'static str, Closure<dyn FnMut()>)>,
}

impl WebAudioHandle {
    fn listen(&mut self, event: &'static str, callback: impl FnMut() + 'static) {
        let closure = Closure::wrap(Box::new(callback) as Box<dyn FnMut()>);
        let _ = self
            .element
            .add_event_listener_with_callback(event, closure.as_ref().unchecked_ref());
        self.listeners.push((event, closure));
    }
}

impl Drop for WebAudioHandle {
    fn drop(&mut self) {
        for (event, closure) in self.listeners.drain(..) {
            let _ = self
                .element
                .remove_event_listener_with_callback(event, closure.as_ref().unchecked_ref());
        }
    }
}

fn classify_rejection(err: &JsValue) -> Option<PlaybackErrorKind> {
    match err.dyn_ref::<web_sys::DomException>() {
        Some(exception) => PlaybackErrorKind::from_dom_exception(&exception.name()),
        None => Some(PlaybackErrorKind::Unknown),
    }
}

impl MediaHandle for WebAudioHandle {
    fn configure(&self, config: &HandleConfig) {
        self.element.set_volume(config.volume);
        self.element.set_muted(config.muted);
        self.element.set_preload("auto");
    }

    fn source(&self) -> Option<String> {
        self.element.get_attribute("src")
    }

    fn set_source(&self, url: &str) {
        self.element.set_src(url);
    }

    fn clear_source(&self) {
        let _ = self.element.remove_attribute("src");
        self.element.load();
    }

    fn reload(&self) {
        self.element.load();
    }

    fn play(&self) -> Result<(), PlaybackErrorKind> {
        let promise = match self.element.play() {
            Ok(promise) => promise,
            Err(err) => return Err(classify_rejection(&err).unwrap_or(PlaybackErrorKind::Unknown)),
        };
        let (sink, key) = (self.sink.clone(), self.key.clone());
        wasm_bindgen_futures::spawn_local(async move {
            if let Err(err) = wasm_bindgen_futures::JsFuture::from(promise).await {
                let Some(kind) = classify_rejection(&err) else {
                    return;
                };
                tracing::warn!("[audio] play() rejected for {key}: {kind:?}");
                sink(key, MediaSignal::Failed(kind));
            }
        });
        Ok(())
    }

    fn pause(&self) {
        let _ = self.element.pause();
    }

    fn is_paused(&self) -> bool {
        self.element.paused()
    }

    fn position(&self) -> f64 {
        self.element.current_time()
    }

    fn seek(&self, seconds: f64) {
        self.element.set_current_time(seconds.max(0.0));
    }
}
