use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use crate::api::{ReferencePayload, ResourceKind, ResourceRecord};

/// Read at play time, never cached, so an origin change after hydration is honoured.
pub trait OriginProvider {
    fn current_origin(&self) -> Option<String>;
}

#[cfg(target_arch = "wasm32")]
fn browser_origin() -> Option<String> {
    web_sys::window()?.location().origin().ok()
}

#[cfg(not(target_arch = "wasm32"))]
fn browser_origin() -> Option<String> {
    None
}

/// Configured origin that can change at runtime. Falls back to the page location.
#[derive(Debug, Clone, Default)]
pub struct SharedOrigin(Rc<RefCell<Option<String>>>);

impl SharedOrigin {
    #[cfg(test)]
    pub fn new(origin: impl Into<String>) -> Self {
        let shared = Self::default();
        shared.set(origin);
        shared
    }

    /// An empty value clears the override.
    pub fn set(&self, origin: impl Into<String>) {
        let origin = origin.into();
        let origin = origin.trim().trim_end_matches('/');
        *self.0.borrow_mut() = (!origin.is_empty()).then(|| origin.to_string());
    }
}

impl OriginProvider for SharedOrigin {
    fn current_origin(&self) -> Option<String> {
        self.0.borrow().clone().or_else(browser_origin)
    }
}

/// `scheme://host[:port]` of an absolute URL.
pub fn origin_of(url: &str) -> Option<String> {
    let url = url.trim();
    let (scheme, rest) = url.split_once("://")?;
    let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
    if scheme.is_empty() || host.is_empty() {
        return None;
    }
    Some(format!("{scheme}://{host}"))
}

/// An audio resource a linked reference can point at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedAudio {
    pub id: String,
    pub title: String,
    pub url: String,
}

impl LinkedAudio {
    pub fn from_payload(id: &str, payload: &ReferencePayload) -> Self {
        Self {
            id: id.to_string(),
            title: payload.title.clone(),
            url: payload.url.clone(),
        }
    }
}

/// What a play click carries.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PlaybackDescriptor {
    pub title: String,
    pub source_url: Option<String>,
    pub linked_audio_id: Option<String>,
    /// Inline payload for the linked audio; preferred over the candidate list.
    pub inline: Option<LinkedAudio>,
}

impl PlaybackDescriptor {
    pub fn for_record(record: &ResourceRecord) -> Self {
        match record.kind {
            ResourceKind::Audio => Self {
                title: record.title.clone(),
                source_url: Some(record.source_url.clone()),
                ..Self::default()
            },
            ResourceKind::Image => {
                let linked_audio_id = record.linked_audio().map(str::to_string);
                let inline = linked_audio_id.as_deref().and_then(|id| {
                    record
                        .linked_payload
                        .as_ref()
                        .map(|payload| LinkedAudio::from_payload(id, payload))
                });
                Self {
                    title: record.title.clone(),
                    linked_audio_id,
                    inline,
                    ..Self::default()
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    pub url: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolutionError {
    #[error("\"{0}\" has no playable source")]
    NoSource(String),

    #[error("linked audio {0} could not be found")]
    Unresolved(String),

    #[error("cannot resolve {0} without a page origin")]
    NoOrigin(String),
}

/// `scheme://...` or an opaque `blob:`/`data:` URL. `host:port/path` is relative.
fn is_absolute(raw: &str) -> bool {
    if let Some((scheme, _)) = raw.split_once("://") {
        let mut chars = scheme.chars();
        return chars.next().is_some_and(|c| c.is_ascii_alphabetic())
            && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    }
    let lower = raw.to_ascii_lowercase();
    lower.starts_with("blob:") || lower.starts_with("data:")
}

/// Makes `raw` absolute against `origin`. Absolute URLs pass through untouched.
pub fn absolutize(raw: &str, origin: Option<&str>) -> Result<String, ResolutionError> {
    let raw = raw.trim();
    if is_absolute(raw) {
        return Ok(raw.to_string());
    }
    let origin = origin
        .map(|origin| origin.trim().trim_end_matches('/'))
        .filter(|origin| !origin.is_empty())
        .ok_or_else(|| ResolutionError::NoOrigin(raw.to_string()))?;

    if let Some(rest) = raw.strip_prefix("//") {
        let scheme = origin.split_once("://").map(|(scheme, _)| scheme).unwrap_or("https");
        return Ok(format!("{scheme}://{rest}"));
    }
    if raw.starts_with('/') {
        return Ok(format!("{origin}{raw}"));
    }
    Ok(format!("{origin}/{raw}"))
}

/// Picks the URL to play: direct source first, then inline payload, then candidates.
pub fn resolve_descriptor(
    descriptor: &PlaybackDescriptor,
    candidates: &[LinkedAudio],
    origin: Option<&str>,
) -> Result<ResolvedSource, ResolutionError> {
    if let Some(url) = descriptor
        .source_url
        .as_deref()
        .filter(|url| !url.trim().is_empty())
    {
        return Ok(ResolvedSource {
            url: absolutize(url, origin)?,
            title: descriptor.title.clone(),
        });
    }

    let Some(reference) = descriptor
        .linked_audio_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
    else {
        return Err(ResolutionError::NoSource(descriptor.title.clone()));
    };

    let linked = descriptor
        .inline
        .iter()
        .chain(candidates.iter().filter(|candidate| candidate.id == reference))
        .find(|audio| !audio.url.trim().is_empty())
        .ok_or_else(|| ResolutionError::Unresolved(reference.to_string()))?;

    let title = if linked.title.trim().is_empty() {
        descriptor.title.clone()
    } else {
        linked.title.clone()
    };
    Ok(ResolvedSource {
        url: absolutize(&linked.url, origin)?,
        title,
    })
}

/// Audio records usable as link targets.
pub fn candidates_from(records: &[ResourceRecord]) -> Vec<LinkedAudio> {
    records
        .iter()
        .filter(|record| record.is_playable() && record.kind == ResourceKind::Audio)
        .map(|record| LinkedAudio {
            id: record.id.clone(),
            title: record.title.clone(),
            url: record.source_url.clone(),
        })
        .collect()
}

/// Linked audio ids referenced by `records` that neither an embedded payload
/// nor a candidate covers.
pub fn missing_references(records: &[ResourceRecord], candidates: &[LinkedAudio]) -> Vec<String> {
    let known: HashSet<&str> = candidates.iter().map(|c| c.id.as_str()).collect();
    let mut seen = HashSet::new();
    records
        .iter()
        .filter(|record| {
            record
                .linked_payload
                .as_ref()
                .is_none_or(|payload| payload.url.trim().is_empty())
        })
        .filter_map(ResourceRecord::linked_audio)
        .filter(|id| !known.contains(id) && seen.insert(*id))
        .map(str::to_string)
        .collect()
}
