use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Image,
    Audio,
}

impl ResourceKind {
    pub fn as_query_value(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Audio => "audio",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Image => "Image",
            Self::Audio => "Audio",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub id: String,
    pub kind: ResourceKind,
    #[serde(default)]
    pub title: String,
    #[serde(default, rename = "sourceUrl", alias = "source_url")]
    pub source_url: String,
    #[serde(default)]
    pub order: i64,
    #[serde(default = "default_active", rename = "isActive", alias = "is_active")]
    pub is_active: bool,
    #[serde(
        default,
        rename = "linkedAudioId",
        alias = "linked_audio_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub linked_audio_id: Option<String>,
    /// Linked audio the list endpoint may embed next to `linked_audio_id`.
    #[serde(
        default,
        rename = "linkedAudio",
        alias = "linked_audio",
        skip_serializing_if = "Option::is_none"
    )]
    pub linked_payload: Option<ReferencePayload>,
}

fn default_active() -> bool {
    true
}

impl ResourceRecord {
    /// Linked audio id, only honoured on image records.
    pub fn linked_audio(&self) -> Option<&str> {
        if self.kind != ResourceKind::Image {
            return None;
        }
        self.linked_audio_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    pub fn is_playable(&self) -> bool {
        match self.kind {
            ResourceKind::Audio => !self.source_url.trim().is_empty(),
            ResourceKind::Image => self.linked_audio().is_some(),
        }
    }
}

/// Query for `ListResources`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceFilter {
    #[serde(default)]
    pub kind: Option<ResourceKind>,
    #[serde(default)]
    pub active_only: bool,
}

impl ResourceFilter {
    pub fn to_query(&self) -> String {
        let mut params = Vec::new();
        if let Some(kind) = self.kind {
            params.push(format!("kind={}", urlencoding::encode(kind.as_query_value())));
        }
        if self.active_only {
            params.push("active=true".to_string());
        }
        params.join("&")
    }
}

/// Payload returned by `ResolveReference`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferencePayload {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct OrderUpdate {
    pub order: i64,
}
