//! Core data model: surfaces, message parts, messages, and conversation sets.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_IMAGE_COUNT: u32 = 1;
pub const GENERATED_IMAGE_MIME: &str = "image/jpeg";

// === Surfaces ===

/// A conversation surface with an independent message history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Surface {
    #[serde(rename = "chat")]
    Chat,
    #[serde(rename = "image-lab")]
    ImageLab,
    #[serde(rename = "file-analysis")]
    FileAnalysis,
}

impl Surface {
    pub const ALL: [Surface; 3] = [Surface::Chat, Surface::ImageLab, Surface::FileAnalysis];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Surface::Chat => "chat",
            Surface::ImageLab => "image-lab",
            Surface::FileAnalysis => "file-analysis",
        }
    }

    /// Fixed user-facing text recorded when a provider request fails on this
    /// surface.
    #[must_use]
    pub fn failure_text(self) -> &'static str {
        match self {
            Surface::Chat => "Sorry, something went wrong. Please try again.",
            Surface::ImageLab => "Failed to generate image. Please try again.",
            Surface::FileAnalysis => "Sorry, something went wrong during analysis.",
        }
    }
}

impl std::fmt::Display for Surface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// === Messages ===

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "user")]
    User,
    #[serde(rename = "model")]
    Model,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

/// One unit of message content: text or a binary attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Part {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "attachment")]
    Attachment {
        mime_type: String,
        /// Base64-encoded payload.
        data: String,
    },
}

impl Part {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    #[must_use]
    pub fn attachment(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Part::Attachment {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }
}

/// A message on one surface's conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub parts: Vec<Part>,
    pub timestamp: DateTime<Utc>,
    /// The textual prompt that produced a model message consisting solely of
    /// generated attachments, kept so the prompt can be recovered later.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_prompt: Option<String>,
}

impl Message {
    #[must_use]
    pub fn user(parts: Vec<Part>) -> Self {
        Self {
            role: Role::User,
            parts,
            timestamp: Utc::now(),
            origin_prompt: None,
        }
    }

    #[must_use]
    pub fn model(parts: Vec<Part>) -> Self {
        Self {
            role: Role::Model,
            parts,
            timestamp: Utc::now(),
            origin_prompt: None,
        }
    }

    #[must_use]
    pub fn model_text(text: impl Into<String>) -> Self {
        Self::model(vec![Part::text(text)])
    }

    #[must_use]
    pub fn with_origin_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.origin_prompt = Some(prompt.into());
        self
    }

    /// Concatenated text content across all text parts.
    #[must_use]
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::Text { text } => Some(text.as_str()),
                Part::Attachment { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// === Conversation sets ===

/// All per-surface histories for one identity, replaced wholesale on
/// identity switch and persisted as a single document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationSet {
    surfaces: BTreeMap<Surface, Vec<Message>>,
}

impl ConversationSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, surface: Surface) -> &[Message] {
        self.surfaces.get(&surface).map_or(&[], Vec::as_slice)
    }

    pub fn get_mut(&mut self, surface: Surface) -> &mut Vec<Message> {
        self.surfaces.entry(surface).or_default()
    }

    pub fn clear(&mut self, surface: Surface) {
        self.surfaces.remove(&surface);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.surfaces.values().all(Vec::is_empty)
    }
}

// === Image generation options ===

/// Supported output shapes for generated images.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "16:9")]
    Wide,
    #[serde(rename = "9:16")]
    Tall,
}

impl AspectRatio {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Wide => "16:9",
            AspectRatio::Tall => "9:16",
        }
    }
}

/// Options for an image-lab submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageOptions {
    pub aspect_ratio: AspectRatio,
    pub count: u32,
}

impl Default for ImageOptions {
    fn default() -> Self {
        Self {
            aspect_ratio: AspectRatio::default(),
            count: DEFAULT_IMAGE_COUNT,
        }
    }
}
