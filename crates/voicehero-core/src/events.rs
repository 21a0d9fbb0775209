//! Wire types for widget analytics events

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Lifecycle and interaction events emitted by the embedded widget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "widget.loaded")]
    WidgetLoaded,
    #[serde(rename = "bubble.clicked")]
    BubbleClicked,
    #[serde(rename = "audio.play")]
    AudioPlay,
    #[serde(rename = "audio.pause")]
    AudioPause,
    #[serde(rename = "audio.complete")]
    AudioComplete,
    #[serde(rename = "audio.abandoned")]
    AudioAbandoned,
    #[serde(rename = "audio.progress.25")]
    AudioProgress25,
    #[serde(rename = "audio.progress.50")]
    AudioProgress50,
    #[serde(rename = "audio.progress.75")]
    AudioProgress75,
    #[serde(rename = "conversation.start")]
    ConversationStart,
    #[serde(rename = "interaction.saved")]
    InteractionSaved,
    #[serde(rename = "ai.response")]
    AiResponse,
}

impl EventType {
    pub const ALL: [EventType; 12] = [
        Self::WidgetLoaded,
        Self::BubbleClicked,
        Self::AudioPlay,
        Self::AudioPause,
        Self::AudioComplete,
        Self::AudioAbandoned,
        Self::AudioProgress25,
        Self::AudioProgress50,
        Self::AudioProgress75,
        Self::ConversationStart,
        Self::InteractionSaved,
        Self::AiResponse,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WidgetLoaded => "widget.loaded",
            Self::BubbleClicked => "bubble.clicked",
            Self::AudioPlay => "audio.play",
            Self::AudioPause => "audio.pause",
            Self::AudioComplete => "audio.complete",
            Self::AudioAbandoned => "audio.abandoned",
            Self::AudioProgress25 => "audio.progress.25",
            Self::AudioProgress50 => "audio.progress.50",
            Self::AudioProgress75 => "audio.progress.75",
            Self::ConversationStart => "conversation.start",
            Self::InteractionSaved => "interaction.saved",
            Self::AiResponse => "ai.response",
        }
    }

    /// Progress event for one of the 25/50/75 milestones
    pub fn progress(milestone: u8) -> Option<Self> {
        match milestone {
            25 => Some(Self::AudioProgress25),
            50 => Some(Self::AudioProgress50),
            75 => Some(Self::AudioProgress75),
            _ => None,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown event type: {0}")]
pub struct UnknownEventType(pub String);

impl FromStr for EventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|event_type| event_type.as_str() == s)
            .ok_or_else(|| UnknownEventType(s.to_string()))
    }
}

/// A single analytics event as produced by the widget and stored by the ingest API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsEvent {
    pub session_id: String,
    pub event_type: EventType,
    /// Epoch milliseconds
    pub timestamp: i64,
    pub project_id: String,
    pub segment_type: String,
    pub segment_id: String,
    pub audio_version: String,
    pub script_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub user_context: Map<String, Value>,
}
