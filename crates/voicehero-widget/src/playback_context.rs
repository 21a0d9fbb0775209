//! Client for the playback endpoint that picks the visitor's segment.

use crate::config::WidgetConfig;
use crate::context::UserContext;
use crate::error::WidgetError;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const PLAYBACK_PATH: &str = "/api/playback";

/// Identity of the script/audio pair chosen for this visitor. Stamped onto
/// every event until the widget reloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentIdentity {
    #[serde(rename = "type")]
    pub segment_type: String,
    pub id: String,
    pub audio_version: String,
    pub script_version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackContext {
    pub segment: SegmentIdentity,
    #[serde(default)]
    pub transcript: Option<String>,
    #[serde(default)]
    pub audio_url: Option<String>,
    #[serde(default)]
    pub voice_disabled: bool,
}

#[derive(Clone)]
pub struct PlaybackClient {
    client: reqwest::Client,
    endpoint: String,
}

impl PlaybackClient {
    pub fn new(client: reqwest::Client, config: &WidgetConfig) -> Self {
        Self {
            client,
            endpoint: config.endpoint(PLAYBACK_PATH),
        }
    }

    pub async fn fetch(
        &self,
        project_id: &str,
        context: &UserContext,
        returning: bool,
    ) -> Result<PlaybackContext, WidgetError> {
        let mut query: Vec<(&str, String)> = vec![
            ("projectId", project_id.to_string()),
            ("returning", returning.to_string()),
        ];
        if let Some(url) = &context.page_url {
            query.push(("url", url.clone()));
        }
        if let Some(lang) = &context.language {
            query.push(("lang", lang.clone()));
        }
        if let Some(source) = &context.utm_source {
            query.push(("utm_source", source.clone()));
        }
        if let Some(medium) = &context.utm_medium {
            query.push(("utm_medium", medium.clone()));
        }
        if let Some(campaign) = &context.utm_campaign {
            query.push(("utm_campaign", campaign.clone()));
        }

        let response = self.client.get(&self.endpoint).query(&query).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(WidgetError::Status {
                status: status.as_u16(),
                url: self.endpoint.clone(),
            });
        }

        let body = response.text().await?;
        let playback: PlaybackContext =
            serde_json::from_str(&body).map_err(|e| WidgetError::Decode(e.to_string()))?;

        debug!(
            "Playback segment {} ({}) selected for project {}",
            playback.segment.id, playback.segment.segment_type, project_id
        );
        Ok(playback)
    }
}
