use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use voicehero_widget::{
    BrowserEnvironment, FileStorage, KeyValueStorage, MediaEvent, MemoryStorage, NavigatorFlags,
    PageLifecycle, ScreenInfo, VoiceWidget, WidgetConfig, WidgetError,
};

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

#[derive(Args)]
pub struct SimulateCommand {
    /// Base URL of the VoiceHero API
    #[arg(long, env = "VOICEHERO_API_BASE")]
    pub api_base: Option<String>,

    /// Project to load the widget for
    #[arg(long, env = "VOICEHERO_PROJECT_ID")]
    pub project_id: Option<String>,

    /// Widget configuration JSON file; takes precedence over --api-base/--project-id
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// User agent the simulated browser reports
    #[arg(long, default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,

    /// Page URL, including any utm_* parameters
    #[arg(long)]
    pub page_url: Option<String>,

    #[arg(long, default_value = "en-US")]
    pub language: String,

    #[arg(long, default_value_t = 1440)]
    pub screen_width: u32,

    #[arg(long, default_value_t = 900)]
    pub screen_height: u32,

    /// File keeping session id and returning-visitor flag between runs
    #[arg(long)]
    pub state_file: Option<PathBuf>,

    /// Audio duration in seconds
    #[arg(long, default_value_t = 60.0)]
    pub duration: f64,

    /// Fraction of the audio listened to before the page goes away (1.0 plays to the end)
    #[arg(long, default_value_t = 1.0)]
    pub listen: f64,

    /// Audio seconds between time updates
    #[arg(long, default_value_t = 1.0)]
    pub tick: f64,

    /// How long to wait for beacons before exiting, in milliseconds
    #[arg(long, default_value_t = 500)]
    pub linger_ms: u64,
}

/// What a simulated visit did
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationReport {
    pub session_id: String,
    pub segment_id: Option<String>,
    pub abandoned: bool,
    pub beaconed_events: usize,
}

impl SimulateCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        let rt = tokio::runtime::Runtime::new()?;
        let report = rt.block_on(self.run())?;

        println!("session:   {}", report.session_id);
        println!(
            "segment:   {}",
            report.segment_id.as_deref().unwrap_or("(none)")
        );
        println!("abandoned: {}", report.abandoned);
        println!("beaconed:  {}", report.beaconed_events);
        Ok(())
    }

    fn widget_config(&self) -> anyhow::Result<WidgetConfig> {
        if let Some(path) = &self.config {
            let raw = std::fs::read_to_string(path)?;
            return Ok(WidgetConfig::from_json(&raw)?);
        }
        match (&self.api_base, &self.project_id) {
            (Some(api_base), Some(project_id)) => {
                let config = WidgetConfig::new(api_base.clone(), project_id.clone());
                config.validate()?;
                Ok(config)
            }
            _ => Err(anyhow::anyhow!(
                "either --config or both --api-base and --project-id are required"
            )),
        }
    }

    fn environment(&self) -> BrowserEnvironment {
        BrowserEnvironment {
            user_agent: self.user_agent.clone(),
            language: Some(self.language.clone()),
            screen: ScreenInfo::new(self.screen_width, self.screen_height),
            referrer: None,
            page_url: self.page_url.clone(),
            page_title: None,
            navigator: NavigatorFlags::default(),
        }
    }

    pub async fn run(self) -> anyhow::Result<SimulationReport> {
        let config = self.widget_config()?;
        let storage: Arc<dyn KeyValueStorage> = match &self.state_file {
            Some(path) => Arc::new(FileStorage::new(path)),
            None => Arc::new(MemoryStorage::new()),
        };

        let mut widget = VoiceWidget::new(config, self.environment(), storage)?;
        widget.start_flush_loop();

        let mut report = SimulationReport {
            session_id: widget.session_id().to_string(),
            segment_id: None,
            abandoned: false,
            beaconed_events: 0,
        };

        let playback = match widget.load().await {
            Ok(playback) => playback,
            Err(WidgetError::Bot) => {
                warn!("Simulated browser looks automated, widget stayed disabled");
                return Ok(report);
            }
            Err(e) => return Err(e.into()),
        };
        report.segment_id = Some(playback.segment.id.clone());

        if playback.voice_disabled || playback.audio_url.is_none() {
            info!("Voice disabled for this segment, skipping playback");
        } else {
            widget.bubble_clicked().await;
            widget.handle_media_event(MediaEvent::Play).await;

            let duration = self.duration.max(0.0);
            let stop_at = (duration * self.listen).clamp(0.0, duration);
            let tick = if self.tick > 0.0 { self.tick } else { 1.0 };
            let mut position = 0.0;
            while position < stop_at {
                position = (position + tick).min(stop_at);
                widget
                    .handle_media_event(MediaEvent::TimeUpdate {
                        current_time: position,
                        duration,
                    })
                    .await;
            }

            if self.listen >= 1.0 {
                widget.handle_media_event(MediaEvent::Ended).await;
            }
        }

        if let Some(flush) = widget.handle_page_lifecycle(PageLifecycle::VisibilityHidden) {
            report.abandoned = flush.abandonment_sent;
            report.beaconed_events = flush.flushed_events;
        }

        // Beacons run detached on this runtime
        tokio::time::sleep(Duration::from_millis(self.linger_ms)).await;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn command(api_base: String) -> SimulateCommand {
        SimulateCommand {
            api_base: Some(api_base),
            project_id: Some("p1".to_string()),
            config: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            page_url: Some("https://example.com/?utm_source=ads".to_string()),
            language: "en-US".to_string(),
            screen_width: 1440,
            screen_height: 900,
            state_file: None,
            duration: 20.0,
            listen: 1.0,
            tick: 1.0,
            linger_ms: 200,
        }
    }

    async fn mock_api() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/playback"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "segment": {
                    "type": "utm_source",
                    "id": "seg-ads",
                    "audioVersion": "2",
                    "scriptVersion": "5"
                },
                "audioUrl": "https://cdn.example.com/seg-ads.mp3",
                "voiceDisabled": false
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/analytics"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "stored": 1
            })))
            .mount(&server)
            .await;
        server
    }

    async fn posted_event_types(server: &MockServer) -> Vec<String> {
        let mut types = Vec::new();
        for request in server.received_requests().await.unwrap_or_default() {
            if request.url.path() != "/api/analytics" {
                continue;
            }
            let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
            let events = match body.get("events") {
                Some(events) => events.as_array().cloned().unwrap_or_default(),
                None => vec![body["event"].clone()],
            };
            types.extend(
                events
                    .iter()
                    .filter_map(|e| e["eventType"].as_str().map(str::to_string)),
            );
        }
        types
    }

    #[tokio::test]
    async fn test_full_listen_reports_completion() {
        let server = mock_api().await;

        let report = command(server.uri()).run().await.unwrap();

        assert_eq!(report.segment_id.as_deref(), Some("seg-ads"));
        assert!(!report.abandoned);
        assert!(report.session_id.starts_with("vh-"));

        let types = posted_event_types(&server).await;
        assert!(types.contains(&"widget.loaded".to_string()));
        assert!(types.contains(&"audio.progress.75".to_string()));
        assert!(types.contains(&"audio.complete".to_string()));
        assert!(!types.contains(&"audio.abandoned".to_string()));
    }

    #[tokio::test]
    async fn test_partial_listen_beacons_abandonment() {
        let server = mock_api().await;
        let mut cmd = command(server.uri());
        cmd.listen = 0.4;

        let report = cmd.run().await.unwrap();

        assert!(report.abandoned);
        let types = posted_event_types(&server).await;
        assert!(types.contains(&"audio.progress.25".to_string()));
        assert!(!types.contains(&"audio.progress.50".to_string()));
        assert!(types.contains(&"audio.abandoned".to_string()));
    }

    #[tokio::test]
    async fn test_bot_user_agent_stays_disabled() {
        let server = mock_api().await;
        let mut cmd = command(server.uri());
        cmd.user_agent = "curl/8.4.0".to_string();

        let report = cmd.run().await.unwrap();

        assert!(report.segment_id.is_none());
        assert!(posted_event_types(&server).await.is_empty());
    }

    #[tokio::test]
    async fn test_state_file_keeps_session_between_runs() {
        let server = mock_api().await;
        let dir = tempfile::tempdir().unwrap();
        let state_file = dir.path().join("widget-state.json");

        let mut first = command(server.uri());
        first.state_file = Some(state_file.clone());
        let mut second = command(server.uri());
        second.state_file = Some(state_file);

        let first = first.run().await.unwrap();
        let second = second.run().await.unwrap();
        assert_eq!(first.session_id, second.session_id);
    }

    #[test]
    fn test_config_required() {
        let mut cmd = command("http://localhost:3000".to_string());
        cmd.project_id = None;
        assert!(cmd.widget_config().is_err());
    }
}
