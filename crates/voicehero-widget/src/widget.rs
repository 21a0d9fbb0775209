//! The per-page-load widget instance tying the pipeline together.

use crate::bot::BotFilter;
use crate::config::WidgetConfig;
use crate::context::{get_context, BrowserEnvironment};
use crate::delivery::DeliveryController;
use crate::error::WidgetError;
use crate::playback::{MediaEvent, PlaybackTracker};
use crate::playback_context::{PlaybackClient, PlaybackContext, SegmentIdentity};
use crate::session::{KeyValueStorage, SessionStore};
use crate::transport::{EventTransport, HttpTransport};
use crate::unload::{PageLifecycle, UnloadFlush, UnloadHook};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use voicehero_core::{now_millis, AnalyticsEvent, EventType};

/// Widget state for one page load.
///
/// Create it when the page loads, call [`load`](Self::load) once to resolve
/// the visitor's segment, then forward media and page lifecycle
/// notifications to it. Every event it emits carries the segment chosen by
/// `load`.
pub struct VoiceWidget {
    config: WidgetConfig,
    environment: BrowserEnvironment,
    bot_filter: BotFilter,
    sessions: SessionStore,
    session_id: String,
    playback_client: PlaybackClient,
    controller: Arc<DeliveryController>,
    unload: UnloadHook,
    tracker: PlaybackTracker,
    segment: Option<SegmentIdentity>,
    audio_url: Option<String>,
    voice_disabled: bool,
    flush_task: Option<JoinHandle<()>>,
}

impl VoiceWidget {
    pub fn new(
        config: WidgetConfig,
        environment: BrowserEnvironment,
        storage: Arc<dyn KeyValueStorage>,
    ) -> Result<Self, WidgetError> {
        config.validate()?;
        // Requests go out as the page would send them
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(environment.user_agent.clone())
            .build()?;
        let transport: Arc<dyn EventTransport> =
            Arc::new(HttpTransport::new(client.clone(), &config));
        let playback_client = PlaybackClient::new(client, &config);
        Ok(Self::with_parts(
            config,
            environment,
            storage,
            transport,
            playback_client,
        ))
    }

    pub fn with_parts(
        config: WidgetConfig,
        environment: BrowserEnvironment,
        storage: Arc<dyn KeyValueStorage>,
        transport: Arc<dyn EventTransport>,
        playback_client: PlaybackClient,
    ) -> Self {
        let sessions = SessionStore::new(storage);
        let session_id = sessions.get_or_create_session_id();
        let controller = Arc::new(DeliveryController::new(transport, config.delivery.clone()));
        let unload = UnloadHook::new(controller.clone());

        Self {
            bot_filter: BotFilter::new(config.bot_filter.clone()),
            config,
            environment,
            sessions,
            session_id,
            playback_client,
            controller,
            unload,
            tracker: PlaybackTracker::new(),
            segment: None,
            audio_url: None,
            voice_disabled: false,
            flush_task: None,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn segment(&self) -> Option<&SegmentIdentity> {
        self.segment.as_ref()
    }

    pub fn voice_disabled(&self) -> bool {
        self.voice_disabled
    }

    pub fn controller(&self) -> &Arc<DeliveryController> {
        &self.controller
    }

    pub fn tracker(&self) -> &PlaybackTracker {
        &self.tracker
    }

    /// Resolve the playback segment and announce `widget.loaded`.
    pub async fn load(&mut self) -> Result<PlaybackContext, WidgetError> {
        let env = &self.environment;
        if self
            .bot_filter
            .is_bot_strict(&env.user_agent, &env.navigator, &env.screen)
        {
            debug!("Automated traffic detected, widget stays disabled");
            return Err(WidgetError::Bot);
        }

        let context = get_context(env);
        let returning = self.sessions.is_returning_visitor();
        let playback = self
            .playback_client
            .fetch(&self.config.project_id, &context, returning)
            .await?;
        self.sessions.mark_returning_visitor();

        info!(
            "Widget loaded for project {} with segment {} (returning={})",
            self.config.project_id, playback.segment.id, returning
        );

        self.segment = Some(playback.segment.clone());
        self.voice_disabled = playback.voice_disabled;
        self.audio_url = playback.audio_url.clone();
        if let Some(url) = &playback.audio_url {
            self.tracker.load_source(url.clone());
        }

        self.track(EventType::WidgetLoaded, Map::new()).await;
        Ok(playback)
    }

    /// Start the background batch flush. Idempotent.
    pub fn start_flush_loop(&mut self) {
        if self.flush_task.is_none() {
            self.flush_task = Some(self.controller.spawn_flush_loop());
        }
    }

    fn build_event(&self, event_type: EventType, metadata: Map<String, Value>) -> Option<AnalyticsEvent> {
        let segment = self.segment.as_ref()?;
        Some(AnalyticsEvent {
            session_id: self.session_id.clone(),
            event_type,
            timestamp: now_millis(),
            project_id: self.config.project_id.clone(),
            segment_type: segment.segment_type.clone(),
            segment_id: segment.id.clone(),
            audio_version: segment.audio_version.clone(),
            script_version: segment.script_version.clone(),
            audio_url: self.audio_url.clone(),
            metadata,
            user_context: get_context(&self.environment).to_map(),
        })
    }

    fn is_bot(&self) -> bool {
        self.bot_filter
            .is_bot(&self.environment.user_agent, &self.environment.navigator)
    }

    /// Emit an event for the current segment. Returns false when the event
    /// was discarded (automated traffic, or no segment loaded yet).
    pub async fn track(&self, event_type: EventType, metadata: Map<String, Value>) -> bool {
        if self.is_bot() {
            debug!("Discarding {} event from automated traffic", event_type);
            return false;
        }
        let Some(event) = self.build_event(event_type, metadata) else {
            debug!("Discarding {} event, no segment loaded", event_type);
            return false;
        };
        self.controller.track(event).await;
        true
    }

    pub async fn bubble_clicked(&self) -> bool {
        self.track(EventType::BubbleClicked, Map::new()).await
    }

    pub async fn conversation_started(&self) -> bool {
        self.track(EventType::ConversationStart, Map::new()).await
    }

    pub async fn interaction_saved(&self, metadata: Map<String, Value>) -> bool {
        self.track(EventType::InteractionSaved, metadata).await
    }

    pub async fn ai_response(&self, response_time: Duration) -> bool {
        let mut metadata = Map::new();
        metadata.insert("responseTime".to_string(), json!(response_time.as_millis() as u64));
        self.track(EventType::AiResponse, metadata).await
    }

    pub async fn handle_media_event(&mut self, event: MediaEvent) {
        match event {
            MediaEvent::SourceLoaded { url } => {
                self.tracker.load_source(url.clone());
                self.audio_url = Some(url);
            }
            MediaEvent::Play => {
                let metadata = self.tracker.on_play();
                self.track(EventType::AudioPlay, metadata).await;
            }
            MediaEvent::Pause => {
                let metadata = self.tracker.on_pause();
                self.track(EventType::AudioPause, metadata).await;
            }
            MediaEvent::TimeUpdate {
                current_time,
                duration,
            } => {
                for event_type in self.tracker.on_time_update(current_time, duration) {
                    let mut metadata = Map::new();
                    metadata.insert("currentTime".to_string(), json!(current_time));
                    metadata.insert("audioDuration".to_string(), json!(duration));
                    self.track(event_type, metadata).await;
                }
            }
            MediaEvent::Ended => {
                if let Some(metadata) = self.tracker.on_ended() {
                    self.track(EventType::AudioComplete, metadata).await;
                }
            }
        }
    }

    /// Synchronous: on teardown everything left is handed to beacons.
    pub fn handle_page_lifecycle(&mut self, event: PageLifecycle) -> Option<UnloadFlush> {
        if !event.is_teardown() {
            return None;
        }

        let abandonment = if self.is_bot() {
            None
        } else {
            self.tracker
                .take_abandonment()
                .and_then(|metadata| self.build_event(EventType::AudioAbandoned, metadata))
        };
        Some(self.unload.flush(abandonment))
    }
}

impl Drop for VoiceWidget {
    fn drop(&mut self) {
        if let Some(task) = self.flush_task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::{NavigatorFlags, ScreenInfo};
    use crate::delivery::DeliveryMode;
    use crate::session::{MemoryStorage, RETURNING_VISITOR_KEY};
    use crate::testing::RecordingTransport;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const CHROME: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36";

    fn environment(user_agent: &str) -> BrowserEnvironment {
        BrowserEnvironment {
            user_agent: user_agent.to_string(),
            language: Some("en-US".to_string()),
            screen: ScreenInfo::new(1920, 1080),
            referrer: Some("https://google.com/".to_string()),
            page_url: Some("https://example.com/?utm_campaign=launch".to_string()),
            page_title: Some("Home".to_string()),
            navigator: NavigatorFlags::default(),
        }
    }

    async fn mount_playback(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/api/playback"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "segment": {
                    "type": "new_visitor",
                    "id": "seg-new",
                    "audioVersion": "2",
                    "scriptVersion": "5"
                },
                "transcript": "Hi there!",
                "audioUrl": "https://cdn.example.com/seg-new-v2.mp3",
                "voiceDisabled": false
            })))
            .mount(server)
            .await;
    }

    fn widget(
        server: &MockServer,
        user_agent: &str,
        storage: Arc<dyn KeyValueStorage>,
        transport: Arc<RecordingTransport>,
    ) -> VoiceWidget {
        let config = WidgetConfig::new(server.uri(), "project-1");
        let playback_client = PlaybackClient::new(reqwest::Client::new(), &config);
        VoiceWidget::with_parts(config, environment(user_agent), storage, transport, playback_client)
    }

    fn sent_event_types(transport: &RecordingTransport) -> Vec<EventType> {
        transport
            .sent()
            .into_iter()
            .flat_map(|payload| payload.into_events())
            .map(|event| event.event_type)
            .collect()
    }

    #[tokio::test]
    async fn test_load_stamps_segment_and_marks_returning() {
        let mock_server = MockServer::start().await;
        mount_playback(&mock_server).await;
        let storage = Arc::new(MemoryStorage::new());
        let transport = Arc::new(RecordingTransport::new());

        let mut widget = widget(&mock_server, CHROME, storage.clone(), transport.clone());
        let playback = widget.load().await.unwrap();

        assert_eq!(playback.segment.id, "seg-new");
        assert_eq!(storage.get(RETURNING_VISITOR_KEY).unwrap().as_deref(), Some("true"));

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        let event = sent[0].clone().into_events().remove(0);
        assert_eq!(event.event_type, EventType::WidgetLoaded);
        assert_eq!(event.session_id, widget.session_id());
        assert_eq!(event.segment_type, "new_visitor");
        assert_eq!(event.segment_id, "seg-new");
        assert_eq!(event.audio_version, "2");
        assert_eq!(event.script_version, "5");
        assert_eq!(event.user_context["utmCampaign"], "launch");
        assert_eq!(event.user_context["deviceType"], "desktop");
    }

    #[tokio::test]
    async fn test_bot_never_loads() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/playback"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;
        let transport = Arc::new(RecordingTransport::new());

        let mut widget = widget(
            &mock_server,
            "Mozilla/5.0 (compatible; Googlebot/2.1)",
            Arc::new(MemoryStorage::new()),
            transport.clone(),
        );

        assert!(matches!(widget.load().await, Err(WidgetError::Bot)));
        assert!(!widget.bubble_clicked().await);
        assert_eq!(transport.attempts(), 0);
    }

    #[tokio::test]
    async fn test_track_before_load_is_discarded() {
        let mock_server = MockServer::start().await;
        let transport = Arc::new(RecordingTransport::new());
        let widget = widget(&mock_server, CHROME, Arc::new(MemoryStorage::new()), transport.clone());

        assert!(!widget.bubble_clicked().await);
        assert_eq!(transport.attempts(), 0);
    }

    #[tokio::test]
    async fn test_playback_lifecycle_events() {
        let mock_server = MockServer::start().await;
        mount_playback(&mock_server).await;
        let transport = Arc::new(RecordingTransport::new());
        let mut widget = widget(&mock_server, CHROME, Arc::new(MemoryStorage::new()), transport.clone());
        widget.load().await.unwrap();

        widget.handle_media_event(MediaEvent::Play).await;
        widget
            .handle_media_event(MediaEvent::TimeUpdate { current_time: 5.0, duration: 20.0 })
            .await;
        widget
            .handle_media_event(MediaEvent::TimeUpdate { current_time: 5.2, duration: 20.0 })
            .await;
        widget
            .handle_media_event(MediaEvent::TimeUpdate { current_time: 11.0, duration: 20.0 })
            .await;
        widget.handle_media_event(MediaEvent::Ended).await;
        widget.handle_media_event(MediaEvent::Ended).await;

        assert_eq!(
            sent_event_types(&transport),
            vec![
                EventType::WidgetLoaded,
                EventType::AudioPlay,
                EventType::AudioProgress25,
                EventType::AudioProgress50,
                EventType::AudioComplete,
            ]
        );

        // Nothing mid-playback any more, so teardown sends nothing
        let report = widget.handle_page_lifecycle(PageLifecycle::PageHide).unwrap();
        assert_eq!(report, UnloadFlush::default());
    }

    #[tokio::test]
    async fn test_new_source_restarts_milestones() {
        let mock_server = MockServer::start().await;
        mount_playback(&mock_server).await;
        let transport = Arc::new(RecordingTransport::new());
        let mut widget = widget(&mock_server, CHROME, Arc::new(MemoryStorage::new()), transport.clone());
        widget.load().await.unwrap();

        widget
            .handle_media_event(MediaEvent::TimeUpdate { current_time: 6.0, duration: 20.0 })
            .await;
        widget
            .handle_media_event(MediaEvent::SourceLoaded { url: "https://cdn.example.com/v3.mp3".to_string() })
            .await;
        widget
            .handle_media_event(MediaEvent::TimeUpdate { current_time: 6.0, duration: 20.0 })
            .await;

        let events: Vec<AnalyticsEvent> = transport
            .sent()
            .into_iter()
            .flat_map(|payload| payload.into_events())
            .collect();
        assert_eq!(events.len(), 3);
        assert_eq!(events[2].event_type, EventType::AudioProgress25);
        assert_eq!(events[2].audio_url.as_deref(), Some("https://cdn.example.com/v3.mp3"));
    }

    #[tokio::test]
    async fn test_teardown_mid_playback_beacons_abandonment_and_queue() {
        let mock_server = MockServer::start().await;
        mount_playback(&mock_server).await;
        let transport = Arc::new(RecordingTransport::failing());
        let mut widget = widget(&mock_server, CHROME, Arc::new(MemoryStorage::new()), transport.clone());
        widget.load().await.unwrap();

        widget.handle_media_event(MediaEvent::Play).await;
        widget
            .handle_media_event(MediaEvent::TimeUpdate { current_time: 9.6, duration: 20.0 })
            .await;
        assert_eq!(widget.controller().mode(), DeliveryMode::Batched);
        assert_eq!(widget.controller().queue_len(), 3);

        assert!(widget.handle_page_lifecycle(PageLifecycle::VisibilityVisible).is_none());

        let report = widget
            .handle_page_lifecycle(PageLifecycle::VisibilityHidden)
            .unwrap();
        assert!(report.abandonment_sent);
        assert_eq!(report.flushed_events, 3);

        let beacons = transport.beacons();
        let abandoned = beacons[0].clone().into_events().remove(0);
        assert_eq!(abandoned.event_type, EventType::AudioAbandoned);
        assert_eq!(abandoned.metadata["completionRate"], json!(48.0));
        assert_eq!(abandoned.metadata["listeningDuration"], json!(9.6));
        assert_eq!(abandoned.segment_id, "seg-new");

        // pagehide right after visibilitychange: nothing left to send
        let second = widget.handle_page_lifecycle(PageLifecycle::PageHide).unwrap();
        assert_eq!(second, UnloadFlush::default());
        assert_eq!(transport.beacons().len(), 2);
    }

    #[tokio::test]
    async fn test_ai_response_metadata() {
        let mock_server = MockServer::start().await;
        mount_playback(&mock_server).await;
        let transport = Arc::new(RecordingTransport::new());
        let mut widget = widget(&mock_server, CHROME, Arc::new(MemoryStorage::new()), transport.clone());
        widget.load().await.unwrap();

        assert!(widget.ai_response(Duration::from_millis(1250)).await);

        let last = transport.sent().pop().unwrap().into_events().remove(0);
        assert_eq!(last.event_type, EventType::AiResponse);
        assert_eq!(last.metadata["responseTime"], json!(1250));
    }

    #[tokio::test]
    async fn test_session_id_reused_across_page_loads() {
        let mock_server = MockServer::start().await;
        let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new());

        let first = widget(&mock_server, CHROME, storage.clone(), Arc::new(RecordingTransport::new()));
        let second = widget(&mock_server, CHROME, storage, Arc::new(RecordingTransport::new()));

        assert_eq!(first.session_id(), second.session_id());
    }
}
