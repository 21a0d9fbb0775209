//! Bridge between the audio element's lifecycle and analytics events.

use serde_json::{json, Map, Value};
use voicehero_core::EventType;

pub const PROGRESS_MILESTONES: [u8; 3] = [25, 50, 75];

/// Media element notifications forwarded by the host page
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    /// A new audio source was attached (new segment or version)
    SourceLoaded { url: String },
    Play,
    Pause,
    TimeUpdate { current_time: f64, duration: f64 },
    Ended,
}

/// Percentage listened, rounded to two decimals
pub fn completion_rate(current_time: f64, duration: f64) -> f64 {
    if !duration.is_finite() || duration <= 0.0 || !current_time.is_finite() {
        return 0.0;
    }
    (current_time / duration * 10_000.0).round() / 100.0
}

#[derive(Debug, Default, Clone)]
pub struct PlaybackTracker {
    source: Option<String>,
    milestones_fired: [bool; PROGRESS_MILESTONES.len()],
    completed: bool,
    playing: bool,
    abandonment_reported: bool,
    current_time: f64,
    duration: f64,
}

impl PlaybackTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Attach a new source; every per-playback flag starts over.
    pub fn load_source(&mut self, url: impl Into<String>) {
        *self = Self {
            source: Some(url.into()),
            ..Self::default()
        };
    }

    /// Playing again after the end starts a new listen of the same source.
    /// Milestones stay fired until a new source loads.
    pub fn on_play(&mut self) -> Map<String, Value> {
        if self.completed {
            self.completed = false;
            self.current_time = 0.0;
        }
        self.playing = true;
        self.abandonment_reported = false;
        let mut metadata = Map::new();
        metadata.insert("currentTime".to_string(), json!(self.current_time));
        if self.duration > 0.0 {
            metadata.insert("audioDuration".to_string(), json!(self.duration));
        }
        metadata
    }

    pub fn on_pause(&mut self) -> Map<String, Value> {
        self.playing = false;
        self.listening_metadata()
    }

    /// Milestones crossed by this tick that have not fired yet for the current source
    pub fn on_time_update(&mut self, current_time: f64, duration: f64) -> Vec<EventType> {
        self.current_time = current_time;
        if duration.is_finite() && duration > 0.0 {
            self.duration = duration;
        } else {
            return Vec::new();
        }

        let progress = current_time / duration * 100.0;
        let mut crossed = Vec::new();
        for (index, milestone) in PROGRESS_MILESTONES.iter().enumerate() {
            if !self.milestones_fired[index] && progress >= f64::from(*milestone) {
                self.milestones_fired[index] = true;
                if let Some(event_type) = EventType::progress(*milestone) {
                    crossed.push(event_type);
                }
            }
        }
        crossed
    }

    /// Metadata for `audio.complete`, only on the first end of this playback
    pub fn on_ended(&mut self) -> Option<Map<String, Value>> {
        self.playing = false;
        if self.completed {
            return None;
        }
        self.completed = true;
        self.current_time = self.duration;

        let mut metadata = Map::new();
        metadata.insert("listeningDuration".to_string(), json!(self.duration));
        metadata.insert("completionRate".to_string(), json!(100));
        metadata.insert("audioDuration".to_string(), json!(self.duration));
        Some(metadata)
    }

    /// Audio is audibly in progress: started, not finished, position past zero.
    pub fn is_mid_playback(&self) -> bool {
        self.playing && !self.completed && self.current_time > 0.0 && self.current_time < self.duration
    }

    /// Metadata for `audio.abandoned` when the page goes away mid-playback.
    /// Reported at most once until playback resumes.
    pub fn take_abandonment(&mut self) -> Option<Map<String, Value>> {
        if !self.is_mid_playback() || self.abandonment_reported {
            return None;
        }
        self.abandonment_reported = true;
        Some(self.listening_metadata())
    }

    fn listening_metadata(&self) -> Map<String, Value> {
        let mut metadata = Map::new();
        metadata.insert("listeningDuration".to_string(), json!(self.current_time));
        metadata.insert(
            "completionRate".to_string(),
            json!(completion_rate(self.current_time, self.duration)),
        );
        metadata.insert("audioDuration".to_string(), json!(self.duration));
        metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_rate_rounding() {
        assert_eq!(completion_rate(9.6, 20.0), 48.0);
        assert_eq!(completion_rate(1.0, 3.0), 33.33);
        assert_eq!(completion_rate(2.0, 3.0), 66.67);
        assert_eq!(completion_rate(5.0, 0.0), 0.0);
        assert_eq!(completion_rate(5.0, f64::NAN), 0.0);
    }

    #[test]
    fn test_milestones_fire_once_per_playback() {
        let mut tracker = PlaybackTracker::new();
        tracker.load_source("https://cdn.example.com/a.mp3");
        tracker.on_play();

        assert!(tracker.on_time_update(4.9, 20.0).is_empty());
        assert_eq!(tracker.on_time_update(5.0, 20.0), vec![EventType::AudioProgress25]);
        assert!(tracker.on_time_update(6.0, 20.0).is_empty());
        // Seeking back and forward again does not refire
        assert!(tracker.on_time_update(1.0, 20.0).is_empty());
        assert!(tracker.on_time_update(5.5, 20.0).is_empty());
        assert_eq!(tracker.on_time_update(10.0, 20.0), vec![EventType::AudioProgress50]);
        assert_eq!(tracker.on_time_update(15.1, 20.0), vec![EventType::AudioProgress75]);
        assert!(tracker.on_time_update(19.9, 20.0).is_empty());
    }

    #[test]
    fn test_jump_crosses_several_milestones() {
        let mut tracker = PlaybackTracker::new();
        tracker.load_source("a.mp3");
        assert_eq!(
            tracker.on_time_update(16.0, 20.0),
            vec![
                EventType::AudioProgress25,
                EventType::AudioProgress50,
                EventType::AudioProgress75
            ]
        );
    }

    #[test]
    fn test_new_source_resets_milestones() {
        let mut tracker = PlaybackTracker::new();
        tracker.load_source("a.mp3");
        assert_eq!(tracker.on_time_update(6.0, 20.0), vec![EventType::AudioProgress25]);

        tracker.load_source("b.mp3");
        assert_eq!(tracker.source(), Some("b.mp3"));
        assert_eq!(tracker.on_time_update(3.0, 10.0), vec![EventType::AudioProgress25]);
    }

    #[test]
    fn test_unknown_duration_fires_nothing() {
        let mut tracker = PlaybackTracker::new();
        tracker.load_source("a.mp3");
        assert!(tracker.on_time_update(5.0, f64::NAN).is_empty());
        assert!(tracker.on_time_update(5.0, 0.0).is_empty());
    }

    #[test]
    fn test_complete_fires_once() {
        let mut tracker = PlaybackTracker::new();
        tracker.load_source("a.mp3");
        tracker.on_play();
        tracker.on_time_update(19.8, 20.0);

        let metadata = tracker.on_ended().unwrap();
        assert_eq!(metadata["listeningDuration"], json!(20.0));
        assert_eq!(metadata["completionRate"], json!(100));
        assert!(tracker.on_ended().is_none());
        assert!(!tracker.is_mid_playback());
    }

    #[test]
    fn test_replay_after_end_can_be_abandoned_and_completed() {
        let mut tracker = PlaybackTracker::new();
        tracker.load_source("a.mp3");
        tracker.on_play();
        tracker.on_time_update(19.9, 20.0);
        assert!(tracker.on_ended().is_some());

        let metadata = tracker.on_play();
        assert_eq!(metadata["currentTime"], json!(0.0));
        // Milestones already fired for this source
        assert!(tracker.on_time_update(10.0, 20.0).is_empty());
        assert!(tracker.is_mid_playback());

        let abandoned = tracker.take_abandonment().unwrap();
        assert_eq!(abandoned["completionRate"], json!(50.0));

        tracker.on_play();
        tracker.on_time_update(19.9, 20.0);
        assert!(tracker.on_ended().is_some());
        assert!(!tracker.is_mid_playback());
    }

    #[test]
    fn test_abandonment_metadata() {
        let mut tracker = PlaybackTracker::new();
        tracker.load_source("a.mp3");
        tracker.on_play();
        tracker.on_time_update(9.6, 20.0);

        let metadata = tracker.take_abandonment().unwrap();
        assert_eq!(metadata["listeningDuration"], json!(9.6));
        assert_eq!(metadata["completionRate"], json!(48.0));
        assert_eq!(metadata["audioDuration"], json!(20.0));

        // visibilitychange and pagehide both fire on teardown
        assert!(tracker.take_abandonment().is_none());

        tracker.on_play();
        assert!(tracker.take_abandonment().is_some());
    }

    #[test]
    fn test_no_abandonment_when_paused_or_not_started() {
        let mut tracker = PlaybackTracker::new();
        tracker.load_source("a.mp3");
        assert!(tracker.take_abandonment().is_none());

        tracker.on_play();
        tracker.on_time_update(3.0, 20.0);
        tracker.on_pause();
        assert!(tracker.take_abandonment().is_none());
    }
}
