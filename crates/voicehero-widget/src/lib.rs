//! Analytics pipeline of the embedded VoiceHero widget.
//!
//! A [`VoiceWidget`] is created once per page load. It filters automated
//! traffic, resolves the visitor's session and playback segment, and feeds
//! lifecycle events through a [`DeliveryController`] that sends them in
//! real time or, after a delivery failure, in periodic batches.

pub mod bot;
pub mod config;
pub mod context;
pub mod delivery;
pub mod error;
pub mod playback;
pub mod playback_context;
pub mod session;
#[cfg(test)]
mod testing;
pub mod transport;
pub mod unload;
pub mod widget;

pub use bot::{BotFilter, BotFilterConfig, NavigatorFlags, ScreenInfo};
pub use config::{DeliveryConfig, WidgetConfig};
pub use context::{get_context, BrowserEnvironment, DeviceType, UserContext};
pub use delivery::{DeliveryController, DeliveryMode, FlushOutcome};
pub use error::WidgetError;
pub use playback::{completion_rate, MediaEvent, PlaybackTracker};
pub use playback_context::{PlaybackClient, PlaybackContext, SegmentIdentity};
pub use session::{FileStorage, KeyValueStorage, MemoryStorage, SessionStore, UnavailableStorage};
pub use transport::{EventPayload, EventTransport, HttpTransport};
pub use unload::{PageLifecycle, UnloadFlush, UnloadHook};
pub use voicehero_core::{AnalyticsEvent, EventType};
pub use widget::VoiceWidget;
