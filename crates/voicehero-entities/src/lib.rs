pub mod analytics_events;
