//! `SeaORM` Entity for analytics_events table

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use voicehero_core::UtcDateTime;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "analytics_events")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    // Playback identity
    pub session_id: String,
    pub event_type: String,
    pub event_timestamp: UtcDateTime,
    pub project_id: String,
    pub segment_type: String,
    pub segment_id: String,
    pub audio_version: String,
    pub script_version: String,
    pub audio_url: Option<String>,

    // Copied out of metadata for aggregation
    pub completion_rate: Option<f64>,

    pub metadata: Json,
    pub user_context: Json,

    // Request facts
    pub ip_address: Option<String>,
    pub server_user_agent: Option<String>,
    pub received_at: UtcDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
