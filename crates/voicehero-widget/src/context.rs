//! Snapshot of visitor device, page and campaign facts attached to every event.

use crate::bot::{NavigatorFlags, ScreenInfo};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

static TABLET_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)tablet|ipad|playbook|silk|kindle|nexus (7|9|10)|sm-t\d")
        .expect("tablet pattern is valid")
});

static ANDROID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)android").expect("android pattern is valid"));

static MOBI_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)mobi").expect("mobi pattern is valid"));

static MOBILE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)mobile|iphone|ipod|android|blackberry|iemobile|opera m(obi|ini)|(hpw|web)os|windows phone",
    )
    .expect("mobile pattern is valid")
});

/// Raw facts the host page exposes about the visitor's browser
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserEnvironment {
    pub user_agent: String,
    pub language: Option<String>,
    pub screen: ScreenInfo,
    pub referrer: Option<String>,
    pub page_url: Option<String>,
    pub page_title: Option<String>,
    #[serde(default)]
    pub navigator: NavigatorFlags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Mobile,
    Tablet,
    Desktop,
}

impl DeviceType {
    /// Tablets are matched first: most tablet agents also match the mobile pattern.
    pub fn from_user_agent(user_agent: &str) -> Self {
        let android_tablet = ANDROID_RE.is_match(user_agent) && !MOBI_RE.is_match(user_agent);
        if TABLET_RE.is_match(user_agent) || android_tablet {
            DeviceType::Tablet
        } else if MOBILE_RE.is_match(user_agent) {
            DeviceType::Mobile
        } else {
            DeviceType::Desktop
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserContext {
    pub device_type: DeviceType,
    pub user_agent: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub screen_resolution: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_medium: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_campaign: Option<String>,
}

impl UserContext {
    pub fn to_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
struct UtmParams {
    source: Option<String>,
    medium: Option<String>,
    campaign: Option<String>,
}

fn utm_params(page_url: Option<&str>) -> UtmParams {
    let Some(parsed) = page_url.and_then(|u| url::Url::parse(u).ok()) else {
        return UtmParams::default();
    };

    let mut params = UtmParams::default();
    for (key, value) in parsed.query_pairs() {
        if value.is_empty() {
            continue;
        }
        match key.as_ref() {
            "utm_source" => params.source = Some(value.into_owned()),
            "utm_medium" => params.medium = Some(value.into_owned()),
            "utm_campaign" => params.campaign = Some(value.into_owned()),
            _ => {}
        }
    }
    params
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub fn get_context(env: &BrowserEnvironment) -> UserContext {
    let utm = utm_params(env.page_url.as_deref());
    UserContext {
        device_type: DeviceType::from_user_agent(&env.user_agent),
        user_agent: env.user_agent.clone(),
        language: non_empty(&env.language),
        screen_resolution: env.screen.resolution(),
        referrer: non_empty(&env.referrer),
        page_url: non_empty(&env.page_url),
        page_title: non_empty(&env.page_title),
        utm_source: utm.source,
        utm_medium: utm.medium,
        utm_campaign: utm.campaign,
    }
}
