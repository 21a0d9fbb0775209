//! Heuristic detection of automated traffic.
//!
//! Two levels are offered. [`BotFilter::is_bot`] looks only at the user agent
//! and navigator flags and is cheap enough to run for every emitted event.
//! [`BotFilter::is_bot_strict`] adds screen geometry and API availability and
//! decides whether the widget initializes at all.
//!
//! The heuristics lean towards letting unusual browsers through; the token
//! list and thresholds live in [`BotFilterConfig`] so deployments can tune
//! them.

use serde::{Deserialize, Serialize};
use tracing::debug;

const DEFAULT_DENYLIST: &[&str] = &[
    // Generic automation markers
    "bot",
    "crawler",
    "spider",
    "scraper",
    "headless",
    "phantomjs",
    "selenium",
    "puppeteer",
    "playwright",
    // HTTP libraries and command line clients
    "curl",
    "wget",
    "python-requests",
    "python-urllib",
    "aiohttp",
    "axios",
    "node-fetch",
    "go-http-client",
    "java/",
    "okhttp",
    "libwww-perl",
    "httpclient",
    // AI crawlers and link unfurlers
    "gptbot",
    "chatgpt",
    "claudebot",
    "claude-web",
    "anthropic-ai",
    "perplexitybot",
    "ccbot",
    "bytespider",
    "amazonbot",
    "cohere-ai",
    "facebookexternalhit",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct BotFilterConfig {
    /// Case-insensitive substrings that mark a user agent as automated
    pub denylist: Vec<String>,
    /// Screens narrower or shorter than this are treated as headless
    pub min_screen_dimension: u32,
    /// Screens wider or taller than this are treated as synthetic
    pub max_screen_dimension: u32,
}

impl Default for BotFilterConfig {
    fn default() -> Self {
        Self {
            denylist: DEFAULT_DENYLIST.iter().map(|s| s.to_string()).collect(),
            min_screen_dimension: 100,
            max_screen_dimension: 10_000,
        }
    }
}

/// Navigator capabilities reported by the host page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigatorFlags {
    pub webdriver: bool,
    pub cookies_enabled: bool,
    pub has_fetch: bool,
    pub has_navigator: bool,
}

impl Default for NavigatorFlags {
    fn default() -> Self {
        Self {
            webdriver: false,
            cookies_enabled: true,
            has_fetch: true,
            has_navigator: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenInfo {
    pub width: u32,
    pub height: u32,
}

impl ScreenInfo {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Clone)]
pub struct BotFilter {
    config: BotFilterConfig,
    tokens: Vec<String>,
}

impl Default for BotFilter {
    fn default() -> Self {
        Self::new(BotFilterConfig::default())
    }
}

impl BotFilter {
    pub fn new(config: BotFilterConfig) -> Self {
        let tokens = config
            .denylist
            .iter()
            .map(|token| token.trim().to_ascii_lowercase())
            .filter(|token| !token.is_empty())
            .collect();
        Self { config, tokens }
    }

    pub fn config(&self) -> &BotFilterConfig {
        &self.config
    }

    /// Denylisted token found in the user agent, if any
    pub fn matched_token(&self, user_agent: &str) -> Option<&str> {
        let ua = user_agent.to_ascii_lowercase();
        self.tokens
            .iter()
            .find(|token| ua.contains(token.as_str()))
            .map(String::as_str)
    }

    /// Whether the user agent alone looks automated
    pub fn is_bot_user_agent(&self, user_agent: &str) -> bool {
        if user_agent.trim().is_empty() {
            return true;
        }
        self.matched_token(user_agent).is_some()
    }

    pub fn is_bot(&self, user_agent: &str, navigator: &NavigatorFlags) -> bool {
        if self.is_bot_user_agent(user_agent) {
            debug!("Bot user agent detected: {}", user_agent);
            return true;
        }
        if navigator.webdriver {
            debug!("navigator.webdriver set, treating as automated");
            return true;
        }
        if !navigator.cookies_enabled {
            debug!("Cookies disabled, treating as automated");
            return true;
        }
        false
    }

    /// Load-time check: everything [`is_bot`](Self::is_bot) checks plus screen and API sanity
    pub fn is_bot_strict(
        &self,
        user_agent: &str,
        navigator: &NavigatorFlags,
        screen: &ScreenInfo,
    ) -> bool {
        if self.is_bot(user_agent, navigator) {
            return true;
        }
        if self.is_suspicious_screen(screen) {
            debug!("Suspicious screen dimensions {}", screen.resolution());
            return true;
        }
        if !navigator.has_fetch || !navigator.has_navigator {
            debug!("Missing browser APIs (fetch={}, navigator={})", navigator.has_fetch, navigator.has_navigator);
            return true;
        }
        false
    }

    fn is_suspicious_screen(&self, screen: &ScreenInfo) -> bool {
        let min = self.config.min_screen_dimension;
        let max = self.config.max_screen_dimension;
        screen.width == 0
            || screen.height == 0
            || screen.width < min
            || screen.height < min
            || screen.width > max
            || screen.height > max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHROME_DESKTOP: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36";

    #[test]
    fn test_googlebot_is_bot() {
        let filter = BotFilter::default();
        assert!(filter.is_bot(
            "Mozilla/5.0 (compatible; Googlebot/2.1)",
            &NavigatorFlags::default()
        ));
    }

    #[test]
    fn test_chrome_desktop_is_human() {
        let filter = BotFilter::default();
        assert!(!filter.is_bot(CHROME_DESKTOP, &NavigatorFlags::default()));
        assert!(!filter.is_bot_strict(
            CHROME_DESKTOP,
            &NavigatorFlags::default(),
            &ScreenInfo::new(1920, 1080)
        ));
    }

    #[test]
    fn test_empty_user_agent() {
        let filter = BotFilter::default();
        assert!(filter.is_bot("", &NavigatorFlags::default()));
        assert!(filter.is_bot("   ", &NavigatorFlags::default()));
    }

    #[test]
    fn test_library_and_ai_crawler_tokens() {
        let filter = BotFilter::default();
        let flags = NavigatorFlags::default();
        assert!(filter.is_bot("curl/8.4.0", &flags));
        assert!(filter.is_bot("python-requests/2.31.0", &flags));
        assert!(filter.is_bot("Mozilla/5.0 AppleWebKit/537.36 (KHTML, like Gecko; compatible; GPTBot/1.0)", &flags));
        assert!(filter.is_bot("Mozilla/5.0 (X11; Linux x86_64) HeadlessChrome/119.0.0.0", &flags));
        assert_eq!(filter.matched_token("CCBot/2.0"), Some("bot"));
    }

    #[test]
    fn test_navigator_flags() {
        let filter = BotFilter::default();
        let webdriver = NavigatorFlags {
            webdriver: true,
            ..NavigatorFlags::default()
        };
        let no_cookies = NavigatorFlags {
            cookies_enabled: false,
            ..NavigatorFlags::default()
        };
        assert!(filter.is_bot(CHROME_DESKTOP, &webdriver));
        assert!(filter.is_bot(CHROME_DESKTOP, &no_cookies));
    }

    #[test]
    fn test_strict_screen_dimensions() {
        let filter = BotFilter::default();
        let flags = NavigatorFlags::default();
        assert!(filter.is_bot_strict(CHROME_DESKTOP, &flags, &ScreenInfo::new(0, 0)));
        assert!(filter.is_bot_strict(CHROME_DESKTOP, &flags, &ScreenInfo::new(80, 600)));
        assert!(filter.is_bot_strict(CHROME_DESKTOP, &flags, &ScreenInfo::new(12_000, 800)));
        assert!(!filter.is_bot_strict(CHROME_DESKTOP, &flags, &ScreenInfo::new(390, 844)));
        // The lenient check ignores geometry
        assert!(!filter.is_bot(CHROME_DESKTOP, &flags));
    }

    #[test]
    fn test_strict_missing_apis() {
        let filter = BotFilter::default();
        let no_fetch = NavigatorFlags {
            has_fetch: false,
            ..NavigatorFlags::default()
        };
        assert!(filter.is_bot_strict(CHROME_DESKTOP, &no_fetch, &ScreenInfo::new(1280, 720)));
    }

    #[test]
    fn test_custom_denylist() {
        let filter = BotFilter::new(BotFilterConfig {
            denylist: vec!["InternalMonitor".to_string(), "  ".to_string()],
            ..BotFilterConfig::default()
        });
        assert!(filter.is_bot("internalmonitor/1.0", &NavigatorFlags::default()));
        assert!(!filter.is_bot("Googlebot/2.1", &NavigatorFlags::default()));
    }
}
