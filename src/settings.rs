use serde::{Deserialize, Serialize};

/// Players tried in order when `audio_player` is "auto". Each reads the
/// encoded audio from stdin.
pub const PLAYER_PRESET_LIST: &[&str] = &["mpv", "ffplay"];

pub const DEFAULT_PAGE_SIZE: usize = 30;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub page_size: usize,
    pub tts_enabled: bool,
    pub tts_language: String,
    pub tts_tld: String,
    pub tts_retries: u32,
    pub tts_base_sleep_ms: u64,
    pub tts_timeout_secs: u64,
    pub audio_player: String,
    pub audio_format: String,
    pub database: Option<String>,
    pub mouse_support: bool,
}

impl Settings {
    pub fn effective_page_size(&self) -> usize {
        self.page_size.max(1)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            tts_enabled: true,
            tts_language: "en".to_string(),
            tts_tld: "co.uk".to_string(),
            tts_retries: 3,
            tts_base_sleep_ms: 1000,
            tts_timeout_secs: 10,
            audio_player: "auto".to_string(),
            audio_format: "mp3".to_string(),
            database: None,
            mouse_support: true,
        }
    }
}
