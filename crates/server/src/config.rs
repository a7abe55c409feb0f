use std::{collections::HashMap, fs};

#[derive(Debug, Clone)]
pub struct Settings {
    pub server_bind: String,
    pub static_dir: String,
    pub tracker_base_url: String,
    pub sheets_api_base: String,
    pub oauth_token_url: String,
    pub request_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "0.0.0.0:9000".into(),
            static_dir: "./public".into(),
            tracker_base_url: "https://www.pivotaltracker.com/".into(),
            sheets_api_base: sheets::DEFAULT_API_BASE.into(),
            oauth_token_url: sheets::DEFAULT_TOKEN_URL.into(),
            request_timeout_secs: 30,
        }
    }
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string("storyport.toml") {
        apply_file_config(&mut settings, &raw);
    }

    if let Ok(v) = std::env::var("SERVER_BIND") {
        settings.server_bind = v;
    }
    // Platform-style port variable, kept for parity with the original
    // deployment environment.
    if let Ok(v) = std::env::var("PORT") {
        if let Some(bind) = bind_addr_for_port(&v) {
            settings.server_bind = bind;
        }
    }
    if let Ok(v) = std::env::var("STATIC_DIR") {
        settings.static_dir = v;
    }
    if let Ok(v) = std::env::var("TRACKER_BASE_URL") {
        settings.tracker_base_url = v;
    }
    if let Ok(v) = std::env::var("SHEETS_API_BASE") {
        settings.sheets_api_base = v;
    }
    if let Ok(v) = std::env::var("OAUTH_TOKEN_URL") {
        settings.oauth_token_url = v;
    }
    if let Ok(v) = std::env::var("REQUEST_TIMEOUT_SECS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.request_timeout_secs = parsed;
        }
    }

    settings
}

fn apply_file_config(settings: &mut Settings, raw: &str) {
    let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(raw) else {
        return;
    };
    if let Some(v) = file_cfg.get("bind_addr") {
        settings.server_bind = v.clone();
    }
    if let Some(v) = file_cfg.get("static_dir") {
        settings.static_dir = v.clone();
    }
    if let Some(v) = file_cfg.get("tracker_base_url") {
        settings.tracker_base_url = v.clone();
    }
    if let Some(v) = file_cfg.get("sheets_api_base") {
        settings.sheets_api_base = v.clone();
    }
    if let Some(v) = file_cfg.get("oauth_token_url") {
        settings.oauth_token_url = v.clone();
    }
    if let Some(v) = file_cfg.get("request_timeout_secs") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.request_timeout_secs = parsed;
        }
    }
}

fn bind_addr_for_port(port: &str) -> Option<String> {
    port.trim()
        .parse::<u16>()
        .ok()
        .map(|port| format!("0.0.0.0:{port}"))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
