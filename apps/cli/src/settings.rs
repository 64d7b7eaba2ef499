use std::{collections::HashMap, fs};

#[derive(Debug, Clone)]
pub struct Settings {
    pub base_url: String,
    pub api_key: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".into(),
            api_key: "devkey".into(),
        }
    }
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string("fitsync.toml") {
        apply_file(&mut settings, &raw);
    }

    if let Ok(v) = std::env::var("APP__BASE_URL") {
        settings.base_url = v;
    }
    if let Ok(v) = std::env::var("APP__API_KEY") {
        settings.api_key = v;
    }

    settings
}

fn apply_file(settings: &mut Settings, raw: &str) {
    if let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(raw) {
        if let Some(v) = file_cfg.get("base_url") {
            settings.base_url = v.clone();
        }
        if let Some(v) = file_cfg.get("api_key") {
            settings.api_key = v.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_values_override_defaults() {
        let mut settings = Settings::default();
        apply_file(
            &mut settings,
            "base_url = \"https://api.example.com\"\napi_key = \"abc123\"\n",
        );
        assert_eq!(settings.base_url, "https://api.example.com");
        assert_eq!(settings.api_key, "abc123");
    }

    #[test]
    fn malformed_file_keeps_defaults() {
        let mut settings = Settings::default();
        apply_file(&mut settings, "not toml at all [[[");
        assert_eq!(settings.base_url, Settings::default().base_url);
    }
}
