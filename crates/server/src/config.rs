use std::{collections::HashMap, fs};

#[derive(Debug, Clone)]
pub struct Settings {
    pub bind_addr: String,
    pub body_limit_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8820".into(),
            body_limit_bytes: 16 * 1024,
        }
    }
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string("server.toml") {
        apply_file_config(&mut settings, &raw);
    }

    if let Ok(v) = std::env::var("SERVER_BIND") {
        settings.bind_addr = v;
    }
    if let Ok(v) = std::env::var("SERVER_BODY_LIMIT") {
        if let Ok(parsed) = v.parse::<usize>() {
            settings.body_limit_bytes = parsed;
        }
    }

    settings
}

fn apply_file_config(settings: &mut Settings, raw: &str) {
    if let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(raw) {
        if let Some(v) = file_cfg.get("bind_addr") {
            settings.bind_addr = v.clone();
        }
        if let Some(v) = file_cfg.get("body_limit_bytes") {
            if let Ok(parsed) = v.parse::<usize>() {
                settings.body_limit_bytes = parsed;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_config_overrides_defaults() {
        let mut settings = Settings::default();
        apply_file_config(
            &mut settings,
            "bind_addr = \"0.0.0.0:9000\"\nbody_limit_bytes = \"4096\"\n",
        );
        assert_eq!(settings.bind_addr, "0.0.0.0:9000");
        assert_eq!(settings.body_limit_bytes, 4096);
    }

    #[test]
    fn unparseable_body_limit_keeps_the_default() {
        let mut settings = Settings::default();
        apply_file_config(&mut settings, "body_limit_bytes = \"lots\"\n");
        assert_eq!(settings.body_limit_bytes, Settings::default().body_limit_bytes);
    }

    #[test]
    fn malformed_file_is_ignored() {
        let mut settings = Settings::default();
        apply_file_config(&mut settings, "not toml at all [");
        assert_eq!(settings.bind_addr, Settings::default().bind_addr);
    }
}
