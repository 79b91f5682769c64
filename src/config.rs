use std::path::Path;

pub struct Config {
    // Execution
    pub stage_timeout_secs: u64,
    pub wait_poll_ms: u64,
    // Display
    pub show_line_numbers: bool,
    // Logging
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stage_timeout_secs: 0,
            wait_poll_ms: 50,
            show_line_numbers: false,
            log_filter: "warn".to_string(),
        }
    }
}

impl Config {
    /// Load config from YAML file, then apply env overrides.
    pub fn load_from(path: &Path) -> Self {
        let mut cfg = Self::default();
        if let Ok(content) = std::fs::read_to_string(path) {
            for line in content.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if let Some((key, value)) = line.split_once(':') {
                    cfg.apply_key(key.trim(), value.trim());
                }
            }
        }
        cfg.apply_env_overrides();
        cfg
    }

    /// Load config from env overrides only (no YAML file).
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.apply_env_overrides();
        cfg
    }

    /// Load from default config path (~/.config/livepipe/config.yaml) + env.
    pub fn load() -> Self {
        let config_path = expand_tilde("~/.config/livepipe/config.yaml");
        let path = Path::new(&config_path);
        if path.exists() {
            Self::load_from(path)
        } else {
            Self::from_env()
        }
    }

    fn apply_key(&mut self, key: &str, value: &str) {
        let value = value.trim_matches(|c| c == '"' || c == '\'');
        match key {
            "stage_timeout" => {
                if let Ok(v) = value.parse() {
                    self.stage_timeout_secs = v;
                }
            }
            "wait_poll_ms" => {
                if let Ok(v) = value.parse() {
                    self.wait_poll_ms = v;
                }
            }
            "line_numbers" => self.show_line_numbers = parse_bool(value),
            "log" => self.log_filter = value.to_string(),
            _ => {} // Ignore unknown keys
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("LIVEPIPE_STAGE_TIMEOUT") {
            if let Ok(n) = v.parse() {
                self.stage_timeout_secs = n;
            }
        }
        if let Ok(v) = std::env::var("LIVEPIPE_LINE_NUMBERS") {
            self.show_line_numbers = parse_bool(&v);
        }
        if let Ok(v) = std::env::var("LIVEPIPE_LOG") {
            self.log_filter = v;
        }
    }
}

fn parse_bool(value: &str) -> bool {
    !["0", "false", "no", "off", ""].contains(&value.to_lowercase().as_str())
}

/// Expand ~ to home directory. Simple replacement, no shellexpand dep needed.
fn expand_tilde(path: &str) -> String {
    if path.starts_with("~/") || path == "~" {
        if let Ok(home) = std::env::var("HOME") {
            return path.replacen('~', &home, 1);
        }
    }
    path.to_string()
}
