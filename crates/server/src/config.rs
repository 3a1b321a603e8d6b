use std::{env, fs, path::Path};

use anyhow::Context;
use serde::Deserialize;
use url::Url;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server_bind: String,
    pub geojson_url: String,
    pub map_style: String,
    pub center_lat: f64,
    pub center_lon: f64,
    pub zoom: f64,
    pub transition_ms: u64,
    pub transition_easing: String,
    pub ack_timeout_ms: u64,
    pub default_dataset: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:8080".into(),
            geojson_url: "https://raw.githubusercontent.com/python-visualization/folium/master/examples/data/us-states.json".into(),
            map_style: "carto-darkmatter-nolabels".into(),
            center_lat: 38.8283,
            center_lon: -98.5795,
            zoom: 4.5,
            transition_ms: 5700,
            transition_easing: "cubic-in-out".into(),
            ack_timeout_ms: 3000,
            default_dataset: "unemployment".into(),
        }
    }
}

/// Partial file form; anything absent keeps its default.
#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    server_bind: Option<String>,
    geojson_url: Option<String>,
    map_style: Option<String>,
    center_lat: Option<f64>,
    center_lon: Option<f64>,
    zoom: Option<f64>,
    transition_ms: Option<u64>,
    transition_easing: Option<String>,
    ack_timeout_ms: Option<u64>,
    default_dataset: Option<String>,
}

pub fn load_settings(path: &Path) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        let file_cfg: FileSettings = toml::from_str(&raw)
            .with_context(|| format!("malformed config file '{}'", path.display()))?;
        apply_file(&mut settings, file_cfg);
    }

    apply_env(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

fn apply_file(settings: &mut Settings, file_cfg: FileSettings) {
    if let Some(v) = file_cfg.server_bind {
        settings.server_bind = v;
    }
    if let Some(v) = file_cfg.geojson_url {
        settings.geojson_url = v;
    }
    if let Some(v) = file_cfg.map_style {
        settings.map_style = v;
    }
    if let Some(v) = file_cfg.center_lat {
        settings.center_lat = v;
    }
    if let Some(v) = file_cfg.center_lon {
        settings.center_lon = v;
    }
    if let Some(v) = file_cfg.zoom {
        settings.zoom = v;
    }
    if let Some(v) = file_cfg.transition_ms {
        settings.transition_ms = v;
    }
    if let Some(v) = file_cfg.transition_easing {
        settings.transition_easing = v;
    }
    if let Some(v) = file_cfg.ack_timeout_ms {
        settings.ack_timeout_ms = v;
    }
    if let Some(v) = file_cfg.default_dataset {
        settings.default_dataset = v;
    }
}

fn apply_env(settings: &mut Settings) {
    if let Ok(v) = env::var("SERVER_BIND") {
        settings.server_bind = v;
    }
    if let Ok(v) = env::var("APP__SERVER_BIND") {
        settings.server_bind = v;
    }

    if let Ok(v) = env::var("APP__GEOJSON_URL") {
        settings.geojson_url = v;
    }
    if let Ok(v) = env::var("APP__MAP_STYLE") {
        settings.map_style = v;
    }
    if let Ok(v) = env::var("APP__DEFAULT_DATASET") {
        settings.default_dataset = v;
    }
    if let Ok(v) = env::var("APP__TRANSITION_EASING") {
        settings.transition_easing = v;
    }

    if let Ok(v) = env::var("APP__TRANSITION_MS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.transition_ms = parsed;
        }
    }
    if let Ok(v) = env::var("APP__ACK_TIMEOUT_MS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.ack_timeout_ms = parsed;
        }
    }
    if let Ok(v) = env::var("APP__ZOOM") {
        if let Ok(parsed) = v.parse::<f64>() {
            settings.zoom = parsed;
        }
    }
}

fn validate(settings: &Settings) -> anyhow::Result<()> {
    Url::parse(&settings.geojson_url)
        .with_context(|| format!("invalid geojson url '{}'", settings.geojson_url))?;
    anyhow::ensure!(
        settings.ack_timeout_ms > 0,
        "ack_timeout_ms must be positive"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{
        io::Write,
        time::{SystemTime, UNIX_EPOCH},
    };

    use super::*;

    fn temp_config(contents: &str) -> std::path::PathBuf {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        let path = env::temp_dir().join(format!("statemap_config_test_{suffix}.toml"));
        let mut file = fs::File::create(&path).expect("temp config");
        file.write_all(contents.as_bytes()).expect("write config");
        path
    }

    #[test]
    fn missing_file_yields_defaults() {
        let settings = load_settings(Path::new("/nonexistent/statemap.toml")).expect("settings");
        assert_eq!(settings.server_bind, "127.0.0.1:8080");
        assert_eq!(settings.transition_ms, 5700);
        assert_eq!(settings.transition_easing, "cubic-in-out");
        assert_eq!(settings.default_dataset, "unemployment");
    }

    #[test]
    fn file_overrides_selected_keys_only() {
        let path = temp_config("transition_ms = 1200\nzoom = 3.0\n");
        let settings = load_settings(&path).expect("settings");
        fs::remove_file(&path).expect("cleanup");

        assert_eq!(settings.transition_ms, 1200);
        assert_eq!(settings.zoom, 3.0);
        assert_eq!(settings.map_style, "carto-darkmatter-nolabels");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let path = temp_config("transition_ms = \"soon\"\n");
        let result = load_settings(&path);
        fs::remove_file(&path).expect("cleanup");
        assert!(result.is_err());
    }

    #[test]
    fn rejects_invalid_geojson_url() {
        let path = temp_config("geojson_url = \"not a url\"\n");
        let result = load_settings(&path);
        fs::remove_file(&path).expect("cleanup");
        assert!(result.is_err());
    }
}
