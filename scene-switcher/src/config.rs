use crate::fetcher::FetchConfig;
use crate::types::{Result, SwitcherConfig, SwitcherError};
use interfaces::defs::SourceSpec;
use obs_control::ObsConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObsSettings {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub request_timeout_ms: u64,
}

impl Default for ObsSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 4455,
            password: None,
            request_timeout_ms: 5_000,
        }
    }
}

impl std::fmt::Debug for ObsSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObsSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("request_timeout_ms", &self.request_timeout_ms)
            .finish()
    }
}

impl ObsSettings {
    pub fn to_obs_config(&self) -> ObsConfig {
        ObsConfig::new(self.host.clone(), self.port)
            .with_password(self.password.clone())
            .with_request_timeout(Duration::from_millis(self.request_timeout_ms))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DetectorSettings {
    /// Remote inference service that takes a JPEG body.
    Http { endpoint: String },
    /// Local YOLOv3 model in Darknet format.
    Darknet {
        #[serde(default = "default_darknet_config")]
        config: PathBuf,
        #[serde(default = "default_darknet_weights")]
        weights: PathBuf,
        #[serde(default = "default_darknet_names")]
        names: PathBuf,
        #[serde(default = "default_input_size")]
        input_size: i32,
    },
}

fn default_darknet_config() -> PathBuf {
    PathBuf::from("yolov3.cfg")
}

fn default_darknet_weights() -> PathBuf {
    PathBuf::from("yolov3.weights")
}

fn default_darknet_names() -> PathBuf {
    PathBuf::from("coco.names")
}

fn default_input_size() -> i32 {
    416
}

impl Default for DetectorSettings {
    fn default() -> Self {
        DetectorSettings::Darknet {
            config: default_darknet_config(),
            weights: default_darknet_weights(),
            names: default_darknet_names(),
            input_size: default_input_size(),
        }
    }
}

/// Everything the binary reads from its JSON config file.
///
/// ```json
/// {
///   "sources": [
///     {"label": "USB Cam", "address": 0},
///     {"label": "IP Cam 1", "address": "http://10.0.0.7/snapshot.jpg"}
///   ],
///   "obs": {"host": "localhost", "port": 4455},
///   "detector": {"kind": "http", "endpoint": "http://127.0.0.1:8000/detect"},
///   "switcher": {"cadence": 20, "cooldown_ms": 2000}
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub sources: Vec<SourceSpec>,
    #[serde(default)]
    pub obs: ObsSettings,
    #[serde(default)]
    pub detector: DetectorSettings,
    #[serde(default)]
    pub switcher: SwitcherConfig,
    #[serde(default)]
    pub http: FetchConfig,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            SwitcherError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let config: AppConfig = serde_json::from_str(raw)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            return Err(SwitcherError::Config("at least one source is required".to_string()));
        }

        let mut seen = HashSet::new();
        for source in &self.sources {
            if source.label.trim().is_empty() {
                return Err(SwitcherError::Config(format!(
                    "source {} has an empty label",
                    source.address
                )));
            }
            if !seen.insert(source.label.as_str()) {
                return Err(SwitcherError::Config(format!(
                    "duplicate source label: {}",
                    source.label
                )));
            }
        }

        let threshold = self.switcher.confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(SwitcherError::Config(format!(
                "confidence_threshold must be within [0, 1], got {}",
                threshold
            )));
        }

        if self.switcher.target_class.is_empty() {
            return Err(SwitcherError::Config("target_class must not be empty".to_string()));
        }

        if let DetectorSettings::Http { endpoint } = &self.detector {
            url::Url::parse(endpoint)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use interfaces::defs::SourceAddress;

    const SAMPLE: &str = r#"{
        "sources": [
            {"label": "USB Cam", "address": 0},
            {"label": "IP Cam 1", "address": "rtsp://admin:pw@10.0.0.5:554/live"},
            {"label": "IP Cam 2", "address": "http://10.0.0.7/snapshot.jpg"}
        ],
        "obs": {"port": 4460, "password": "secret"},
        "detector": {"kind": "http", "endpoint": "http://127.0.0.1:8000/detect"},
        "switcher": {"cadence": 5}
    }"#;

    #[test]
    fn test_parse_keeps_order_and_fills_defaults() {
        let config = AppConfig::from_json(SAMPLE).unwrap();

        let labels: Vec<&str> = config.sources.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec!["USB Cam", "IP Cam 1", "IP Cam 2"]);
        assert_eq!(config.sources[0].address, SourceAddress::Device(0));
        assert_eq!(config.obs.host, "localhost");
        assert_eq!(config.obs.port, 4460);
        assert_eq!(config.switcher.cadence, 5);
        assert_eq!(config.switcher.cooldown_ms, 2_000);
        assert_eq!(config.switcher.target_class, "cat");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_detector_defaults_to_darknet_files() {
        let config = AppConfig::from_json(r#"{"sources": [{"label": "A", "address": 0}]}"#).unwrap();

        match config.detector {
            DetectorSettings::Darknet { weights, input_size, .. } => {
                assert_eq!(weights, PathBuf::from("yolov3.weights"));
                assert_eq!(input_size, 416);
            }
            other => panic!("unexpected detector {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_labels_rejected() {
        let config = AppConfig::from_json(
            r#"{"sources": [{"label": "A", "address": 0}, {"label": "A", "address": 1}]}"#,
        )
        .unwrap();

        assert!(matches!(config.validate(), Err(SwitcherError::Config(_))));
    }

    #[test]
    fn test_empty_source_list_rejected() {
        let config = AppConfig::from_json(r#"{"sources": []}"#).unwrap();
        assert!(matches!(config.validate(), Err(SwitcherError::Config(_))));
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        let config = AppConfig::from_json(
            r#"{"sources": [{"label": "A", "address": 0}], "switcher": {"confidence_threshold": 1.5}}"#,
        )
        .unwrap();

        assert!(matches!(config.validate(), Err(SwitcherError::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.sources.len(), 3);
        assert_eq!(
            config.detector,
            DetectorSettings::Http {
                endpoint: "http://127.0.0.1:8000/detect".to_string()
            }
        );
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let result = AppConfig::load(Path::new("/nonexistent/scene-switcher.json"));
        assert!(matches!(result, Err(SwitcherError::Config(_))));
    }

    #[test]
    fn test_obs_settings_debug_hides_password() {
        let config = AppConfig::from_json(SAMPLE).unwrap();
        let rendered = format!("{:?}", config.obs);
        assert!(!rendered.contains("secret"));
    }
}
