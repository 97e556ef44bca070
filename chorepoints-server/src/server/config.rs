use chorepoints_shared::api::{ChildDraft, RewardDraft};
use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use std::{env, fs, path::Path};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub listen_port: Option<u16>,
    pub dev_cors_origin: Option<String>,
    /// IANA zone that decides where one household day ends. Defaults to UTC.
    pub timezone: Option<String>,
    /// Parent PIN stored on first start when none is set yet.
    pub pin: Option<String>,
    pub children: Vec<ChildDraft>,
    pub rewards: Vec<RewardDraft>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("unknown timezone: {0}")]
    Timezone(String),
}

impl AppConfig {
    /// Read `CONFIG_PATH` (default `config.yaml`). A missing file yields the
    /// defaults so a bare `serve` works out of the box.
    pub fn load() -> Result<Self, ConfigError> {
        let path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());
        Self::load_or_default(path)
    }

    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        match fs::read_to_string(&path) {
            Ok(text) => Self::from_yaml(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.as_ref().display(), "config file not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let cfg: AppConfig = serde_yaml::from_str(text)?;
        cfg.tz()?;
        Ok(cfg)
    }

    pub fn tz(&self) -> Result<Tz, ConfigError> {
        match self.timezone.as_deref().map(str::trim) {
            None | Some("") => Ok(Tz::UTC),
            Some(name) => name
                .parse::<Tz>()
                .map_err(|_| ConfigError::Timezone(name.to_string())),
        }
    }

    /// The household's current calendar date.
    pub fn today(&self) -> NaiveDate {
        let tz = self.tz().unwrap_or(Tz::UTC);
        Utc::now().with_timezone(&tz).date_naive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_seed_and_timezone() {
        let cfg = AppConfig::from_yaml(
            r#"
listen_port: 6000
timezone: Europe/Warsaw
pin: "1234"
children:
  - name: Alice
    avatar: "🧒"
rewards:
  - title: Movie night
    cost: 10
    icon: "🎬"
"#,
        )
        .unwrap();
        assert_eq!(cfg.listen_port, Some(6000));
        assert_eq!(cfg.tz().unwrap(), chrono_tz::Europe::Warsaw);
        assert_eq!(cfg.children.len(), 1);
        assert_eq!(cfg.rewards[0].available, None);
    }

    #[test]
    fn bad_timezone_is_rejected() {
        let err = AppConfig::from_yaml("timezone: Mars/Olympus").unwrap_err();
        assert!(matches!(err, ConfigError::Timezone(_)));
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = AppConfig::load_or_default(dir.path().join("nope.yaml")).unwrap();
        assert!(cfg.children.is_empty());
        assert_eq!(cfg.tz().unwrap(), Tz::UTC);
    }
}
