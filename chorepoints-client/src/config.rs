use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use chrono_tz::Tz;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::ClientError;

pub const ENV_CONFIG: &str = "CHOREPOINTS_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub server_url: String,
    /// IANA zone for the household calendar. Should match the server's.
    #[serde(default)]
    pub timezone: Option<String>,
    /// Where the last good snapshot is kept. Defaults to the platform cache
    /// dir; set to an empty string to disable.
    #[serde(default)]
    pub cache_path: Option<PathBuf>,
}

impl ClientConfig {
    pub fn find_and_load(cli_value: Option<PathBuf>) -> Result<(PathBuf, Self), ClientError> {
        let path = resolve_config_path(cli_value)?;
        let cfg = load_config(&path)?;
        Ok((path, cfg))
    }

    pub fn tz(&self) -> Result<Tz, ClientError> {
        match self.timezone.as_deref().map(str::trim) {
            None | Some("") => Ok(Tz::UTC),
            Some(name) => name
                .parse::<Tz>()
                .map_err(|_| ClientError::Config(format!("unknown timezone: {name}"))),
        }
    }

    /// Resolved cache location, `None` when caching is off.
    pub fn cache_file(&self) -> Option<PathBuf> {
        match &self.cache_path {
            Some(p) if p.as_os_str().is_empty() => None,
            Some(p) => Some(p.clone()),
            None => default_cache_path(),
        }
    }
}

pub fn resolve_config_path(cli_value: Option<PathBuf>) -> Result<PathBuf, ClientError> {
    if let Some(p) = cli_value {
        return Ok(p);
    }
    if let Ok(p) = std::env::var(ENV_CONFIG) {
        return Ok(PathBuf::from(p));
    }
    default_config_path().ok_or_else(|| ClientError::Config("could not determine config dir".into()))
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("dev", "chorepoints", "chorepoints")
}

pub fn default_config_path() -> Option<PathBuf> {
    Some(project_dirs()?.config_dir().join("client.yaml"))
}

pub fn default_cache_path() -> Option<PathBuf> {
    Some(project_dirs()?.cache_dir().join("snapshot.json"))
}

pub fn load_config(path: &Path) -> Result<ClientConfig, ClientError> {
    let data = std::fs::read_to_string(path)
        .map_err(|e| ClientError::Config(format!("read {} failed: {e}", path.display())))?;
    let mut cfg: ClientConfig = serde_yaml::from_str(&data)
        .map_err(|e| ClientError::Config(format!("parse {} failed: {e}", path.display())))?;
    cfg.server_url = normalize_server_url(&cfg.server_url);
    cfg.tz()?;
    Ok(cfg)
}

pub fn save_config(path: &Path, cfg: &ClientConfig) -> Result<(), ClientError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let data = serde_yaml::to_string(cfg)
        .map_err(|e| ClientError::Config(format!("serialize config failed: {e}")))?;
    std::fs::write(path, data)
        .map_err(|e| ClientError::Config(format!("write {} failed: {e}", path.display())))
}

pub fn normalize_server_url(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.trim_end_matches('/').to_string()
    } else {
        format!("http://{}", trimmed.trim_end_matches('/'))
    }
}

/// Source of "today" for the household calendar.
#[derive(Debug, Clone)]
pub enum Clock {
    Zone(Tz),
    /// Pinned date, for replays and tests.
    Fixed(NaiveDate),
}

impl Clock {
    pub fn today(&self) -> NaiveDate {
        match self {
            Clock::Zone(tz) => chrono::Utc::now().with_timezone(tz).date_naive(),
            Clock::Fixed(d) => *d,
        }
    }
}

impl Default for Clock {
    fn default() -> Self {
        Clock::Zone(Tz::UTC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_urls() {
        assert_eq!(normalize_server_url(" 10.0.0.2:5151/ "), "http://10.0.0.2:5151");
        assert_eq!(normalize_server_url("https://h/"), "https://h");
    }

    #[test]
    fn round_trips_through_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.yaml");
        let cfg = ClientConfig {
            server_url: "http://h:1".into(),
            timezone: Some("Europe/Warsaw".into()),
            cache_path: Some(PathBuf::new()),
        };
        save_config(&path, &cfg).unwrap();
        let back = load_config(&path).unwrap();
        assert_eq!(back.server_url, "http://h:1");
        assert_eq!(back.tz().unwrap(), chrono_tz::Europe::Warsaw);
        assert_eq!(back.cache_file(), None);
    }

    #[test]
    fn bad_timezone_fails_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.yaml");
        std::fs::write(&path, "server_url: h\ntimezone: Nowhere/Land\n").unwrap();
        assert!(matches!(load_config(&path), Err(ClientError::Config(_))));
    }
}
