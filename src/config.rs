use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

pub const DEFAULT_API_URL: &str = "https://api.todoist.com/sync/v9/";
pub const TOKEN_ENV: &str = "TODOIST_API_TOKEN";

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
  /// API token; `TODOIST_API_TOKEN` takes precedence
  pub token: Option<String>,
  /// Sync API base URL
  pub api_url: String,
  /// Bound on every HTTP request
  pub timeout_secs: u64,
  /// Colorize output without passing `--color`
  pub color: bool,
  /// Cache file (defaults to `<data dir>/todoist/cache.json`)
  pub cache_path: Option<PathBuf>,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      token: None,
      api_url: DEFAULT_API_URL.to_string(),
      timeout_secs: 30,
      color: false,
      cache_path: None,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./todoist.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/todoist/config.yaml
  ///
  /// No file at all means defaults; the token can still come from the environment.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("todoist.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("todoist").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    if contents.trim().is_empty() {
      return Ok(Self::default());
    }

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    if config.token.is_some() {
      check_private(path)?;
    }

    Ok(config)
  }

  /// Resolve the API token: environment first, then the config file.
  pub fn api_token(&self) -> Result<String> {
    resolve_token(std::env::var(TOKEN_ENV).ok(), self.token.as_deref()).ok_or_else(|| {
      eyre!(
        "Todoist API token not found. Set {} or add `token` to the config file.",
        TOKEN_ENV
      )
    })
  }

  /// Base URL with a trailing slash, so endpoint paths join under it.
  pub fn api_url(&self) -> Result<Url> {
    let mut raw = self.api_url.trim().to_string();
    if !raw.ends_with('/') {
      raw.push('/');
    }
    Url::parse(&raw).map_err(|e| eyre!("Invalid api_url {}: {}", self.api_url, e))
  }

  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs.max(1))
  }

  pub fn cache_path(&self) -> Result<PathBuf> {
    match &self.cache_path {
      Some(path) => Ok(path.clone()),
      None => Ok(data_dir()?.join("cache.json")),
    }
  }
}

/// Per-user directory for the cache and the log file.
pub fn data_dir() -> Result<PathBuf> {
  dirs::data_dir()
    .map(|dir| dir.join("todoist"))
    .ok_or_else(|| eyre!("Could not determine the user data directory"))
}

fn resolve_token(env: Option<String>, file: Option<&str>) -> Option<String> {
  [env.as_deref(), file]
    .into_iter()
    .flatten()
    .map(str::trim)
    .find(|token| !token.is_empty())
    .map(str::to_string)
}

/// A file holding a credential must not be readable by others.
#[cfg(unix)]
fn check_private(path: &Path) -> Result<()> {
  use std::os::unix::fs::PermissionsExt;

  let mode = std::fs::metadata(path)
    .map_err(|e| eyre!("Failed to stat config file {}: {}", path.display(), e))?
    .permissions()
    .mode();
  if mode & 0o077 != 0 {
    return Err(eyre!(
      "Config file {} contains a token and must have mode 0600 (found {:o})",
      path.display(),
      mode & 0o777
    ));
  }
  Ok(())
}

#[cfg(not(unix))]
fn check_private(_path: &Path) -> Result<()> {
  Ok(())
}
