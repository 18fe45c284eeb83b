use std::path::{Path, PathBuf};
use crate::common::config::Config;
use crate::common::error::Result;

const CONFIG_FILE_NAME: &str = "multiservice.toml";

pub enum RunMode {
    Development(PathBuf), // Base directory for dev mode
    System,
    User,
}

pub struct Paths {
    mode: RunMode,
}

impl Paths {
    pub fn new(dev: bool) -> Self {
        if dev {
            Self { mode: RunMode::Development(PathBuf::from(".")) }
        } else if dirs::home_dir().is_some() {
            Self { mode: RunMode::User }
        } else {
            Self { mode: RunMode::System }
        }
    }

    pub fn with_mode(mode: RunMode) -> Self {
        Self { mode }
    }

    pub fn config_file(&self) -> PathBuf {
        match &self.mode {
            RunMode::Development(base) => base.join("configs").join(CONFIG_FILE_NAME),
            RunMode::System => system_config_file(),
            RunMode::User => {
                // Try user config first, then system config
                if let Some(config_dir) = dirs::config_dir() {
                    let user_config = config_dir.join("multiservice").join(CONFIG_FILE_NAME);
                    if user_config.exists() {
                        return user_config;
                    }
                }
                system_config_file()
            }
        }
    }

    pub fn is_development(&self) -> bool {
        matches!(self.mode, RunMode::Development(_))
    }

    /// Load the configuration: an explicit path must exist, a resolved one
    /// falls back to the built-in defaults when absent.
    pub fn load_config(&self, explicit: Option<&Path>) -> Result<Config> {
        if let Some(path) = explicit {
            return Config::load_from_path(path);
        }

        let path = self.config_file();
        if path.exists() {
            Config::load_from_path(&path)
        } else {
            tracing::warn!("No config file at {}, using built-in defaults", path.display());
            Ok(Config::default())
        }
    }
}

pub fn system_config_file() -> PathBuf {
    PathBuf::from("/etc/multiservice").join(CONFIG_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_development_config_path() {
        let paths = Paths::with_mode(RunMode::Development(PathBuf::from("/tmp/base")));
        assert!(paths.is_development());
        assert_eq!(paths.config_file(), PathBuf::from("/tmp/base/configs/multiservice.toml"));
    }

    #[test]
    fn test_missing_resolved_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::with_mode(RunMode::Development(dir.path().to_path_buf()));
        assert_eq!(paths.load_config(None).unwrap(), Config::default());
    }

    #[test]
    fn test_resolved_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("configs")).unwrap();
        std::fs::write(
            dir.path().join("configs").join(CONFIG_FILE_NAME),
            "[credential]\nusername = \"carol\"\npassword = \"pw\"\n",
        ).unwrap();

        let paths = Paths::with_mode(RunMode::Development(dir.path().to_path_buf()));
        assert_eq!(paths.load_config(None).unwrap().credential.username, "carol");
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::with_mode(RunMode::System);
        assert!(paths.load_config(Some(&dir.path().join("missing.toml"))).is_err());
    }
}
