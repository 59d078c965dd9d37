//! Where tasktrack keeps its files.
//!
//! Everything lives under one home directory: `TASKTRACK_HOME` (or `--home`),
//! falling back to `$HOME/.tasktrack`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub const DB_FILE: &str = "tasktrack.db";
pub const PREFS_FILE: &str = "prefs.json";
pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone)]
pub struct Paths {
    home: PathBuf,
}

impl Paths {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    /// Use `home` if given, otherwise `$HOME/.tasktrack`.
    pub fn resolve(home: Option<PathBuf>) -> Result<Self> {
        match home {
            Some(h) => Ok(Self::new(h)),
            None => {
                let user_home = std::env::var("HOME").context("HOME environment variable not set")?;
                Ok(Self::new(PathBuf::from(user_home).join(".tasktrack")))
            }
        }
    }

    /// Create the home directory if it does not exist yet.
    pub fn ensure(&self) -> Result<()> {
        if !self.home.exists() {
            std::fs::create_dir_all(&self.home)
                .with_context(|| format!("failed to create directory {}", self.home.display()))?;
        }
        Ok(())
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn db(&self) -> PathBuf {
        self.home.join(DB_FILE)
    }

    pub fn prefs(&self) -> PathBuf {
        self.home.join(PREFS_FILE)
    }

    pub fn config(&self) -> PathBuf {
        self.home.join(CONFIG_FILE)
    }
}
