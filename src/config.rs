use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{cmp, fs, path::PathBuf, sync::RwLock};

/// Which heuristic turns a screenshot into a tag. `Border` inspects the
/// pixels along the image edges; `Proximity` infers pop/stop purely from
/// screenshot arrival times. Border is authoritative; proximity is an
/// explicit opt-in, never a silent fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionStrategy {
    Border,
    Proximity,
}

impl Default for DetectionStrategy {
    fn default() -> Self {
        DetectionStrategy::Border
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct AppConfig {
    /// Game install folder; the screenshots directory is resolved beneath it.
    pub game_folder: String,
    /// Base countdown shown on the paired device, in seconds.
    pub countdown_time: u32,
    /// Estimated screenshot-to-detection delay, in seconds.
    pub delay_offset: u32,
    pub pairing_id: String,
    pub detection: DetectionStrategy,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            game_folder: String::new(),
            countdown_time: 40,
            delay_offset: 2,
            pairing_id: String::new(),
            detection: DetectionStrategy::default(),
        }
    }
}

impl AppConfig {
    /// Countdown actually sent on a pop: the configured base minus the
    /// detection delay (plus one second of slack), floored at 1.
    pub fn adjusted_duration(&self) -> u32 {
        cmp::max(self.countdown_time.saturating_sub(self.delay_offset + 1), 1)
    }
}

/// JSON-file-backed config store. Loads once, hands out clones, persists on
/// update.
pub struct ConfigStore {
    path: PathBuf,
    data: RwLock<AppConfig>,
}

impl ConfigStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            AppConfig::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn get(&self) -> AppConfig {
        self.data.read().unwrap().clone()
    }

    pub fn update(&self, config: AppConfig) -> Result<()> {
        {
            let mut guard = self.data.write().unwrap();
            *guard = config;
            self.persist(&guard)?;
        }
        Ok(())
    }

    fn persist(&self, data: &AppConfig) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write config to {}", self.path.display()))
    }
}
