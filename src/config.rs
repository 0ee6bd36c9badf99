use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{IoContext, Result};

/// repository configuration stored in .DFM/metadata.json
///
/// every operation reads this value explicitly; there is no global state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RepoConfig {
    /// author used when a commit does not name one
    pub default_author: String,
    /// how many recent mesh-only commits to keep per branch; None disables
    /// the auto-compress pass entirely
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_compress_keep: Option<u32>,
    /// hook execution timeout in seconds
    #[serde(default = "default_hook_timeout")]
    pub hook_timeout_secs: u64,
}

fn default_hook_timeout() -> u64 {
    30
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            default_author: "forester".to_string(),
            auto_compress_keep: None,
            hook_timeout_secs: default_hook_timeout(),
        }
    }
}

impl RepoConfig {
    /// load config from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_path(path)?;
        let config: RepoConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content).with_path(path)?;
        Ok(())
    }
}
