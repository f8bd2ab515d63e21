//! CLI configuration file
//!
//! ```yaml
//! database_url: ${STATEGRAPH_DATABASE_URL:sqlite:stategraph.db}
//! engine:
//!   max_steps: 25
//!   node_timeout_ms: 30000
//!   message_window: 50
//! ```
//!
//! Every key is optional. Without a database URL, checkpoints live in memory
//! and vanish when the process exits.

use serde::{Deserialize, Serialize};
use stategraph_checkpoint::{CheckpointSaver, InMemoryCheckpointSaver, SqliteCheckpointSaver};
use stategraph_core::config::load_yaml;
use stategraph_core::EngineConfig;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub engine: EngineConfig,

    /// SQLite URL of the checkpoint database
    pub database_url: Option<String>,
}

impl CliConfig {
    /// Load from `path`, or defaults when no file is given; env overrides apply either way
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config: Self = match path {
            Some(path) => load_yaml(path)?,
            None => Self::default(),
        };
        config.engine = config.engine.with_env_overrides()?;
        config.engine.validate()?;
        Ok(config)
    }

    /// A `--db` flag wins over the file
    pub fn database_url<'a>(&'a self, flag: Option<&'a str>) -> Option<&'a str> {
        flag.or(self.database_url.as_deref())
    }
}

/// SQLite saver for `database_url`, or a fresh in-memory saver
pub async fn open_checkpointer(database_url: Option<&str>) -> anyhow::Result<Arc<dyn CheckpointSaver>> {
    match database_url {
        Some(url) => {
            tracing::debug!(url, "Opening checkpoint database");
            Ok(Arc::new(SqliteCheckpointSaver::connect(url).await?))
        }
        None => Ok(Arc::new(InMemoryCheckpointSaver::new())),
    }
}
