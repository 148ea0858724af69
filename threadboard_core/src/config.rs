use std::path::{Path, PathBuf};

use iroh::SecretKey;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::thread::OrphanPolicy;

static DATA_DIR_NAME: &str = "threadboard";
static BOARD_DB_NAME: &str = "threadboard.sqlite";
static CONFIG_FILE_NAME: &str = "config.json";

// For now this directory structure should be like
// data_dir_path
// |- threadboard
//    |- threadboard.sqlite
//    |- config.json

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to find a data directory on this platform")]
    NoDataDir,
    #[error("config io failed")]
    Io(#[from] std::io::Error),
    #[error("config file is not valid json")]
    Json(#[from] serde_json::Error),
}

fn default_secret_key() -> SecretKey {
    SecretKey::generate(&mut rand::rng())
}

/// Upper bounds on user supplied text, counted in characters.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct Limits {
    pub title_max: usize,
    pub post_body_max: usize,
    pub reply_body_max: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            title_max: 40,
            post_body_max: 1000,
            reply_body_max: 500,
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct BoardConfig {
    /// Secret key for the local node/instance.
    #[serde(default = "default_secret_key")]
    pub(crate) secret_key: SecretKey,

    /// Secret key used by the local client endpoint. Its public half is the
    /// identity the local user is registered under.
    #[serde(default = "default_secret_key")]
    pub(crate) client_secret_key: SecretKey,

    pub(crate) database_path: PathBuf,

    /// What the reply tree does with replies whose parent is missing.
    #[serde(default)]
    pub orphan_policy: OrphanPolicy,

    #[serde(default)]
    pub limits: Limits,
}

impl BoardConfig {
    /// Creates a new BoardConfig with generated secret keys and the specified data directory
    fn new(data_dir: PathBuf) -> Self {
        BoardConfig {
            secret_key: default_secret_key(),
            client_secret_key: default_secret_key(),
            database_path: data_dir.join(BOARD_DB_NAME),
            orphan_policy: OrphanPolicy::default(),
            limits: Limits::default(),
        }
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }
}

/// Gets the existing config or initializes a new one if it doesn't exist
pub async fn get_or_init() -> Result<BoardConfig, ConfigError> {
    let data_dir = dirs::data_dir().ok_or(ConfigError::NoDataDir)?;
    load_or_create(data_dir.join(DATA_DIR_NAME)).await
}

async fn load_or_create(board_dir: PathBuf) -> Result<BoardConfig, ConfigError> {
    let config_path = board_dir.join(CONFIG_FILE_NAME);

    fs::create_dir_all(&board_dir).await?;

    if fs::try_exists(&config_path).await? {
        let mut file = fs::File::open(&config_path).await?;
        let mut contents = String::new();
        file.read_to_string(&mut contents).await?;

        let config: BoardConfig = serde_json::from_str(&contents)?;
        tracing::debug!(path = %config_path.display(), "loaded config");
        Ok(config)
    } else {
        let config = BoardConfig::new(board_dir.clone());

        let json = serde_json::to_string_pretty(&config)?;
        let mut file = fs::File::create(&config_path).await?;
        file.write_all(json.as_bytes()).await?;

        tracing::info!(path = %config_path.display(), "wrote new config");
        Ok(config)
    }
}
