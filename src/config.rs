// Configuration for wit
// Reads from environment variables with sensible defaults; CLI flags override.

use std::env;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const DEFAULT_DESCRIPTION: &str = "No description yet. Click to add one.";

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database file (WIT_DB); defaults to `<root>/.wit/wit.sqlite`
    pub db_path: Option<PathBuf>,

    /// Product name override (WIT_PRODUCT_NAME); wins over the git remote
    pub product_name: Option<String>,

    /// Placeholder shown for items without a stored description (WIT_DEFAULT_DESCRIPTION)
    pub default_description: String,

    /// Read pool size (WIT_POOL_SIZE)
    pub pool_size: u32,

    /// Read pool minimum idle connections (WIT_POOL_MIN_IDLE)
    pub pool_min_idle: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: None,
            product_name: None,
            default_description: DEFAULT_DESCRIPTION.to_string(),
            pool_size: 4,
            pool_min_idle: 1,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Config::default();

        if let Some(val) = non_empty_var("WIT_DB") {
            config.db_path = Some(PathBuf::from(val));
        }

        config.product_name = non_empty_var("WIT_PRODUCT_NAME");

        if let Some(val) = non_empty_var("WIT_DEFAULT_DESCRIPTION") {
            config.default_description = val;
        }

        if let Ok(val) = env::var("WIT_POOL_SIZE") {
            match val.parse::<u32>() {
                Ok(parsed) if parsed > 0 => config.pool_size = parsed,
                _ => warn!(
                    "invalid WIT_POOL_SIZE value: {}, using default: {}",
                    val, config.pool_size
                ),
            }
        }

        if let Ok(val) = env::var("WIT_POOL_MIN_IDLE") {
            if let Ok(parsed) = val.parse() {
                config.pool_min_idle = parsed;
            } else {
                warn!(
                    "invalid WIT_POOL_MIN_IDLE value: {}, using default: {}",
                    val, config.pool_min_idle
                );
            }
        }

        config
    }

    /// Database path, falling back to the default location under `root`.
    pub fn db_path_for(&self, root: &Path) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| default_db_path(root))
    }
}

pub fn default_db_path(root: &Path) -> PathBuf {
    root.join(".wit").join("wit.sqlite")
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|val| val.trim().to_string())
        .filter(|val| !val.is_empty())
}
