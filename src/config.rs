use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context};
use homedir::my_home;
use serde::{Deserialize, Serialize};

use crate::semantic::DEFAULT_MODEL;

const CONFIG_FILE: &str = "config.yaml";

/// Default number of matches returned when the caller gives no `top_k`
const DEFAULT_TOP_K: i64 = 5;
const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Model name for embeddings (e.g., "all-MiniLM-L6-v2")
    #[serde(default = "default_model")]
    pub model: String,

    /// Compute the embedding right after an item is created
    #[serde(default = "default_true")]
    pub embed_on_create: bool,

    #[serde(default = "default_top_k")]
    pub default_top_k: i64,

    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Parallelism for backfill: "auto" or a positive integer
    #[serde(default = "default_embedding_parallelism")]
    pub embedding_parallelism: String,

    #[serde(skip_serializing, skip_deserializing)]
    pub(crate) base_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: default_model(),
            embed_on_create: true,
            default_top_k: DEFAULT_TOP_K,
            listen_addr: default_listen_addr(),
            embedding_parallelism: default_embedding_parallelism(),
            base_path: PathBuf::new(),
        }
    }
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_true() -> bool {
    true
}

fn default_top_k() -> i64 {
    DEFAULT_TOP_K
}

fn default_listen_addr() -> String {
    DEFAULT_LISTEN_ADDR.to_string()
}

fn default_embedding_parallelism() -> String {
    "auto".to_string()
}

/// `LF_BASE_PATH`, or `~/.local/share/lostfound`.
pub fn default_base_path() -> anyhow::Result<PathBuf> {
    if let Ok(path) = std::env::var("LF_BASE_PATH") {
        return Ok(PathBuf::from(path));
    }

    let home = my_home()
        .map_err(|err| anyhow!("couldnt find home dir: {err:?}"))?
        .context("couldnt find home dir")?;

    Ok(home.join(".local/share/lostfound"))
}

impl Config {
    fn validate(&self) -> anyhow::Result<()> {
        if self.model.trim().is_empty() {
            bail!("model must not be empty");
        }

        if self.default_top_k < 0 {
            bail!(
                "default_top_k must not be negative, got {}",
                self.default_top_k
            );
        }

        // "auto" or positive integer
        if self.embedding_parallelism != "auto" {
            match self.embedding_parallelism.parse::<usize>() {
                Ok(0) | Err(_) => bail!(
                    "embedding_parallelism must be 'auto' or a positive integer, got '{}'",
                    self.embedding_parallelism
                ),
                Ok(_) => {}
            }
        }

        Ok(())
    }

    pub fn load() -> anyhow::Result<Self> {
        Self::load_with(&default_base_path()?)
    }

    pub fn load_with(base_path: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(base_path)
            .with_context(|| format!("couldnt create {}", base_path.display()))?;

        let config_path = base_path.join(CONFIG_FILE);

        // create new if does not exist
        if !config_path.exists() {
            log::info!("writing default config to {}", config_path.display());
            std::fs::write(&config_path, serde_yml::to_string(&Self::default())?)?;
        }

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("couldnt read {}", config_path.display()))?;
        let mut config: Self = serde_yml::from_str(&config_str).context("config is malformed")?;

        config.base_path = base_path.to_path_buf();
        config.validate()?;

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config)? {
            config.save()?;
        }

        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_str = serde_yml::to_string(&self)?;
        let config_path = self.base_path.join(CONFIG_FILE);
        let temp_path = config_path.with_extension("tmp");

        std::fs::write(&temp_path, config_str)?;
        std::fs::rename(&temp_path, &config_path)?;
        Ok(())
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn items_path(&self) -> PathBuf {
        self.base_path.join("items.csv")
    }

    /// Backfill thread count, `None` for "auto".
    pub fn parallelism(&self) -> Option<usize> {
        self.embedding_parallelism.parse::<usize>().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_creates_default_config() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::load_with(tmp.path()).unwrap();

        assert!(tmp.path().join(CONFIG_FILE).exists());
        assert_eq!(config.model, DEFAULT_MODEL);
        assert!(config.embed_on_create);
        assert_eq!(config.default_top_k, 5);
        assert_eq!(config.parallelism(), None);
        assert_eq!(config.items_path(), tmp.path().join("items.csv"));
    }

    #[test]
    fn test_missing_fields_get_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(CONFIG_FILE), "default_top_k: 3\n").unwrap();

        let config = Config::load_with(tmp.path()).unwrap();
        assert_eq!(config.default_top_k, 3);
        assert_eq!(config.listen_addr, DEFAULT_LISTEN_ADDR);

        // upgraded file now carries every field
        let saved = std::fs::read_to_string(tmp.path().join(CONFIG_FILE)).unwrap();
        assert!(saved.contains("embedding_parallelism"));
    }

    #[test]
    fn test_parallelism_integer() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(CONFIG_FILE), "embedding_parallelism: '4'\n").unwrap();

        let config = Config::load_with(tmp.path()).unwrap();
        assert_eq!(config.parallelism(), Some(4));
    }

    #[test]
    fn test_invalid_parallelism_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(CONFIG_FILE), "embedding_parallelism: '0'\n").unwrap();
        assert!(Config::load_with(tmp.path()).is_err());

        std::fs::write(tmp.path().join(CONFIG_FILE), "embedding_parallelism: lots\n").unwrap();
        assert!(Config::load_with(tmp.path()).is_err());
    }

    #[test]
    fn test_unknown_fields_are_dropped_on_upgrade() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join(CONFIG_FILE),
            "default_top_k: 4\ndownload_timeout_secs: 300\n",
        )
        .unwrap();

        let config = Config::load_with(tmp.path()).unwrap();
        assert_eq!(config.default_top_k, 4);

        let saved = std::fs::read_to_string(tmp.path().join(CONFIG_FILE)).unwrap();
        assert!(!saved.contains("download_timeout_secs"));
    }

    #[test]
    fn test_negative_top_k_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(CONFIG_FILE), "default_top_k: -1\n").unwrap();
        assert!(Config::load_with(tmp.path()).is_err());
    }
}
