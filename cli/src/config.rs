//! Configuration management for the voicecheck CLI.
//!
//! Configuration is stored in ~/.voicecheck/{app_name}/config.yaml as a set
//! of named contexts, kubectl style. Each context is a complete engine
//! configuration; keys left out fall back to the engine defaults.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use voicecheck_engine::EngineConfig;

/// Default base configuration directory name.
pub const DEFAULT_BASE_DIR: &str = ".voicecheck";
/// Default configuration filename.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable that overrides the access key of any context.
pub const ACCESS_KEY_ENV: &str = "VOICECHECK_ACCESS_KEY";

/// CLI configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Application name (not serialized).
    #[serde(skip)]
    pub app_name: String,

    /// Name of the currently active context.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub current_context: String,

    /// Map of context name to context configuration.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub contexts: HashMap<String, Context>,

    /// Path to the config file (not serialized).
    #[serde(skip)]
    config_path: PathBuf,
}

/// One named engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Context {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(flatten)]
    pub engine: EngineConfig,
}

impl Config {
    /// Gets the default config directory.
    pub fn default_config_dir(app_name: &str) -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(DEFAULT_BASE_DIR).join(app_name))
    }

    /// Gets the default config file path.
    pub fn default_config_path(app_name: &str) -> Option<PathBuf> {
        Self::default_config_dir(app_name).map(|dir| dir.join(DEFAULT_CONFIG_FILE))
    }

    pub fn path(&self) -> &PathBuf {
        &self.config_path
    }

    /// Saves the configuration to disk.
    pub fn save(&self) -> anyhow::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(&self.config_path, content)?;
        Ok(())
    }

    /// Adds or replaces a context.
    pub fn add_context(&mut self, name: &str, mut ctx: Context) -> anyhow::Result<()> {
        ctx.engine.validate()?;
        ctx.name = name.to_string();
        self.contexts.insert(name.to_string(), ctx);
        if self.current_context.is_empty() {
            self.current_context = name.to_string();
        }
        self.save()
    }

    pub fn delete_context(&mut self, name: &str) -> anyhow::Result<()> {
        if self.contexts.remove(name).is_none() {
            anyhow::bail!("context '{}' not found", name);
        }
        if self.current_context == name {
            self.current_context.clear();
        }
        self.save()
    }

    pub fn use_context(&mut self, name: &str) -> anyhow::Result<()> {
        if !self.contexts.contains_key(name) {
            anyhow::bail!("context '{}' not found", name);
        }
        self.current_context = name.to_string();
        self.save()
    }

    pub fn get_context(&self, name: &str) -> Option<&Context> {
        self.contexts.get(name)
    }

    pub fn get_current_context(&self) -> Option<&Context> {
        if self.current_context.is_empty() {
            return None;
        }
        self.contexts.get(&self.current_context)
    }

    /// Resolves the context by name, or the current context if no name is
    /// given.
    pub fn resolve_context(&self, name: Option<&str>) -> Option<&Context> {
        match name {
            Some(n) if !n.is_empty() => self.get_context(n),
            _ => self.get_current_context(),
        }
    }

    /// Sorted context names.
    pub fn list_contexts(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.contexts.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// The engine configuration to run with.
    ///
    /// A named context must exist; without a name the current context is
    /// used, or the engine defaults if there is none. `env_key` (normally
    /// [`ACCESS_KEY_ENV`]) wins over the stored access key.
    pub fn engine_config(
        &self,
        name: Option<&str>,
        env_key: Option<String>,
    ) -> anyhow::Result<EngineConfig> {
        let mut engine = match (name, self.resolve_context(name)) {
            (_, Some(ctx)) => ctx.engine.clone(),
            (Some(n), None) if !n.is_empty() => anyhow::bail!("context '{}' not found", n),
            _ => EngineConfig::default(),
        };
        if let Some(key) = env_key.filter(|k| !k.trim().is_empty()) {
            engine.access_key = Some(key);
        }
        engine.validate()?;
        Ok(engine)
    }

    /// A copy safe to print: every access key is masked.
    pub fn masked(&self) -> Config {
        let mut cfg = self.clone();
        for ctx in cfg.contexts.values_mut() {
            if let Some(key) = ctx.engine.access_key.as_mut() {
                *key = mask_api_key(key);
            }
        }
        cfg
    }
}

/// Loads configuration for the specified app, creating an empty file on
/// first use.
pub fn load_config(app_name: &str, custom_path: Option<&str>) -> anyhow::Result<Config> {
    let config_path = match custom_path {
        Some(p) => PathBuf::from(p),
        None => Config::default_config_path(app_name)
            .ok_or_else(|| anyhow::anyhow!("cannot determine config path"))?,
    };

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut cfg: Config = if config_path.exists() {
        let content = std::fs::read_to_string(&config_path)?;
        if content.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(&content)?
        }
    } else {
        let cfg = Config::default();
        std::fs::write(&config_path, serde_yaml::to_string(&cfg)?)?;
        cfg
    };

    cfg.app_name = app_name.to_string();
    cfg.config_path = config_path;
    Ok(cfg)
}

/// Masks an access key for display, keeping four characters at each end.
pub fn mask_api_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}{}", head, "*".repeat(chars.len() - 8), tail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_config() -> (TempDir, Config) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.yaml");
        let cfg = load_config("voicecheck", path.to_str()).unwrap();
        (dir, cfg)
    }

    #[test]
    fn first_load_creates_file() {
        let (_dir, cfg) = temp_config();
        assert!(cfg.path().exists());
        assert!(cfg.contexts.is_empty());
        assert_eq!(cfg.app_name, "voicecheck");
    }

    #[test]
    fn contexts_roundtrip_through_disk() {
        let (_dir, mut cfg) = temp_config();
        let ctx = Context {
            engine: EngineConfig {
                match_threshold: 0.8,
                ..EngineConfig::default()
            }
            .with_access_key("pv-1234567890"),
            ..Context::default()
        };
        cfg.add_context("prod", ctx).unwrap();
        assert_eq!(cfg.current_context, "prod");

        let path = cfg.path().to_str().unwrap().to_string();
        let reloaded = load_config("voicecheck", Some(&path)).unwrap();
        let prod = reloaded.get_context("prod").unwrap();
        assert_eq!(prod.name, "prod");
        assert_eq!(prod.engine.match_threshold, 0.8);
        assert_eq!(prod.engine.access_key(), Some("pv-1234567890"));
        assert_eq!(prod.engine.panel_size, 3);
    }

    #[test]
    fn hand_written_yaml_uses_engine_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "current_context: dev\ncontexts:\n  dev:\n    access_key: abc\n    enrollment_ms: 10000\n",
        )
        .unwrap();
        let cfg = load_config("voicecheck", path.to_str()).unwrap();
        let engine = cfg.engine_config(None, None).unwrap();
        assert_eq!(engine.enrollment_ms, 10_000);
        assert_eq!(engine.verification_period_ms, 5_000);
        assert_eq!(engine.access_key(), Some("abc"));
    }

    #[test]
    fn env_key_overrides_context() {
        let (_dir, mut cfg) = temp_config();
        cfg.add_context(
            "dev",
            Context {
                engine: EngineConfig::default().with_access_key("stored"),
                ..Context::default()
            },
        )
        .unwrap();
        let engine = cfg.engine_config(None, Some("from-env".into())).unwrap();
        assert_eq!(engine.access_key(), Some("from-env"));
        let engine = cfg.engine_config(None, Some("  ".into())).unwrap();
        assert_eq!(engine.access_key(), Some("stored"));
    }

    #[test]
    fn unknown_context_is_an_error() {
        let (_dir, cfg) = temp_config();
        assert!(cfg.engine_config(Some("missing"), None).is_err());
        let engine = cfg.engine_config(None, None).unwrap();
        assert!(engine.access_key().is_none());
    }

    #[test]
    fn invalid_context_is_rejected() {
        let (_dir, mut cfg) = temp_config();
        let ctx = Context {
            engine: EngineConfig {
                frames_per_sample: 0,
                ..EngineConfig::default()
            },
            ..Context::default()
        };
        assert!(cfg.add_context("bad", ctx).is_err());
        assert!(cfg.contexts.is_empty());
    }

    #[test]
    fn delete_and_use_context() {
        let (_dir, mut cfg) = temp_config();
        cfg.add_context("a", Context::default()).unwrap();
        cfg.add_context("b", Context::default()).unwrap();
        assert_eq!(cfg.list_contexts(), vec!["a", "b"]);
        cfg.use_context("b").unwrap();
        cfg.delete_context("b").unwrap();
        assert!(cfg.current_context.is_empty());
        assert!(cfg.use_context("b").is_err());
        assert!(cfg.delete_context("b").is_err());
    }

    #[test]
    fn masked_hides_keys() {
        let (_dir, mut cfg) = temp_config();
        cfg.add_context(
            "dev",
            Context {
                engine: EngineConfig::default().with_access_key("abcd12345678wxyz"),
                ..Context::default()
            },
        )
        .unwrap();
        let masked = cfg.masked();
        assert_eq!(
            masked.get_context("dev").unwrap().engine.access_key(),
            Some("abcd********wxyz")
        );
        assert_eq!(
            cfg.get_context("dev").unwrap().engine.access_key(),
            Some("abcd12345678wxyz")
        );
    }

    #[test]
    fn mask_short_keys() {
        assert_eq!(mask_api_key("short"), "*****");
        assert_eq!(mask_api_key(""), "");
        assert_eq!(mask_api_key("123456789"), "1234*6789");
    }
}
