use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Bundler configuration, usually loaded from a `magpie.toml` at the project
/// root. Every field has a default so a minimal file only needs to list its
/// entry points.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// Absolute (or invocation-relative) base for every relative path below.
    pub project_root: PathBuf,

    /// Directory the output folder lives under.
    pub web_root: String,

    /// Subpath inside `web-root` for emitted artifacts.
    pub output_folder: String,

    /// Prefix stripped from module names and asset paths.
    pub source_root: String,

    /// Entry point source files, each producing a bundle and a vendor output.
    pub entry_points: Vec<String>,

    /// Standalone asset files emitted independently of any entry.
    pub asset_files: Vec<String>,

    /// Additional roots consulted for bare-specifier resolution.
    pub include_paths: Vec<String>,

    /// Directory for sources sidecars and per-item caches.
    pub cache_dir: String,

    /// Dev mode: enables caches, freshness checks, and the readable runtime
    /// shim. Off means every output is rewritten on every run.
    pub dev: bool,

    /// Ordered extension probe list for the resolver.
    pub resolve_extensions: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            web_root: "web".to_string(),
            output_folder: "bundles".to_string(),
            source_root: "src".to_string(),
            entry_points: Vec::new(),
            asset_files: Vec::new(),
            include_paths: Vec::new(),
            cache_dir: ".magpie-cache".to_string(),
            dev: false,
            resolve_extensions: vec![
                ".ts".to_string(),
                ".js".to_string(),
                ".json".to_string(),
                ".node".to_string(),
            ],
        }
    }
}

impl Config {
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let config_file = config_path.map(|p| p.to_path_buf()).or_else(|| {
            let path = PathBuf::from("magpie.toml");
            if path.exists() { Some(path) } else { None }
        });

        if let Some(config_file) = config_file {
            let content = std::fs::read_to_string(&config_file)
                .with_context(|| format!("Failed to read config file: {:?}", config_file))?;

            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", config_file))?;

            config
                .validate()
                .with_context(|| format!("Invalid config file: {:?}", config_file))?;

            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    fn validate(&self) -> Result<()> {
        for ext in &self.resolve_extensions {
            anyhow::ensure!(
                ext.starts_with('.') && ext.len() > 1,
                "resolve-extensions entries must start with a dot, got \"{}\"",
                ext
            );
        }
        Ok(())
    }

    /// `<web-root>/<output-folder>`, relative to the project root.
    pub fn output_dir(&self) -> String {
        crate::file::join(&self.web_root, &self.output_folder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let config = Config::default();
        assert_eq!(config.source_root, "src");
        assert_eq!(config.output_dir(), "web/bundles");
        assert!(!config.dev);
        assert_eq!(config.resolve_extensions[0], ".ts");
    }

    #[test]
    fn parses_kebab_case_toml() {
        let config: Config = toml::from_str(
            r#"
            source-root = "app"
            entry-points = ["app/main.ts"]
            include-paths = ["shared"]
            dev = true
            "#,
        )
        .unwrap();
        assert_eq!(config.source_root, "app");
        assert_eq!(config.entry_points, vec!["app/main.ts".to_string()]);
        assert_eq!(config.include_paths, vec!["shared".to_string()]);
        assert!(config.dev);
        // Unspecified fields fall back to defaults.
        assert_eq!(config.web_root, "web");
    }

    #[test]
    fn rejects_malformed_extensions() {
        let config = Config {
            resolve_extensions: vec!["js".to_string()],
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
