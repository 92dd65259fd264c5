use log::{debug, info};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::collect::{CachedCollector, CollectorSet};
use crate::config::Config;
use crate::error::{BundleError, Result};
use crate::file::{self, File};
use crate::finder::{Dependency, ImportFinder};
use crate::freshness::FreshnessOracle;
use crate::partition::{asset_target, entry_targets, partition};
use crate::pipeline::Pipeline;
use crate::resolver::ModuleResolver;

/// The readable and minified runtime loader shims, embedded at build time.
const RUNTIME_SHIM: &str = include_str!("runtime/require.js");
const RUNTIME_SHIM_MIN: &str = include_str!("runtime/require.min.js");

/// Orchestrates one build: dependency discovery, partitioning, freshness
/// checks, pipeline pushes, and output writes, entry by entry in
/// configuration order.
pub struct Bundler {
    config: Config,
}

impl Bundler {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Process every configured entry point and standalone asset.
    pub fn bundle(&mut self) -> Result<()> {
        info!("Starting bundle");
        debug!("Entries: {:?}", self.config.entry_points);

        let root = self.config.project_root.clone();
        let cache_path = File::new(&self.config.cache_dir).locate(&root);

        let resolver = ModuleResolver::from_config(&self.config);
        let collector_cache = self.config.dev.then(|| cache_path.join("imports"));
        let collectors = CachedCollector::new(CollectorSet::default(), &root, collector_cache);

        let mut pipeline = Pipeline::new(&root, &self.config.source_root);
        if self.config.dev {
            pipeline = pipeline.with_item_cache(cache_path.join("items"));
        }

        let mut build = Build {
            config: &self.config,
            finder: ImportFinder::new(resolver, collectors),
            pipeline,
            oracle: FreshnessOracle::new(&root, &cache_path, self.config.dev),
            out_dir: self.config.output_dir(),
            emitted_assets: HashSet::new(),
        };

        build.write_runtime_shim()?;

        for entry in &self.config.entry_points {
            build.bundle_entry(&File::new(entry))?;
        }
        for asset in &self.config.asset_files {
            build.bundle_asset(&File::new(asset))?;
        }

        info!("Bundle complete");
        Ok(())
    }
}

/// Per-invocation state shared by the driver steps.
struct Build<'a> {
    config: &'a Config,
    finder: ImportFinder,
    pipeline: Pipeline,
    oracle: FreshnessOracle,
    out_dir: String,
    /// Assets already emitted this run; shared assets are written once and
    /// mutually-referencing stylesheets cannot recurse forever.
    emitted_assets: HashSet<String>,
}

impl Build<'_> {
    fn bundle_entry(&mut self, entry: &File) -> Result<()> {
        info!("Bundling entry {}", entry);

        let boot = Dependency::synthetic(entry.with_extension("boot.js"));
        let deps = self.finder.all_with_prelude(entry, vec![boot])?;
        let part = partition(&deps, &self.pipeline)?;
        let (bundle_target, vendor_target) = entry_targets(&self.out_dir, entry);

        let mut bundle_inputs: Vec<String> = deps
            .iter()
            .filter(|d| d.is_virtual())
            .map(|d| d.file().path().to_string())
            .collect();
        bundle_inputs.extend(part.bundle.iter().map(|d| d.file().path().to_string()));
        self.write_if_stale(&bundle_target, &bundle_inputs, &part.bundle)?;

        if part.vendor.is_empty() {
            debug!("No vendor dependencies for {}", entry);
        } else {
            let vendor_inputs: Vec<String> = part
                .vendor
                .iter()
                .map(|d| d.file().path().to_string())
                .collect();
            self.write_if_stale(&vendor_target, &vendor_inputs, &part.vendor)?;
        }

        for asset in &part.assets {
            self.bundle_asset(asset.file())?;
        }

        Ok(())
    }

    /// Emit one asset as its own pipeline root. Side-channel assets it
    /// references are emitted individually first.
    fn bundle_asset(&mut self, asset: &File) -> Result<()> {
        if !self.emitted_assets.insert(asset.path().to_string()) {
            return Ok(());
        }
        debug!("Bundling asset {}", asset);

        let deps = self.finder.all(asset)?;
        let (inline, side): (Vec<Dependency>, Vec<Dependency>) = deps
            .iter()
            .cloned()
            .partition(|d| !d.is_inlined_asset() || d.file() == asset);

        for dep in &side {
            self.bundle_asset(dep.file())?;
        }

        let terminal = self.pipeline.peek(asset)?;
        let target = asset_target(&self.out_dir, &self.config.source_root, asset, &terminal);
        let inputs: Vec<String> = deps
            .iter()
            .map(|d| d.file().path().to_string())
            .collect();
        self.write_if_stale(&target, &inputs, &inline)
    }

    fn write_if_stale(
        &mut self,
        target: &File,
        inputs: &[String],
        deps: &[Dependency],
    ) -> Result<()> {
        if !self.oracle.is_stale(target, inputs)? {
            debug!("Fresh: {}", target);
            return Ok(());
        }

        let content = self.pipeline.push(deps, target)?;
        self.write_output(target, &content)?;
        info!("Wrote {}", target);
        Ok(())
    }

    fn write_runtime_shim(&mut self) -> Result<()> {
        let target = File::new(file::join(&self.out_dir, "require.js"));
        if !self.oracle.is_stale(&target, &[])? {
            debug!("Fresh: {}", target);
            return Ok(());
        }

        let shim = if self.config.dev {
            RUNTIME_SHIM
        } else {
            RUNTIME_SHIM_MIN
        };
        self.write_output(&target, shim)?;
        info!("Wrote runtime shim {}", target);
        Ok(())
    }

    /// Parents are created first; the content lands in a single write so an
    /// aborted invocation never leaves a partial output behind.
    fn write_output(&self, target: &File, content: &str) -> Result<()> {
        let disk = target.locate(&self.config.project_root);
        if let Some(parent) = disk.parent() {
            create_dirs(parent)?;
        }
        fs::write(&disk, content).map_err(|e| BundleError::io(&disk, e))
    }
}

fn create_dirs(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| BundleError::io(dir, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn config(root: &Path) -> Config {
        Config {
            project_root: root.to_path_buf(),
            entry_points: vec!["src/main.js".to_string()],
            dev: true,
            ..Config::default()
        }
    }

    #[test]
    fn entry_produces_bundle_vendor_and_shim() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "src/main.js",
            r#"require("./app"); require("lib");"#,
        );
        write(dir.path(), "src/app.js", "var app = 1;");
        write(dir.path(), "node_modules/lib/index.js", "var lib = 2;");

        Bundler::new(config(dir.path())).bundle().unwrap();

        let bundle = fs::read_to_string(dir.path().join("web/bundles/main.js")).unwrap();
        assert!(bundle.contains("require.register(\"app\""));
        assert!(bundle.contains("require.register(\"main\""));
        assert!(!bundle.contains("var lib"));

        let vendor = fs::read_to_string(dir.path().join("web/bundles/main.vendor.js")).unwrap();
        assert!(vendor.contains("require.register(\"lib\""));
        assert!(!vendor.contains("var app"));

        let shim = fs::read_to_string(dir.path().join("web/bundles/require.js")).unwrap();
        assert!(shim.contains("require.register = "));
    }

    #[test]
    fn non_dev_uses_the_minified_shim() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "src/main.js", "var x = 1;");

        let mut cfg = config(dir.path());
        cfg.dev = false;
        Bundler::new(cfg).bundle().unwrap();

        let shim = fs::read_to_string(dir.path().join("web/bundles/require.js")).unwrap();
        assert!(shim.contains("q.register=function"));
    }

    #[test]
    fn standalone_assets_are_emitted_with_root_stripped() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "src/main.js", "");
        write(dir.path(), "src/styles/site.css", "body { color: red; }\n");

        let mut cfg = config(dir.path());
        cfg.asset_files = vec!["src/styles/site.css".to_string()];
        Bundler::new(cfg).bundle().unwrap();

        let css = fs::read_to_string(dir.path().join("web/bundles/styles/site.css")).unwrap();
        assert_eq!(css, "body { color: red; }\n");
    }

    #[test]
    fn css_referenced_assets_are_emitted_separately() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "src/main.js", "");
        write(
            dir.path(),
            "src/styles/site.css",
            ".hero { background: url(hero.svg); }\n",
        );
        write(dir.path(), "src/styles/hero.svg", "<svg></svg>\n");

        let mut cfg = config(dir.path());
        cfg.asset_files = vec!["src/styles/site.css".to_string()];
        Bundler::new(cfg).bundle().unwrap();

        let css = fs::read_to_string(dir.path().join("web/bundles/styles/site.css")).unwrap();
        assert_eq!(css, ".hero { background: url(hero.svg); }\n");
        let svg = fs::read_to_string(dir.path().join("web/bundles/styles/hero.svg")).unwrap();
        assert_eq!(svg, "<svg></svg>\n");
    }
}
