use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use crate::error::{BundleError, Result};
use crate::file::File;
use crate::resolver::{Import, ModuleResolver};
use crate::util::hash_hex;

/// Ordered set of imports and resources extracted from one file. Insertion
/// order is preserved and forms the stable emission order downstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportCollection {
    imports: Vec<Import>,
    resources: Vec<File>,
}

impl ImportCollection {
    pub fn add_import(&mut self, import: Import) {
        self.imports.push(import);
    }

    pub fn add_resource(&mut self, resource: File) {
        self.resources.push(resource);
    }

    pub fn imports(&self) -> &[Import] {
        &self.imports
    }

    pub fn resources(&self) -> &[File] {
        &self.resources
    }

    pub fn is_empty(&self) -> bool {
        self.imports.is_empty() && self.resources.is_empty()
    }

    pub fn append(&mut self, mut other: ImportCollection) {
        self.imports.append(&mut other.imports);
        self.resources.append(&mut other.resources);
    }
}

/// Per-extension import parser. Collectors return a fresh collection; the
/// finder accumulates. Specifiers the resolver cannot find are dropped with
/// a debug log, so dynamic or optional imports never abort a build.
pub trait ImportCollector {
    fn supports(&self, file: &File) -> bool;

    fn collect(
        &self,
        resolver: &mut ModuleResolver,
        file: &File,
        source: &str,
    ) -> Result<ImportCollection>;
}

/// Resolve one scanned specifier into `out`, swallowing resolution misses.
fn resolve_into(
    resolver: &mut ModuleResolver,
    specifier: &str,
    from: &File,
    out: &mut ImportCollection,
) -> Result<()> {
    match resolver.resolve(specifier, from) {
        Ok(import) => out.add_import(import),
        Err(err) if err.is_not_found() => {
            debug!("Dropping unresolved import \"{}\" in {}", specifier, from);
        }
        Err(err) => return Err(err),
    }
    Ok(())
}

/// Extracts `require("…")` calls with a single string-literal argument.
pub struct JsCollector;

static REQUIRE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\brequire\s*\(\s*["']([^"']+)["']\s*\)"#).unwrap());

impl ImportCollector for JsCollector {
    fn supports(&self, file: &File) -> bool {
        matches!(file.extension(), "js" | "node")
    }

    fn collect(
        &self,
        resolver: &mut ModuleResolver,
        file: &File,
        source: &str,
    ) -> Result<ImportCollection> {
        let mut collection = ImportCollection::default();
        for capture in REQUIRE_RE.captures_iter(source) {
            resolve_into(resolver, &capture[1], file, &mut collection)?;
        }
        Ok(collection)
    }
}

/// Extracts `import … from "…"` and bare `import "…"` statements, then
/// delegates to the JS collector so `require` calls in the same file are
/// caught as well.
pub struct EsCollector;

static IMPORT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\bimport\s+(?:[\w$*{},\s]+?from\s+)?["']([^"']+)["']"#).unwrap());

impl ImportCollector for EsCollector {
    fn supports(&self, file: &File) -> bool {
        matches!(file.extension(), "js" | "ts")
    }

    fn collect(
        &self,
        resolver: &mut ModuleResolver,
        file: &File,
        source: &str,
    ) -> Result<ImportCollection> {
        let mut collection = ImportCollection::default();
        for capture in IMPORT_RE.captures_iter(source) {
            resolve_into(resolver, &capture[1], file, &mut collection)?;
        }
        collection.append(JsCollector.collect(resolver, file, source)?);
        Ok(collection)
    }
}

/// JSON files import nothing; they are leaves.
pub struct JsonCollector;

impl ImportCollector for JsonCollector {
    fn supports(&self, file: &File) -> bool {
        file.extension() == "json"
    }

    fn collect(
        &self,
        _resolver: &mut ModuleResolver,
        _file: &File,
        _source: &str,
    ) -> Result<ImportCollection> {
        Ok(ImportCollection::default())
    }
}

/// Extracts `url(…)` references from stylesheets as side-channel resources.
pub struct CssCollector;

static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"url\(\s*["']?([^"')]+)["']?\s*\)"#).unwrap());

impl ImportCollector for CssCollector {
    fn supports(&self, file: &File) -> bool {
        file.extension() == "css"
    }

    fn collect(
        &self,
        resolver: &mut ModuleResolver,
        file: &File,
        source: &str,
    ) -> Result<ImportCollection> {
        let mut collection = ImportCollection::default();
        for capture in URL_RE.captures_iter(source) {
            let reference = capture[1].trim();
            if reference.contains(':') || reference.starts_with('/') || reference.starts_with('#') {
                continue;
            }
            let specifier = if reference.starts_with("./") || reference.starts_with("../") {
                reference.to_string()
            } else {
                format!("./{reference}")
            };
            match resolver.resolve(&specifier, file) {
                Ok(import) => collection.add_resource(import.file().clone()),
                Err(err) if err.is_not_found() => {
                    debug!("Dropping unresolved resource \"{}\" in {}", reference, file);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(collection)
    }
}

/// First-match registry over the built-in collectors.
pub struct CollectorSet {
    collectors: Vec<Box<dyn ImportCollector>>,
}

impl Default for CollectorSet {
    fn default() -> Self {
        Self {
            collectors: vec![
                Box::new(EsCollector),
                Box::new(JsCollector),
                Box::new(JsonCollector),
                Box::new(CssCollector),
            ],
        }
    }
}

impl CollectorSet {
    pub fn new(collectors: Vec<Box<dyn ImportCollector>>) -> Self {
        Self { collectors }
    }

    pub fn supports(&self, file: &File) -> bool {
        self.collectors.iter().any(|c| c.supports(file))
    }

    /// Run the first collector whose `supports` matches; empty for files no
    /// collector recognizes.
    pub fn collect_source(
        &self,
        resolver: &mut ModuleResolver,
        file: &File,
        source: &str,
    ) -> Result<ImportCollection> {
        match self.collectors.iter().find(|c| c.supports(file)) {
            Some(collector) => collector.collect(resolver, file, source),
            None => Ok(ImportCollection::default()),
        }
    }
}

/// Memoizing wrapper over a collector set, keyed by content hash, so an
/// unchanged file is parsed at most once per invocation and, with a cache
/// directory, at most once across invocations. Invalidation on content
/// change is automatic via the key.
pub struct CachedCollector {
    inner: CollectorSet,
    root: PathBuf,
    memo: HashMap<String, ImportCollection>,
    disk_dir: Option<PathBuf>,
}

impl CachedCollector {
    pub fn new(inner: CollectorSet, root: impl Into<PathBuf>, disk_dir: Option<PathBuf>) -> Self {
        Self {
            inner,
            root: root.into(),
            memo: HashMap::new(),
            disk_dir,
        }
    }

    pub fn supports(&self, file: &File) -> bool {
        self.inner.supports(file)
    }

    pub fn collect(&mut self, resolver: &mut ModuleResolver, file: &File) -> Result<ImportCollection> {
        let on_disk = file.locate(&self.root);
        let source = fs::read_to_string(&on_disk).map_err(|e| BundleError::io(&on_disk, e))?;

        // The key covers the extension: collector selection depends on it.
        let key = hash_hex(format!("{}\n{}", file.extension(), source));

        if let Some(hit) = self.memo.get(&key) {
            debug!("Collector cache hit for {}", file);
            return Ok(hit.clone());
        }

        if let Some(stored) = self.load_from_disk(&key) {
            debug!("Collector disk cache hit for {}", file);
            self.memo.insert(key, stored.clone());
            return Ok(stored);
        }

        let collection = self.inner.collect_source(resolver, file, &source)?;
        self.memo.insert(key.clone(), collection.clone());
        self.store_to_disk(&key, &collection);
        Ok(collection)
    }

    fn cache_path(&self, key: &str) -> Option<PathBuf> {
        self.disk_dir.as_ref().map(|dir| dir.join(key))
    }

    fn load_from_disk(&self, key: &str) -> Option<ImportCollection> {
        let path = self.cache_path(key)?;
        let content = fs::read_to_string(path).ok()?;
        serde_json::from_str(&content).ok()
    }

    fn store_to_disk(&self, key: &str, collection: &ImportCollection) {
        let Some(path) = self.cache_path(key) else {
            return;
        };
        let serialized = match serde_json::to_string(collection) {
            Ok(s) => s,
            Err(err) => {
                debug!("Skipping collector cache write: {}", err);
                return;
            }
        };
        if let Some(parent) = path.parent() {
            if let Err(err) = fs::create_dir_all(parent) {
                debug!("Skipping collector cache write: {}", err);
                return;
            }
        }
        if let Err(err) = fs::write(&path, serialized) {
            debug!("Skipping collector cache write: {}", err);
        }
    }
}
