use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::mem;
use std::path::{Path, PathBuf};

use crate::error::{BundleError, Result};
use crate::file::File;
use crate::finder::Dependency;
use crate::util::{hash_hex, module_name_for, normalize_line_endings};

/// Where an item stands between its raw source form and its emitted form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentPhase {
    Reading,
    Processing,
    Ready,
}

/// The pipeline's state machine: current phase, current extension, and the
/// append-only history of extensions already traversed. Every processor
/// step must change the phase or the extension; one that changes neither
/// would loop forever and is reported as stuck.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentState {
    phase: ContentPhase,
    extension: String,
    history: Vec<String>,
}

impl ContentState {
    pub fn new(extension: impl Into<String>) -> Self {
        Self {
            phase: ContentPhase::Reading,
            extension: extension.into(),
            history: Vec::new(),
        }
    }

    pub fn phase(&self) -> ContentPhase {
        self.phase
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Extensions this item has already been, oldest first.
    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub fn is_ready(&self) -> bool {
        self.phase == ContentPhase::Ready
    }

    /// Move to a new extension, recording the old one.
    pub fn set_extension(&mut self, extension: impl Into<String>) {
        let old = mem::replace(&mut self.extension, extension.into());
        self.history.push(old);
        if self.phase == ContentPhase::Reading {
            self.phase = ContentPhase::Processing;
        }
    }

    pub fn finish(&mut self) {
        self.phase = ContentPhase::Ready;
    }

    fn snapshot(&self) -> (ContentPhase, String) {
        (self.phase, self.extension.clone())
    }
}

/// A ContentState bound to a file, a module name, and its content. Content
/// is read lazily so peeked or cache-restored items never touch the source.
pub struct ContentItem {
    file: File,
    module_name: String,
    state: ContentState,
    content: Option<String>,
    location: PathBuf,
}

impl ContentItem {
    pub fn new(root: &Path, file: File, module_name: String) -> Self {
        let location = file.locate(root);
        let state = ContentState::new(file.extension());
        Self {
            file,
            module_name,
            state,
            content: None,
            location,
        }
    }

    /// An item that is already in its terminal form.
    pub fn ready(file: File, module_name: String, content: String) -> Self {
        let location = file.to_path_buf();
        let mut state = ContentState::new(file.extension());
        state.finish();
        Self {
            file,
            module_name,
            state,
            content: Some(content),
            location,
        }
    }

    pub fn file(&self) -> &File {
        &self.file
    }

    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    pub fn state(&self) -> &ContentState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ContentState {
        &mut self.state
    }

    /// Buffered content, reading the file on first access.
    pub fn content(&mut self) -> Result<&str> {
        if self.content.is_none() {
            let read = fs::read_to_string(&self.location)
                .map_err(|e| BundleError::io(&self.location, e))?;
            self.content = Some(read);
        }
        Ok(self.content.as_deref().unwrap_or_default())
    }

    pub fn set_content(&mut self, content: String) {
        self.content = Some(content);
    }
}

/// One stage of the content pipeline. `peek` must perform the same state
/// transition as `transpile` without touching content.
pub trait Processor {
    fn supports(&self, state: &ContentState) -> bool;

    fn transpile(&self, cwd: &Path, item: &mut ContentItem) -> Result<()>;

    fn peek(&self, cwd: &Path, state: &mut ContentState) -> Result<()>;
}

/// Advisory notification hook around processor invocations. The pipeline
/// never depends on what a sink does.
pub trait AssetSink {
    fn pre_process(&self, _item: &ContentItem) {}
    fn post_process(&self, _item: &ContentItem) {}
    fn ready(&self, _item: &ContentItem) {}
}

/// Default sink: trace the pipeline at debug level.
pub struct LogSink;

impl AssetSink for LogSink {
    fn pre_process(&self, item: &ContentItem) {
        debug!(
            "Processing {} ({})",
            item.module_name(),
            item.state().extension()
        );
    }

    fn post_process(&self, item: &ContentItem) {
        debug!(
            "Processed {} -> {}",
            item.module_name(),
            item.state().extension()
        );
    }

    fn ready(&self, item: &ContentItem) {
        debug!("Target ready: {}", item.file());
    }
}

/// `json -> js`: the parsed value becomes the module's export.
pub struct JsonProcessor;

impl Processor for JsonProcessor {
    fn supports(&self, state: &ContentState) -> bool {
        !state.is_ready() && state.extension() == "json"
    }

    fn transpile(&self, _cwd: &Path, item: &mut ContentItem) -> Result<()> {
        let raw = item.content()?.trim_end().to_string();
        if raw.is_empty() {
            return Err(BundleError::parse(
                item.module_name(),
                "empty JSON document",
            ));
        }
        item.set_content(format!("module.exports = {raw};"));
        item.state_mut().set_extension("js");
        Ok(())
    }

    fn peek(&self, _cwd: &Path, state: &mut ContentState) -> Result<()> {
        state.set_extension("js");
        Ok(())
    }
}

/// Terminal stage for script content: wrap it in the runtime registry form.
pub struct JsModuleProcessor;

impl Processor for JsModuleProcessor {
    fn supports(&self, state: &ContentState) -> bool {
        !state.is_ready() && matches!(state.extension(), "js" | "node")
    }

    fn transpile(&self, _cwd: &Path, item: &mut ContentItem) -> Result<()> {
        let name = item.module_name().to_string();
        let body = item.content()?.trim_end().to_string();
        item.set_content(format!(
            "require.register(\"{name}\", function (module, exports, require) {{\n{body}\n}});\n"
        ));
        item.state_mut().finish();
        Ok(())
    }

    fn peek(&self, _cwd: &Path, state: &mut ContentState) -> Result<()> {
        state.finish();
        Ok(())
    }
}

/// Terminal stage for everything else: stylesheets, images, and other
/// assets pass through untouched.
pub struct PassthroughProcessor;

impl Processor for PassthroughProcessor {
    fn supports(&self, state: &ContentState) -> bool {
        !state.is_ready()
    }

    fn transpile(&self, _cwd: &Path, item: &mut ContentItem) -> Result<()> {
        item.state_mut().finish();
        Ok(())
    }

    fn peek(&self, _cwd: &Path, state: &mut ContentState) -> Result<()> {
        state.finish();
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct CachedItem {
    content: String,
    extension: String,
}

/// Dev-mode per-item cache: `(content, extension)` pairs keyed by the input
/// file's content hash, stored under `<cacheDir>/items`.
struct ItemCache {
    dir: PathBuf,
}

impl ItemCache {
    fn load(&self, key: &str) -> Option<CachedItem> {
        let content = fs::read_to_string(self.dir.join(key)).ok()?;
        serde_json::from_str(&content).ok()
    }

    fn store(&self, key: &str, content: &str, extension: &str) {
        let entry = CachedItem {
            content: content.to_string(),
            extension: extension.to_string(),
        };
        let serialized = match serde_json::to_string(&entry) {
            Ok(s) => s,
            Err(err) => {
                debug!("Skipping item cache write: {}", err);
                return;
            }
        };
        if let Err(err) = fs::create_dir_all(&self.dir) {
            debug!("Skipping item cache write: {}", err);
            return;
        }
        if let Err(err) = fs::write(self.dir.join(key), serialized) {
            debug!("Skipping item cache write: {}", err);
        }
    }
}

/// Drives items through processors until every one reaches its terminal
/// form, then concatenates. First-match processor selection; custom
/// processors registered ahead of the built-ins.
pub struct Pipeline {
    root: PathBuf,
    source_root: String,
    processors: Vec<Box<dyn Processor>>,
    sink: Box<dyn AssetSink>,
    item_cache: Option<ItemCache>,
}

impl Pipeline {
    pub fn new(root: impl Into<PathBuf>, source_root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            source_root: source_root.into(),
            processors: vec![
                Box::new(JsonProcessor),
                Box::new(JsModuleProcessor),
                Box::new(PassthroughProcessor),
            ],
            sink: Box::new(LogSink),
            item_cache: None,
        }
    }

    pub fn with_item_cache(mut self, dir: PathBuf) -> Self {
        self.item_cache = Some(ItemCache { dir });
        self
    }

    pub fn with_sink(mut self, sink: Box<dyn AssetSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Register a processor ahead of the built-ins.
    pub fn insert_processor(&mut self, processor: Box<dyn Processor>) {
        self.processors.insert(0, processor);
    }

    /// Run every non-virtual dependency to its terminal form and return the
    /// concatenation in list order.
    pub fn push(&self, deps: &[Dependency], target: &File) -> Result<String> {
        let target_location = target.locate(&self.root);
        let mut out = String::new();

        for dep in deps.iter().filter(|d| !d.is_virtual()) {
            let name = dep
                .module_name()
                .map(str::to_string)
                .unwrap_or_else(|| module_name_for(dep.file(), &self.source_root));
            let mut item = ContentItem::new(&self.root, dep.file().clone(), name);

            match self.plan_cache(&mut item, &target_location)? {
                CachePlan::Restored => {}
                CachePlan::Off => self.process(&mut item)?,
                CachePlan::Store(key) => {
                    self.process(&mut item)?;
                    if let Some(cache) = &self.item_cache {
                        let extension = item.state().extension().to_string();
                        cache.store(&key, item.content()?, &extension);
                    }
                }
            }
            out.push_str(item.content()?);
        }

        let out = normalize_line_endings(out);
        let target_item = ContentItem::ready(
            target.clone(),
            target.basename().to_string(),
            out.clone(),
        );
        self.sink.ready(&target_item);
        Ok(out)
    }

    /// Compute the terminal extension a file would reach, without reading
    /// or transforming its content.
    pub fn peek(&self, file: &File) -> Result<String> {
        let state = self.peek_state(file)?;
        Ok(state.extension().to_string())
    }

    /// The full extension chain a file would traverse, source form first,
    /// terminal form last.
    pub fn peek_chain(&self, file: &File) -> Result<Vec<String>> {
        let state = self.peek_state(file)?;
        let mut chain = state.history().to_vec();
        chain.push(state.extension().to_string());
        Ok(chain)
    }

    fn peek_state(&self, file: &File) -> Result<ContentState> {
        let mut state = ContentState::new(file.extension());
        while !state.is_ready() {
            let before = state.snapshot();
            let processor = self
                .processors
                .iter()
                .find(|p| p.supports(&state))
                .ok_or_else(|| stuck(file.name(), &state))?;
            processor.peek(&self.root, &mut state)?;
            if state.snapshot() == before {
                return Err(stuck(file.name(), &state));
            }
        }
        Ok(state)
    }

    fn process(&self, item: &mut ContentItem) -> Result<()> {
        while !item.state().is_ready() {
            let before = item.state().snapshot();
            let processor = self
                .processors
                .iter()
                .find(|p| p.supports(item.state()))
                .ok_or_else(|| stuck(item.module_name(), item.state()))?;

            self.sink.pre_process(item);
            processor
                .transpile(&self.root, item)
                .map_err(|err| label_parse(err, item.module_name()))?;
            self.sink.post_process(item);

            if item.state().snapshot() == before {
                return Err(stuck(item.module_name(), item.state()));
            }
        }
        Ok(())
    }

    /// Consult the per-item cache before processing an item.
    fn plan_cache(&self, item: &mut ContentItem, target_location: &Path) -> Result<CachePlan> {
        let Some(cache) = &self.item_cache else {
            return Ok(CachePlan::Off);
        };

        // The key covers the extension: processor selection depends on it.
        let extension = item.state().extension().to_string();
        let key = hash_hex(format!("{}\n{}", extension, item.content()?));

        if target_newer_than_input(target_location, item) {
            if let Some(stored) = cache.load(&key) {
                debug!("Item cache hit for {}", item.file());
                item.set_content(stored.content);
                if stored.extension != extension {
                    item.state_mut().set_extension(stored.extension);
                }
                item.state_mut().finish();
                return Ok(CachePlan::Restored);
            }
        }

        Ok(CachePlan::Store(key))
    }
}

/// What the per-item cache decided for one dependency.
enum CachePlan {
    /// Cached pair loaded; processors are skipped.
    Restored,
    /// Process, then store under this key.
    Store(String),
    /// Caching is disabled.
    Off,
}

fn target_newer_than_input(target: &Path, item: &ContentItem) -> bool {
    let target_mtime = match fs::metadata(target).and_then(|m| m.modified()) {
        Ok(t) => t,
        Err(_) => return false,
    };
    let input_mtime = match fs::metadata(&item.location).and_then(|m| m.modified()) {
        Ok(t) => t,
        Err(_) => return false,
    };
    target_mtime > input_mtime
}

fn stuck(module: &str, state: &ContentState) -> BundleError {
    BundleError::StateStuck {
        module: module.to_string(),
        extension: state.extension().to_string(),
    }
}

fn label_parse(err: BundleError, module: &str) -> BundleError {
    match err {
        BundleError::Parse { message, .. } => BundleError::parse(module, message),
        other => other,
    }
}
