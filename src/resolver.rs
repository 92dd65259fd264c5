use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::{BundleError, Result};
use crate::file::{self, File};

/// A file known to dependents by a logical module name, the identity used in
/// the emitted runtime registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    pub file: File,
}

/// What an import specifier resolved to: a plain file for relative imports,
/// a named module for bare package imports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Target {
    File(File),
    Module(Module),
}

impl Target {
    pub fn file(&self) -> &File {
        match self {
            Target::File(file) => file,
            Target::Module(module) => &module.file,
        }
    }

    pub fn module_name(&self) -> Option<&str> {
        match self {
            Target::File(_) => None,
            Target::Module(module) => Some(&module.name),
        }
    }
}

/// A resolved import: the specifier as the parser saw it plus the target it
/// resolved to. The textual form may differ from the resolved name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Import {
    pub specifier: String,
    pub target: Target,
}

impl Import {
    pub fn file(&self) -> &File {
        self.target.file()
    }
}

/// Maps import specifiers to on-disk files, following node-style lookup:
/// extension probing for relative specifiers, upward `node_modules` walks
/// plus `package.json` `main` for bare ones.
#[derive(Debug)]
pub struct ModuleResolver {
    root: PathBuf,
    extensions: Vec<String>,
    include_paths: Vec<String>,
    /// Resolutions keyed by (requesting dir, specifier); misses are cached
    /// too so repeated dynamic-import probes stay cheap.
    cache: HashMap<(String, String), Option<Import>>,
}

impl ModuleResolver {
    pub fn new(
        root: impl Into<PathBuf>,
        extensions: Vec<String>,
        include_paths: Vec<String>,
    ) -> Self {
        Self {
            root: root.into(),
            extensions,
            include_paths,
            cache: HashMap::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.project_root.clone(),
            config.resolve_extensions.clone(),
            config.include_paths.clone(),
        )
    }

    /// Resolve `specifier` as seen from `from`. URL specifiers, protocol
    /// prefixes, and absolute OS paths are not honored.
    pub fn resolve(&mut self, specifier: &str, from: &File) -> Result<Import> {
        let key = (from.dir().to_string(), specifier.to_string());
        if let Some(cached) = self.cache.get(&key) {
            return match cached {
                Some(import) => Ok(import.clone()),
                None => Err(BundleError::not_found(specifier, from.path())),
            };
        }

        let result = self.resolve_uncached(specifier, from);
        match &result {
            Ok(import) => {
                self.cache.insert(key, Some(import.clone()));
            }
            Err(err) if err.is_not_found() => {
                self.cache.insert(key, None);
            }
            Err(_) => {}
        }
        result
    }

    fn resolve_uncached(&self, specifier: &str, from: &File) -> Result<Import> {
        if specifier.starts_with("./") || specifier.starts_with("../") {
            let joined = File::new(file::join(from.dir(), specifier));
            let resolved = self
                .probe(&joined)
                .ok_or_else(|| BundleError::not_found(specifier, from.path()))?;
            debug!("Resolved \"{}\" -> {}", specifier, resolved);
            Ok(Import {
                specifier: specifier.to_string(),
                target: Target::File(resolved),
            })
        } else {
            self.resolve_bare(specifier, from)
        }
    }

    /// Probe a candidate path: the literal file first, then each configured
    /// extension appended to it, then `index.<ext>` inside it as a directory.
    fn probe(&self, candidate: &File) -> Option<File> {
        if self.is_file(candidate.path()) {
            return Some(candidate.clone());
        }

        for ext in &self.extensions {
            let with_ext = format!("{}{}", candidate.path(), ext);
            if self.is_file(&with_ext) {
                return Some(File::new(with_ext));
            }
        }

        for ext in &self.extensions {
            let index = format!("{}/index{}", candidate.path(), ext);
            if self.is_file(&index) {
                return Some(File::new(index));
            }
        }

        None
    }

    fn resolve_bare(&self, specifier: &str, from: &File) -> Result<Import> {
        let (head, rest) = split_specifier(specifier);

        for base in self.search_bases(from) {
            let package_dir = file::join(&file::join(&base, "node_modules"), head);

            let resolved = if rest.is_empty() {
                self.resolve_package_root(&package_dir)
            } else {
                self.probe(&File::new(file::join(&package_dir, rest)))
            };

            if let Some(resolved) = resolved {
                debug!("Resolved \"{}\" -> {}", specifier, resolved);
                return Ok(Import {
                    specifier: specifier.to_string(),
                    target: Target::Module(Module {
                        name: specifier.to_string(),
                        file: resolved,
                    }),
                });
            }
        }

        Err(BundleError::not_found(specifier, from.path()))
    }

    /// Resolve the entry file of a package directory: a string `main` in
    /// `package.json` wins when it probes to a file, otherwise `index.<ext>`.
    /// A missing or malformed `package.json` is not an error.
    fn resolve_package_root(&self, package_dir: &str) -> Option<File> {
        if let Some(main) = self.package_main(package_dir) {
            if let Some(resolved) = self.probe(&File::new(file::join(package_dir, &main))) {
                return Some(resolved);
            }
        }

        for ext in &self.extensions {
            let index = format!("{package_dir}/index{ext}");
            if self.is_file(&index) {
                return Some(File::new(index));
            }
        }

        None
    }

    fn package_main(&self, package_dir: &str) -> Option<String> {
        let manifest = File::new(format!("{package_dir}/package.json"));
        let content = std::fs::read_to_string(manifest.locate(&self.root)).ok()?;
        let json: serde_json::Value = serde_json::from_str(&content).ok()?;
        // Only a string `main` is honored; arrays and objects fall through
        // to index probing.
        json.get("main")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    }

    /// Directories whose `node_modules` are consulted, nearest first: the
    /// requesting directory and its ancestors, then every include path and
    /// its ancestors.
    fn search_bases(&self, from: &File) -> Vec<String> {
        let mut bases = Vec::new();
        walk_up(from.dir(), &mut bases);
        for include in &self.include_paths {
            walk_up(&file::normalize(include), &mut bases);
        }
        bases
    }

    fn is_file(&self, path: &str) -> bool {
        locate(&self.root, path).is_file()
    }
}

fn locate(root: &Path, path: &str) -> PathBuf {
    if path.starts_with('/') {
        PathBuf::from(path)
    } else {
        root.join(path)
    }
}

/// Split a bare specifier into package head and trailing path. Scoped
/// specifiers keep two segments in the head.
fn split_specifier(specifier: &str) -> (&str, &str) {
    let head_segments = if specifier.starts_with('@') { 2 } else { 1 };
    let mut idx = 0;
    let mut seen = 0;
    for (i, ch) in specifier.char_indices() {
        if ch == '/' {
            seen += 1;
            if seen == head_segments {
                idx = i;
                break;
            }
        }
    }
    if idx == 0 {
        (specifier, "")
    } else {
        (&specifier[..idx], &specifier[idx + 1..])
    }
}

fn walk_up(dir: &str, out: &mut Vec<String>) {
    let mut current = dir.to_string();
    loop {
        if !out.contains(&current) {
            out.push(current.clone());
        }
        if current.is_empty() || current == "/" || current == "." {
            break;
        }
        current = match current.rfind('/') {
            Some(0) => "/".to_string(),
            Some(idx) => current[..idx].to_string(),
            None => String::new(),
        };
    }
}
