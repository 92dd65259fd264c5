use indexmap::IndexSet;
use log::debug;

use crate::collect::{CachedCollector, ImportCollection};
use crate::error::Result;
use crate::file::File;
use crate::resolver::ModuleResolver;

/// One node of a materialized dependency list. Virtual dependencies are
/// synthesized rather than read from disk; inlined assets are side-channel
/// resources emitted separately instead of concatenated.
#[derive(Debug, Clone, PartialEq)]
pub struct Dependency {
    file: File,
    module_name: Option<String>,
    is_virtual: bool,
    inlined_asset: bool,
    extensions: Vec<String>,
}

impl Dependency {
    pub fn new(file: File) -> Self {
        let extensions = vec![file.extension().to_string()];
        Self {
            file,
            module_name: None,
            is_virtual: false,
            inlined_asset: false,
            extensions,
        }
    }

    pub fn synthetic(file: File) -> Self {
        Self {
            is_virtual: true,
            ..Self::new(file)
        }
    }

    pub fn file(&self) -> &File {
        &self.file
    }

    /// Specifier-derived name for bare-package resolutions; project files
    /// derive their name from the source root instead.
    pub fn module_name(&self) -> Option<&str> {
        self.module_name.as_deref()
    }

    pub fn is_virtual(&self) -> bool {
        self.is_virtual
    }

    pub fn is_inlined_asset(&self) -> bool {
        self.inlined_asset
    }

    /// The chain of extensions this dependency traverses, source form
    /// first. Starts as the source extension alone; the partition fills in
    /// the rest from the peek oracle and routes on the terminal entry.
    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Record the extension chain computed for this dependency.
    pub fn set_extensions(&mut self, extensions: Vec<String>) {
        self.extensions = extensions;
    }

    fn with_context(file: File, module_name: Option<String>, inlined_asset: bool) -> Self {
        Self {
            module_name,
            inlined_asset,
            ..Self::new(file)
        }
    }
}

/// Materializes the transitive import closure of an entry file as a
/// deduplicated, dependency-ordered list: depth-first post-order, so
/// imported files precede their importers and the root comes last.
pub struct ImportFinder {
    resolver: ModuleResolver,
    collectors: CachedCollector,
}

impl ImportFinder {
    pub fn new(resolver: ModuleResolver, collectors: CachedCollector) -> Self {
        Self {
            resolver,
            collectors,
        }
    }

    pub fn all(&mut self, root: &File) -> Result<Vec<Dependency>> {
        self.all_with_prelude(root, Vec::new())
    }

    /// Like `all`, with caller-supplied synthetic dependencies prepended.
    /// They participate in freshness checks but are skipped by the pipeline.
    pub fn all_with_prelude(
        &mut self,
        root: &File,
        prelude: Vec<Dependency>,
    ) -> Result<Vec<Dependency>> {
        let mut visited: IndexSet<String> = IndexSet::new();
        let mut out = prelude;
        for dep in &out {
            visited.insert(dep.file().path().to_string());
        }

        self.visit(root, None, false, &mut visited, &mut out)?;
        debug!("Found {} dependencies for {}", out.len(), root);
        Ok(out)
    }

    fn visit(
        &mut self,
        file: &File,
        module_name: Option<String>,
        inlined_asset: bool,
        visited: &mut IndexSet<String>,
        out: &mut Vec<Dependency>,
    ) -> Result<()> {
        if !visited.insert(file.path().to_string()) {
            return Ok(());
        }

        // Files no collector recognizes are leaves; they still show up in
        // the list when reached through a resource edge.
        let collection = if self.collectors.supports(file) {
            self.collectors.collect(&mut self.resolver, file)?
        } else {
            ImportCollection::default()
        };

        for import in collection.imports() {
            let name = import.target.module_name().map(str::to_string);
            self.visit(import.file(), name, false, visited, out)?;
        }
        for resource in collection.resources() {
            self.visit(resource, None, true, visited, out)?;
        }

        out.push(Dependency::with_context(
            file.clone(),
            module_name,
            inlined_asset,
        ));
        Ok(())
    }
}
