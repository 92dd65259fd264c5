use log::debug;
use std::fs;
use std::path::PathBuf;
use std::time::SystemTime;

use crate::error::{BundleError, Result};
use crate::file::File;
use crate::util::hash_hex;

/// Decides whether an output artifact is stale with respect to its input
/// set. The last-seen sorted input list lives in a sidecar file under the
/// cache directory; mtimes settle the rest. Disabled (non-dev) the oracle
/// answers stale unconditionally and leaves no sidecars behind.
pub struct FreshnessOracle {
    root: PathBuf,
    cache_dir: PathBuf,
    enabled: bool,
}

impl FreshnessOracle {
    pub fn new(root: impl Into<PathBuf>, cache_dir: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            root: root.into(),
            cache_dir: cache_dir.into(),
            enabled,
        }
    }

    /// True when `output` must be rebuilt from `inputs`. On a stale answer
    /// the sidecar is rewritten first, so later checks within the same run
    /// see the current input set.
    pub fn is_stale(&self, output: &File, inputs: &[String]) -> Result<bool> {
        if !self.enabled {
            return Ok(true);
        }

        let mut sorted: Vec<String> = inputs.to_vec();
        sorted.sort();
        sorted.dedup();

        let stale = self.compute_stale(output, &sorted);
        if stale {
            self.write_sidecar(output, &sorted)?;
        }
        Ok(stale)
    }

    fn compute_stale(&self, output: &File, sorted: &[String]) -> bool {
        let stored = match self.read_sidecar(output) {
            Some(stored) => stored,
            None => {
                debug!("No sources sidecar for {}", output);
                return true;
            }
        };
        if stored != sorted {
            debug!("Input set changed for {}", output);
            return true;
        }

        let output_mtime = match fs::metadata(output.locate(&self.root)).and_then(|m| m.modified())
        {
            Ok(mtime) => mtime,
            Err(_) => {
                debug!("Output missing: {}", output);
                return true;
            }
        };

        sorted
            .iter()
            .any(|input| input_newer(&File::new(input), &self.root, output_mtime))
    }

    fn read_sidecar(&self, output: &File) -> Option<Vec<String>> {
        let content = fs::read_to_string(self.sidecar_path(output)).ok()?;
        serde_json::from_str(&content).ok()
    }

    fn write_sidecar(&self, output: &File, sorted: &[String]) -> Result<()> {
        fs::create_dir_all(&self.cache_dir)
            .map_err(|e| BundleError::io(&self.cache_dir, e))?;
        let path = self.sidecar_path(output);
        let serialized = serde_json::to_string(sorted)
            .map_err(|e| BundleError::io(&path, std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
        fs::write(&path, serialized).map_err(|e| BundleError::io(&path, e))
    }

    fn sidecar_path(&self, output: &File) -> PathBuf {
        self.cache_dir
            .join(format!("{}.sources", hash_hex(output.path())))
    }
}

/// A missing input (a virtual dependency) never forces a rebuild by mtime;
/// membership changes in the sidecar list cover it.
fn input_newer(input: &File, root: &std::path::Path, output_mtime: SystemTime) -> bool {
    match fs::metadata(input.locate(root)).and_then(|m| m.modified()) {
        Ok(input_mtime) => input_mtime > output_mtime,
        Err(_) => false,
    }
}
