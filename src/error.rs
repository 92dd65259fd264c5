use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T, E = BundleError> = std::result::Result<T, E>;

/// The error kinds the bundler core distinguishes.
///
/// Only `NotFound` raised while a collector scans a file is ever swallowed
/// (dynamic or optional imports must not abort the build); everything else
/// propagates to the driver and aborts the current invocation.
#[derive(Debug, Error)]
pub enum BundleError {
    /// An import specifier exhausted every resolution candidate.
    #[error("cannot resolve \"{specifier}\" imported from {from}")]
    NotFound { specifier: String, from: String },

    /// A pipeline step changed neither the phase nor the extension of an
    /// item. Fatal: without progress the driver loop would never terminate.
    #[error("content pipeline made no progress on module \"{module}\" (extension \"{extension}\")")]
    StateStuck { module: String, extension: String },

    /// A read, write, or directory creation failed.
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A processor rejected the content of a module.
    #[error("failed to process \"{module}\": {message}")]
    Parse { module: String, message: String },
}

impl BundleError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn not_found(specifier: impl Into<String>, from: impl Into<String>) -> Self {
        Self::NotFound {
            specifier: specifier.into(),
            from: from.into(),
        }
    }

    pub fn parse(module: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            module: module.into(),
            message: message.into(),
        }
    }

    /// True for resolution misses, the one kind collectors may drop.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_distinguishable() {
        let err = BundleError::not_found("./missing", "src/app.ts");
        assert!(err.is_not_found());

        let err = BundleError::StateStuck {
            module: "app".to_string(),
            extension: "ts".to_string(),
        };
        assert!(!err.is_not_found());
    }

    #[test]
    fn messages_carry_context() {
        let err = BundleError::not_found("pkg", "src/app.ts");
        let msg = err.to_string();
        assert!(msg.contains("pkg"));
        assert!(msg.contains("src/app.ts"));
    }
}
