//! Description of a single discovered plugin.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::PluginError;

/// File name of the executable inside each plugin directory.
pub const ENTRY_POINT: &str = "run";

/// A plugin command backed by a directory under the plugin root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginDescriptor {
    name: String,
    directory: PathBuf,
    entry_point: PathBuf,
}

impl PluginDescriptor {
    /// Describes the plugin rooted at `directory`.
    ///
    /// The entry point is always `<directory>/run`; its presence is checked
    /// only when the plugin is invoked.
    #[must_use]
    pub fn new(name: impl Into<String>, directory: impl Into<PathBuf>) -> Self {
        let plugin_dir: PathBuf = directory.into();
        Self {
            name: name.into(),
            entry_point: plugin_dir.join(ENTRY_POINT),
            directory: plugin_dir,
        }
    }

    /// Command name the plugin is registered under.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Plugin directory, used as the working directory when it runs.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path of the executable entry point.
    #[must_use]
    pub fn entry_point(&self) -> &Path {
        &self.entry_point
    }

    /// Confirms the entry point exists and is executable.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::MissingEntryPoint`] when the file is absent or
    /// not a regular file, [`PluginError::NotExecutable`] when no execute bit
    /// is set, or [`PluginError::Inspect`] when its metadata cannot be read.
    pub fn verify_entry_point(&self) -> Result<(), PluginError> {
        let metadata = match fs::metadata(&self.entry_point) {
            Ok(metadata) => metadata,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                return Err(self.missing_entry_point());
            }
            Err(error) => {
                return Err(PluginError::Inspect {
                    name: self.name.clone(),
                    path: self.entry_point.clone(),
                    source: Arc::new(error),
                });
            }
        };
        if !metadata.is_file() {
            return Err(self.missing_entry_point());
        }
        if !is_executable(&metadata) {
            return Err(PluginError::NotExecutable {
                name: self.name.clone(),
                path: self.entry_point.clone(),
            });
        }
        Ok(())
    }

    fn missing_entry_point(&self) -> PluginError {
        PluginError::MissingEntryPoint {
            name: self.name.clone(),
            path: self.entry_point.clone(),
        }
    }
}

#[cfg(unix)]
fn is_executable(metadata: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
const fn is_executable(_metadata: &fs::Metadata) -> bool {
    true
}
