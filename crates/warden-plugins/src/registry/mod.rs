//! Plugin registry built by scanning the plugin root once at startup.
//!
//! The [`PluginRegistry`] keys descriptors by command name in sorted order so
//! help output and discovery are deterministic. Discovery never fails: an
//! absent or unreadable root yields an empty registry and unreadable entries
//! are skipped.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use tracing::{debug, warn};

use crate::descriptor::PluginDescriptor;
use crate::error::PluginError;

/// Tracing target for plugin discovery.
const REGISTRY_TARGET: &str = "warden_plugins::registry";

/// Registry of discovered plugin commands.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginRegistry {
    plugins: BTreeMap<String, PluginDescriptor>,
}

impl PluginRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one plugin per immediate subdirectory of `root`.
    ///
    /// Regular files, symbolic links and directories whose names are not
    /// valid UTF-8 are ignored.
    #[must_use]
    pub fn discover(root: &Path) -> Self {
        let mut registry = Self::new();
        let entries = match fs::read_dir(root) {
            Ok(entries) => entries,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                debug!(
                    target: REGISTRY_TARGET,
                    root = %root.display(),
                    "plugin root absent"
                );
                return registry;
            }
            Err(error) => {
                warn!(
                    target: REGISTRY_TARGET,
                    root = %root.display(),
                    %error,
                    "failed to read plugin root"
                );
                return registry;
            }
        };

        for entry in entries.flatten() {
            let is_dir = entry.file_type().is_ok_and(|kind| kind.is_dir());
            if !is_dir {
                continue;
            }
            let Ok(name) = entry.file_name().into_string() else {
                debug!(
                    target: REGISTRY_TARGET,
                    path = %entry.path().display(),
                    "skipping plugin directory with non UTF-8 name"
                );
                continue;
            };
            if let Err(error) = registry.register(PluginDescriptor::new(name, entry.path())) {
                warn!(target: REGISTRY_TARGET, %error, "skipping plugin");
            }
        }

        debug!(
            target: REGISTRY_TARGET,
            root = %root.display(),
            count = registry.len(),
            "discovered plugins"
        );
        registry
    }

    /// Adds a descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Duplicate`] when the name is already taken.
    pub fn register(&mut self, descriptor: PluginDescriptor) -> Result<(), PluginError> {
        if self.plugins.contains_key(descriptor.name()) {
            return Err(PluginError::Duplicate {
                name: descriptor.name().to_owned(),
            });
        }
        self.plugins
            .insert(descriptor.name().to_owned(), descriptor);
        Ok(())
    }

    /// Removes and returns the plugin registered under `name`.
    pub fn remove(&mut self, name: &str) -> Option<PluginDescriptor> {
        self.plugins.remove(name)
    }

    /// Looks up a plugin by command name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PluginDescriptor> {
        self.plugins.get(name)
    }

    /// Iterates over plugins in name order.
    pub fn iter(&self) -> impl Iterator<Item = &PluginDescriptor> {
        self.plugins.values()
    }

    /// Returns the number of registered plugins.
    #[must_use]
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Returns `true` when no plugins are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}
