//! Plugin runner resolving commands through the registry.
//!
//! The [`PluginRunner`] looks a plugin up by name, checks its entry point and
//! delegates to a [`PluginExecutor`]. Failures stay scoped to the invoked
//! plugin: a broken entry point in one directory never affects discovery or
//! execution of the others.
//!
//! The executor abstraction enables test doubles that record invocations
//! without spawning real processes.

use std::ffi::OsString;

use crate::descriptor::PluginDescriptor;
use crate::environment::PluginEnvironment;
use crate::error::PluginError;
use crate::registry::PluginRegistry;

/// Trait abstracting plugin process execution for testability.
///
/// The production implementation is
/// [`ProcessExecutor`](crate::process::ProcessExecutor), which runs the entry
/// point as a child process with inherited standard streams.
pub trait PluginExecutor {
    /// Runs the plugin to completion.
    ///
    /// # Errors
    ///
    /// Returns a [`PluginError`] if the plugin cannot be spawned, exits with
    /// a non-zero status, or is terminated by a signal.
    fn execute(
        &self,
        plugin: &PluginDescriptor,
        args: &[OsString],
        environment: &PluginEnvironment,
    ) -> Result<(), PluginError>;
}

/// Orchestrates plugin execution by resolving descriptors from the registry
/// and delegating to an executor.
#[derive(Debug)]
pub struct PluginRunner<E> {
    registry: PluginRegistry,
    environment: PluginEnvironment,
    executor: E,
}

impl<E> PluginRunner<E> {
    /// Creates a runner over the given registry, environment and executor.
    #[must_use]
    pub const fn new(registry: PluginRegistry, environment: PluginEnvironment, executor: E) -> Self {
        Self {
            registry,
            environment,
            executor,
        }
    }

    /// Returns a reference to the plugin registry.
    #[must_use]
    pub const fn registry(&self) -> &PluginRegistry {
        &self.registry
    }
}

impl<E: PluginExecutor> PluginRunner<E> {
    /// Runs the plugin registered under `name` with `args` passed verbatim.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::NotFound`] if no plugin with the given name is
    /// registered, an entry point error from
    /// [`PluginDescriptor::verify_entry_point`], or any error produced by the
    /// executor.
    pub fn run(&self, name: &str, args: &[OsString]) -> Result<(), PluginError> {
        let plugin = self
            .registry
            .get(name)
            .ok_or_else(|| PluginError::NotFound {
                name: name.to_owned(),
            })?;
        plugin.verify_entry_point()?;
        self.executor.execute(plugin, args, &self.environment)
    }
}

#[cfg(test)]
mod tests;
