use super::Factory;
use crate::cache::{disk, memory};
use std::any::Any;
use std::collections::HashMap;

/// A unit of exported symbols registered under a module path.
///
/// Symbols are type-erased; the loader decides at load time whether a symbol
/// has the shape it expects.
#[derive(Default)]
pub struct BackendModule {
    symbols: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl BackendModule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Export `value` under `name`, replacing any previous symbol.
    ///
    /// The loader matches symbols by exact type. A factory must be exported
    /// as the [`Factory`] fn pointer (`my_factory as Factory`); a bare fn item
    /// has its own zero-sized type and is reported as a signature mismatch.
    pub fn export<T: Any + Send + Sync>(mut self, name: &str, value: T) -> Self {
        self.symbols.insert(name.to_string(), Box::new(value));
        self
    }

    /// Look up an exported symbol
    pub fn lookup(&self, name: &str) -> Option<&(dyn Any + Send + Sync)> {
        self.symbols.get(name).map(|symbol| symbol.as_ref())
    }

    /// Names of all exported symbols, sorted
    pub fn symbols(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.symbols.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Backend modules known to the process, keyed by module path
#[derive(Default)]
pub struct BackendRegistry {
    modules: HashMap<String, BackendModule>,
}

impl BackendRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the backends shipped with the server
    pub fn builtin() -> Self {
        Self::new()
            .with_module(
                "memory",
                BackendModule::new()
                    .export("Factory", memory::factory as Factory)
                    .export("Version", env!("CARGO_PKG_VERSION")),
            )
            .with_module(
                "disk",
                BackendModule::new()
                    .export("Factory", disk::factory as Factory)
                    .export("Version", env!("CARGO_PKG_VERSION")),
            )
    }

    /// Register `module` under `path`
    pub fn with_module(mut self, path: &str, module: BackendModule) -> Self {
        self.register(path, module);
        self
    }

    pub fn register(&mut self, path: &str, module: BackendModule) {
        self.modules.insert(path.to_string(), module);
    }

    /// Open the module registered under `path`
    pub fn open(&self, path: &str) -> Option<&BackendModule> {
        self.modules.get(path)
    }

    /// Registered module paths, sorted
    pub fn paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.modules.keys().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }
}
