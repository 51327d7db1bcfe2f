//! Backend loading
//!
//! Resolves the process-wide cache once at startup from a [`BackendDescriptor`].
//! A module path selects a module from the [`BackendRegistry`]; the factory
//! symbol is looked up by name, checked against the [`Factory`] shape and
//! invoked with the process logger.

pub mod registry;

pub use registry::{BackendModule, BackendRegistry};

use crate::cache::{Cache, NopCache};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{Span, info, info_span};

/// Default name of the factory symbol
pub const DEFAULT_FACTORY: &str = "Factory";

/// Constructor exported by a backend module
pub type Factory = fn(Span) -> anyhow::Result<Arc<dyn Cache>>;

/// Which module to load and which symbol to call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendDescriptor {
    /// Module path; empty selects the no-op cache
    pub module: String,
    /// Name of the exported factory symbol
    pub factory: String,
}

impl Default for BackendDescriptor {
    fn default() -> Self {
        Self {
            module: String::new(),
            factory: DEFAULT_FACTORY.to_string(),
        }
    }
}

impl BackendDescriptor {
    pub fn new(module: impl Into<String>, factory: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            factory: factory.into(),
        }
    }

    /// True when no backend module is configured
    pub fn is_nop(&self) -> bool {
        self.module.is_empty()
    }
}

/// Errors raised while loading a backend. All of them abort startup.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("open backend module {module:?}: {reason}")]
    LoadFailure { module: String, reason: String },

    #[error("lookup symbol {symbol:?} in backend module {module:?}: symbol not found")]
    SymbolNotFound { module: String, symbol: String },

    #[error("symbol {symbol:?} in backend module {module:?} has unexpected type; want {expected}")]
    SignatureMismatch {
        module: String,
        symbol: String,
        expected: &'static str,
    },

    #[error("backend factory {symbol:?} in module {module:?} failed")]
    FactoryError {
        module: String,
        symbol: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Load the cache described by `descriptor`.
///
/// An empty module path yields [`NopCache`] without touching the registry.
pub fn load(
    registry: &BackendRegistry,
    descriptor: &BackendDescriptor,
    log: &Span,
) -> Result<Arc<dyn Cache>, LoadError> {
    if descriptor.is_nop() {
        info!(parent: log, "no cache backend configured; using nop cache");
        return Ok(Arc::new(NopCache));
    }

    let module = registry
        .open(&descriptor.module)
        .ok_or_else(|| LoadError::LoadFailure {
            module: descriptor.module.clone(),
            reason: format!(
                "no such backend module (available: {})",
                registry.paths().join(", ")
            ),
        })?;

    let symbol = module
        .lookup(&descriptor.factory)
        .ok_or_else(|| LoadError::SymbolNotFound {
            module: descriptor.module.clone(),
            symbol: descriptor.factory.clone(),
        })?;

    let factory = symbol
        .downcast_ref::<Factory>()
        .ok_or_else(|| LoadError::SignatureMismatch {
            module: descriptor.module.clone(),
            symbol: descriptor.factory.clone(),
            expected: std::any::type_name::<Factory>(),
        })?;

    let backend_log = info_span!(parent: log, "cache_backend", module = %descriptor.module);
    let cache = factory(backend_log).map_err(|source| LoadError::FactoryError {
        module: descriptor.module.clone(),
        symbol: descriptor.factory.clone(),
        source,
    })?;

    match module
        .lookup("Version")
        .and_then(|v| v.downcast_ref::<&'static str>())
    {
        Some(version) => info!(
            parent: log,
            module = %descriptor.module,
            factory = %descriptor.factory,
            version = %version,
            "cache backend loaded"
        ),
        None => info!(
            parent: log,
            module = %descriptor.module,
            factory = %descriptor.factory,
            "cache backend loaded"
        ),
    }

    Ok(cache)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheError;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn failing_factory(_log: Span) -> anyhow::Result<Arc<dyn Cache>> {
        anyhow::bail!("connection refused")
    }

    fn wrong_shape(_log: Span) -> Arc<dyn Cache> {
        Arc::new(NopCache)
    }

    fn test_registry() -> BackendRegistry {
        BackendRegistry::builtin().with_module(
            "broken",
            BackendModule::new()
                .export("Factory", failing_factory as Factory)
                .export("Infallible", wrong_shape as fn(Span) -> Arc<dyn Cache>)
                .export("Uncast", failing_factory),
        )
    }

    #[test]
    fn test_empty_path_is_nop() {
        let registry = BackendRegistry::new();
        let cache = load(&registry, &BackendDescriptor::default(), &Span::none()).unwrap();

        let ctx = CancellationToken::new();
        cache.set(&ctx, "1", "1", Duration::from_secs(1)).unwrap();
        assert_eq!(cache.get(&ctx, "1"), Err(CacheError::NotFound));
    }

    #[test]
    fn test_memory_backend_loads() {
        let descriptor = BackendDescriptor::new("memory", DEFAULT_FACTORY);
        let cache = load(&test_registry(), &descriptor, &Span::none()).unwrap();

        let ctx = CancellationToken::new();
        cache.set(&ctx, "10", "55", Duration::from_secs(60)).unwrap();
        assert_eq!(cache.get(&ctx, "10").unwrap(), "55");
    }

    #[test]
    fn test_unknown_module() {
        let descriptor = BackendDescriptor::new("/opt/backends/redis.so", DEFAULT_FACTORY);
        let err = load(&test_registry(), &descriptor, &Span::none()).err().unwrap();
        assert!(matches!(err, LoadError::LoadFailure { .. }));
        assert!(err.to_string().contains("available: broken, disk, memory"));
    }

    #[test]
    fn test_missing_symbol() {
        let descriptor = BackendDescriptor::new("memory", "New");
        let err = load(&test_registry(), &descriptor, &Span::none()).err().unwrap();
        assert!(matches!(err, LoadError::SymbolNotFound { .. }));
    }

    #[test]
    fn test_signature_mismatch() {
        let registry = test_registry();

        for symbol in ["Infallible", "Uncast"] {
            let descriptor = BackendDescriptor::new("broken", symbol);
            let err = load(&registry, &descriptor, &Span::none()).err().unwrap();
            assert!(
                matches!(err, LoadError::SignatureMismatch { .. }),
                "{}: {}",
                symbol,
                err
            );
        }

        let descriptor = BackendDescriptor::new("memory", "Version");
        let err = load(&registry, &descriptor, &Span::none()).err().unwrap();
        assert!(matches!(err, LoadError::SignatureMismatch { .. }));
    }

    #[test]
    fn test_factory_error() {
        let descriptor = BackendDescriptor::new("broken", DEFAULT_FACTORY);
        let err = load(&test_registry(), &descriptor, &Span::none()).err().unwrap();

        match err {
            LoadError::FactoryError { source, .. } => {
                assert_eq!(source.to_string(), "connection refused");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_descriptor_defaults() {
        let descriptor: BackendDescriptor = serde_yaml::from_str("module: memory").unwrap();
        assert_eq!(descriptor.factory, DEFAULT_FACTORY);
        assert!(!descriptor.is_nop());
        assert!(BackendDescriptor::default().is_nop());
    }
}
