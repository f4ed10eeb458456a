//! Strategy table from backend family to opener

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::errors::DriverError;
use crate::handle::BackendOpener;
use crate::kind::BackendKind;
use crate::libsql::LibSqlOpener;
use crate::sqlx_driver::SqlxOpener;

/// Maps each backend family to the opener responsible for it
#[derive(Clone, Default)]
pub struct DriverRegistry {
    openers: HashMap<BackendKind, Arc<dyn BackendOpener>>,
}

impl fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.openers.keys().map(BackendKind::as_str).collect();
        kinds.sort_unstable();
        f.debug_struct("DriverRegistry")
            .field("backends", &kinds)
            .finish()
    }
}

impl DriverRegistry {
    /// Empty registry; every backend must be registered explicitly
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in sqlx and libSQL openers
    pub fn with_defaults() -> Self {
        let sqlx = Arc::new(SqlxOpener::new());
        Self::new()
            .with_opener(BackendKind::Postgres, sqlx.clone())
            .with_opener(BackendKind::MySql, sqlx.clone())
            .with_opener(BackendKind::Sqlite, sqlx)
            .with_opener(BackendKind::LibSql, LibSqlOpener::new())
    }

    /// Register an opener, replacing any previous one for the same family
    pub fn register<O>(&mut self, kind: BackendKind, opener: O) -> Option<Arc<dyn BackendOpener>>
    where
        O: BackendOpener + 'static,
    {
        self.openers.insert(kind, Arc::new(opener))
    }

    pub fn with_opener<O>(mut self, kind: BackendKind, opener: O) -> Self
    where
        O: BackendOpener + 'static,
    {
        self.register(kind, opener);
        self
    }

    /// Get the opener for a backend family
    pub fn opener(&self, kind: BackendKind) -> Result<Arc<dyn BackendOpener>, DriverError> {
        self.openers
            .get(&kind)
            .cloned()
            .ok_or(DriverError::NoOpener(kind))
    }

    pub fn supports(&self, kind: BackendKind) -> bool {
        self.openers.contains_key(&kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_every_backend() {
        let registry = DriverRegistry::with_defaults();
        for kind in BackendKind::ALL {
            assert!(registry.supports(kind), "missing opener for {}", kind);
        }
    }

    #[test]
    fn test_empty_registry_reports_missing_opener() {
        let registry = DriverRegistry::new();
        let err = registry.opener(BackendKind::Postgres).err().unwrap();
        assert!(matches!(err, DriverError::NoOpener(BackendKind::Postgres)));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_register_replaces_previous() {
        let mut registry = DriverRegistry::new();
        assert!(registry.register(BackendKind::Sqlite, SqlxOpener::new()).is_none());
        assert!(registry.register(BackendKind::Sqlite, SqlxOpener::new()).is_some());
        assert_eq!(format!("{:?}", registry), "DriverRegistry { backends: [\"sqlite\"] }");
    }
}
