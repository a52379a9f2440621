use std::any::TypeId;
use std::sync::{Arc, LazyLock, RwLock};

use hashbrown::HashMap;

use super::{Model, TableBuilder, TableModel};
use crate::error::Result;

static GLOBAL: LazyLock<Registry> = LazyLock::new(Registry::default);

/// Memoized table models keyed by record type.
#[derive(Default)]
pub struct Registry {
    tables: RwLock<HashMap<TypeId, Arc<TableModel>>>,
}

impl Registry {
    pub fn global() -> &'static Registry {
        &GLOBAL
    }

    /// Returns the table model for `M`, deriving it on first use.
    ///
    /// Derivation runs outside the lock, so concurrent first calls may both derive; the
    /// first insert wins and every caller gets that instance.
    pub fn resolve<M: Model>(&self) -> Result<Arc<TableModel>> {
        let id = TypeId::of::<M>();
        if let Some(table) = self
            .tables
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&id)
        {
            return Ok(Arc::clone(table));
        }

        let built = Arc::new(TableBuilder::<M>::build()?);
        let mut tables = self
            .tables
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(Arc::clone(tables.entry(id).or_insert(built)))
    }

    pub fn len(&self) -> usize {
        self.tables
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Resolves `M` through the global registry.
pub fn resolve<M: Model>() -> Result<Arc<TableModel>> {
    Registry::global().resolve::<M>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RelataError;

    #[derive(Debug, Clone, Default)]
    struct Account {
        id: i64,
        email: String,
        deleted_at: Option<chrono::DateTime<chrono::Utc>>,
    }

    impl Model for Account {
        fn describe(t: &mut TableBuilder<Self>) {
            t.column("id", |a| &a.id, |a| &mut a.id).pk();
            t.column("email", |a| &a.email, |a| &mut a.email);
            t.column("deleted_at", |a| &a.deleted_at, |a| &mut a.deleted_at)
                .soft_delete();
        }
    }

    #[derive(Debug, Clone, Default)]
    struct Broken {
        a: i32,
        b: i32,
    }

    impl Model for Broken {
        fn describe(t: &mut TableBuilder<Self>) {
            t.column("a", |r| &r.a, |r| &mut r.a);
            t.column("b", |r| &r.b, |r| &mut r.b).name("a");
        }
    }

    #[test]
    fn resolve_is_memoized() {
        let registry = Registry::default();
        let first = registry.resolve::<Account>().unwrap();
        let second = registry.resolve::<Account>().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);

        assert_eq!(first.name(), "accounts");
        assert_eq!(first.alias(), "account");
        assert_eq!(first.pk_indexes(), &[0]);
        assert_eq!(first.soft_delete_column().map(|c| c.name()), Some("deleted_at"));
    }

    #[derive(Debug, Clone, Default)]
    struct Flagged {
        id: i64,
        removed: Option<bool>,
    }

    impl Model for Flagged {
        fn describe(t: &mut TableBuilder<Self>) {
            t.column("id", |f| &f.id, |f| &mut f.id).pk();
            t.column("removed", |f| &f.removed, |f| &mut f.removed)
                .soft_delete();
        }
    }

    #[test]
    fn soft_delete_columns_must_hold_timestamps() {
        let err = Registry::default().resolve::<Flagged>().unwrap_err();
        assert!(matches!(err, RelataError::Schema(ref msg) if msg.contains("timestamp")));
    }

    #[test]
    fn duplicate_columns_are_rejected() {
        let err = Registry::default().resolve::<Broken>().unwrap_err();
        assert!(matches!(err, RelataError::Schema(ref msg) if msg.contains("twice")));
    }

    #[test]
    fn concurrent_first_resolution_agrees() {
        let registry = Arc::new(Registry::default());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.resolve::<Account>().unwrap())
            })
            .collect();
        let tables: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(tables.iter().all(|t| Arc::ptr_eq(t, &tables[0])));
    }
}
