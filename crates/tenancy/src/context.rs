//! Task-local "current tenant".
//!
//! HTTP requests and import runs execute inside [`CurrentTenant::scope`]; record
//! lifecycles read it to stamp and check ownership. The value disappears when the
//! scope ends, so it never leaks to the next request served by the same worker.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use atelier_core::TenantId;

tokio::task_local! {
    static CURRENT_TENANT: TenantId;
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TenantContextError {
    #[error("no tenant in the current context")]
    Missing,

    #[error("tenant mismatch (context: {expected}, record: {found})")]
    Mismatch { expected: TenantId, found: TenantId },
}

pub struct CurrentTenant;

impl CurrentTenant {
    /// Run `fut` with `tenant` as the current tenant. Nested scopes shadow the
    /// outer one and restore it on exit.
    pub async fn scope<F>(tenant: TenantId, fut: F) -> F::Output
    where
        F: Future,
    {
        CURRENT_TENANT.scope(tenant, fut).await
    }

    /// Synchronous variant for worker threads and tests.
    pub fn sync_scope<R>(tenant: TenantId, f: impl FnOnce() -> R) -> R {
        CURRENT_TENANT.sync_scope(tenant, f)
    }

    pub fn get() -> Option<TenantId> {
        CURRENT_TENANT.try_with(|t| *t).ok()
    }

    pub fn require() -> Result<TenantId, TenantContextError> {
        Self::get().ok_or(TenantContextError::Missing)
    }

    /// Fails unless a context is set and equals `tenant`.
    pub fn ensure(tenant: TenantId) -> Result<(), TenantContextError> {
        let current = Self::require()?;
        if current == tenant {
            Ok(())
        } else {
            Err(TenantContextError::Mismatch {
                expected: current,
                found: tenant,
            })
        }
    }
}

/// A tenant-owned record with lifecycle timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stamped<T> {
    pub tenant_id: TenantId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub record: T,
}

impl<T> Stamped<T> {
    /// Pre-persist hook: owner taken from the current context.
    pub fn on_create(record: T, now: DateTime<Utc>) -> Result<Self, TenantContextError> {
        let tenant_id = CurrentTenant::require()?;
        Ok(Self {
            tenant_id,
            created_at: now,
            updated_at: now,
            record,
        })
    }

    /// Pre-update hook: the record must belong to the current tenant.
    pub fn on_update(&mut self, record: T, now: DateTime<Utc>) -> Result<(), TenantContextError> {
        CurrentTenant::ensure(self.tenant_id)?;
        self.record = record;
        self.updated_at = now;
        Ok(())
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-05-04T10:00:00Z").unwrap().with_timezone(&Utc)
    }

    #[test]
    fn no_context_outside_scope() {
        assert_eq!(CurrentTenant::get(), None);
        assert_eq!(CurrentTenant::require(), Err(TenantContextError::Missing));
    }

    #[test]
    fn sync_scope_sets_and_clears() {
        let t = TenantId::new();
        CurrentTenant::sync_scope(t, || {
            assert_eq!(CurrentTenant::get(), Some(t));
            assert!(CurrentTenant::ensure(t).is_ok());
        });
        assert_eq!(CurrentTenant::get(), None);
    }

    #[tokio::test]
    async fn nested_scope_restores_outer_tenant() {
        let outer = TenantId::new();
        let inner = TenantId::new();
        CurrentTenant::scope(outer, async move {
            CurrentTenant::scope(inner, async move {
                assert_eq!(CurrentTenant::get(), Some(inner));
            })
            .await;
            assert_eq!(CurrentTenant::get(), Some(outer));
        })
        .await;
    }

    #[test]
    fn stamped_records_take_tenant_from_context() {
        let t = TenantId::new();
        let mut rec = CurrentTenant::sync_scope(t, || Stamped::on_create("note", test_time())).unwrap();
        assert_eq!(rec.tenant_id, t);

        let other = TenantId::new();
        let err = CurrentTenant::sync_scope(other, || rec.on_update("edited", test_time()));
        assert!(matches!(err, Err(TenantContextError::Mismatch { .. })));
        assert_eq!(rec.record, "note");

        assert!(Stamped::on_create("orphan", test_time()).is_err());
    }
}
