use std::collections::HashMap;
use std::hash::Hash;
use std::sync::RwLock;

use atelier_core::TenantId;

/// Tenant-isolated key/value store for disposable read models.
///
/// Every call names the tenant; there is no way to read across partitions.
/// Writes cannot fail: a lost projection row comes back on the next rebuild.
/// Records that events cannot rebuild go through `records::RecordStore`.
pub trait TenantStore<K, V>: Send + Sync {
    fn get(&self, tenant_id: TenantId, key: &K) -> Option<V>;
    fn upsert(&self, tenant_id: TenantId, key: K, value: V);
    /// Returns whether a value was present.
    fn remove(&self, tenant_id: TenantId, key: &K) -> bool;
    fn list(&self, tenant_id: TenantId) -> Vec<V>;
    /// Drop every record of a tenant (rebuild support).
    fn clear_tenant(&self, tenant_id: TenantId);
}

#[derive(Debug)]
pub struct InMemoryTenantStore<K, V> {
    inner: RwLock<HashMap<TenantId, HashMap<K, V>>>,
}

impl<K, V> InMemoryTenantStore<K, V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> Default for InMemoryTenantStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> TenantStore<K, V> for InMemoryTenantStore<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, tenant_id: TenantId, key: &K) -> Option<V> {
        let map = self.inner.read().ok()?;
        map.get(&tenant_id)?.get(key).cloned()
    }

    fn upsert(&self, tenant_id: TenantId, key: K, value: V) {
        if let Ok(mut map) = self.inner.write() {
            map.entry(tenant_id).or_default().insert(key, value);
        }
    }

    fn remove(&self, tenant_id: TenantId, key: &K) -> bool {
        match self.inner.write() {
            Ok(mut map) => map
                .get_mut(&tenant_id)
                .and_then(|records| records.remove(key))
                .is_some(),
            Err(_) => false,
        }
    }

    fn list(&self, tenant_id: TenantId) -> Vec<V> {
        let map = match self.inner.read() {
            Ok(m) => m,
            Err(_) => return vec![],
        };
        map.get(&tenant_id)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default()
    }

    fn clear_tenant(&self, tenant_id: TenantId) {
        if let Ok(mut map) = self.inner.write() {
            map.remove(&tenant_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partitions_do_not_overlap() {
        let store = InMemoryTenantStore::<String, u32>::new();
        let (a, b) = (TenantId::new(), TenantId::new());
        store.upsert(a, "k".to_string(), 1);
        store.upsert(b, "k".to_string(), 2);

        assert_eq!(store.get(a, &"k".to_string()), Some(1));
        assert_eq!(store.get(b, &"k".to_string()), Some(2));

        assert!(store.remove(a, &"k".to_string()));
        assert!(!store.remove(a, &"k".to_string()));
        assert_eq!(store.list(b), vec![2]);

        store.clear_tenant(b);
        assert!(store.list(b).is_empty());
    }
}
