use atelier_core::TenantId;

use crate::EventEnvelope;

/// Messages that belong to one tenant; workers use it to drop foreign traffic.
pub trait TenantScoped {
    fn tenant_id(&self) -> TenantId;
}

impl<E> TenantScoped for EventEnvelope<E> {
    fn tenant_id(&self) -> TenantId {
        self.tenant_id()
    }
}
