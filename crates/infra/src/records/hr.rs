use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use atelier_core::{TenantId, UserId};
use atelier_hr::{JobPosition, LeaveType, default_leave_types};
use atelier_tenancy::{CurrentTenant, Stamped};

use super::{RecordBackend, RecordResult, Records};

/// Who approves a user's leave requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveValidator {
    pub user_id: UserId,
    pub validator_id: UserId,
}

/// Job positions, leave types and leave validators.
#[derive(Clone)]
pub struct HrReference {
    positions: Records<Stamped<JobPosition>>,
    leave_types: Records<Stamped<LeaveType>>,
    validators: Records<Stamped<LeaveValidator>>,
}

impl HrReference {
    pub fn new(backend: &RecordBackend) -> Self {
        Self {
            positions: backend.store("hr_positions"),
            leave_types: backend.store("hr_leave_types"),
            validators: backend.store("hr_leave_validators"),
        }
    }

    pub fn save_position(&self, tenant_id: TenantId, position: JobPosition, now: DateTime<Utc>) -> RecordResult<()> {
        CurrentTenant::ensure(tenant_id)?;
        let key = position.code.clone();
        let stamped = match self.positions.get(tenant_id, &key) {
            Some(mut existing) => {
                existing.on_update(position, now)?;
                existing
            }
            None => Stamped::on_create(position, now)?,
        };
        self.positions.upsert(tenant_id, key, stamped)?;
        Ok(())
    }

    pub fn position(&self, tenant_id: TenantId, code: &str) -> Option<JobPosition> {
        self.positions
            .get(tenant_id, &code.trim().to_uppercase())
            .map(|s| s.record)
    }

    pub fn positions(&self, tenant_id: TenantId) -> Vec<JobPosition> {
        let mut all: Vec<_> = self.positions.list(tenant_id).into_iter().map(|s| s.record).collect();
        all.sort_by(|a, b| a.code.cmp(&b.code));
        all
    }

    pub fn save_leave_type(&self, tenant_id: TenantId, leave_type: LeaveType, now: DateTime<Utc>) -> RecordResult<()> {
        CurrentTenant::ensure(tenant_id)?;
        let key = leave_type.code.clone();
        let stamped = match self.leave_types.get(tenant_id, &key) {
            Some(mut existing) => {
                existing.on_update(leave_type, now)?;
                existing
            }
            None => Stamped::on_create(leave_type, now)?,
        };
        self.leave_types.upsert(tenant_id, key, stamped)?;
        Ok(())
    }

    /// Seeds the default types the first time a tenant asks.
    pub fn leave_types(&self, tenant_id: TenantId, now: DateTime<Utc>) -> RecordResult<Vec<LeaveType>> {
        if self.leave_types.list(tenant_id).is_empty() {
            for leave_type in default_leave_types() {
                self.save_leave_type(tenant_id, leave_type, now)?;
            }
        }
        let mut all: Vec<_> = self.leave_types.list(tenant_id).into_iter().map(|s| s.record).collect();
        all.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(all)
    }

    pub fn leave_type(&self, tenant_id: TenantId, code: &str) -> Option<LeaveType> {
        self.leave_types
            .get(tenant_id, &code.trim().to_uppercase())
            .map(|s| s.record)
    }

    pub fn set_validator(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        validator_id: UserId,
        now: DateTime<Utc>,
    ) -> RecordResult<()> {
        CurrentTenant::ensure(tenant_id)?;
        let setting = LeaveValidator { user_id, validator_id };
        let stamped = match self.validators.get(tenant_id, &user_id.to_string()) {
            Some(mut existing) => {
                existing.on_update(setting, now)?;
                existing
            }
            None => Stamped::on_create(setting, now)?,
        };
        self.validators.upsert(tenant_id, user_id.to_string(), stamped)?;
        Ok(())
    }

    pub fn validator_for(&self, tenant_id: TenantId, user_id: UserId) -> Option<UserId> {
        self.validators
            .get(tenant_id, &user_id.to_string())
            .map(|s| s.record.validator_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leave_types_are_seeded_once() {
        let hr = HrReference::new(&RecordBackend::Memory);
        let t = TenantId::new();
        CurrentTenant::sync_scope(t, || {
            assert_eq!(hr.leave_types(t, Utc::now()).unwrap().len(), 4);
            hr.save_leave_type(t, LeaveType::new("remote", "Remote day", true).unwrap(), Utc::now())
                .unwrap();
            let codes: Vec<_> = hr.leave_types(t, Utc::now()).unwrap().into_iter().map(|l| l.code).collect();
            assert_eq!(codes, ["CP", "REMOTE", "RTT", "SICK", "UNPAID"]);
        });
    }

    #[test]
    fn validators_are_per_user() {
        let hr = HrReference::new(&RecordBackend::Memory);
        let t = TenantId::new();
        let (alice, boss) = (UserId::new(), UserId::new());
        CurrentTenant::sync_scope(t, || hr.set_validator(t, alice, boss, Utc::now())).unwrap();

        assert_eq!(hr.validator_for(t, alice), Some(boss));
        assert_eq!(hr.validator_for(t, boss), None);
        assert_eq!(hr.validator_for(TenantId::new(), alice), None);
    }
}
