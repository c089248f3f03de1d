use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use atelier_core::error::{normalize_code, required_text};
use atelier_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use atelier_events::Event;

use crate::third_party::ThirdPartyId;

pub const CONTACT_AGGREGATE: &str = "parties.contact";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContactId(pub AggregateId);

impl ContactId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ContactId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactProfile {
    #[serde(default)]
    pub civility: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    pub last_name: String,
    #[serde(default)]
    pub job_title: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_secondary: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub mobile: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub zip: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
}

impl ContactProfile {
    fn normalized(&self) -> Result<Self, DomainError> {
        let last_name = required_text(&self.last_name, "last name")?;
        for email in [&self.email, &self.email_secondary].into_iter().flatten() {
            if !email.contains('@') {
                return Err(DomainError::validation("email is not valid"));
            }
        }
        Ok(Self {
            last_name,
            civility: self.civility.as_ref().map(|c| c.trim().to_uppercase()),
            ..self.clone()
        })
    }

    pub fn display_name(&self) -> String {
        match self.first_name.as_deref() {
            Some(first) if !first.trim().is_empty() => format!("{} {}", first.trim(), self.last_name),
            _ => self.last_name.clone(),
        }
    }
}

/// Link between a contact and a third party, qualified by a dictionary link type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThirdPartyLink {
    pub third_party_id: ThirdPartyId,
    pub link_type: String,
}

/// Aggregate root: a person, optionally attached to third parties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    id: ContactId,
    tenant_id: Option<TenantId>,
    profile: ContactProfile,
    primary: bool,
    links: Vec<ThirdPartyLink>,
    deleted: bool,
    version: u64,
    created: bool,
}

impl Contact {
    pub fn empty(id: ContactId) -> Self {
        Self {
            id,
            tenant_id: None,
            profile: ContactProfile::default(),
            primary: false,
            links: Vec::new(),
            deleted: false,
            version: 0,
            created: false,
        }
    }

    pub fn profile(&self) -> &ContactProfile {
        &self.profile
    }

    pub fn is_primary(&self) -> bool {
        self.primary
    }

    pub fn links(&self) -> &[ThirdPartyLink] {
        &self.links
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }
}

impl AggregateRoot for Contact {
    type Id = ContactId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateContact {
    pub tenant_id: TenantId,
    pub contact_id: ContactId,
    pub profile: ContactProfile,
    pub primary: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateContact {
    pub tenant_id: TenantId,
    pub contact_id: ContactId,
    pub profile: ContactProfile,
    pub primary: Option<bool>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteContact {
    pub tenant_id: TenantId,
    pub contact_id: ContactId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkThirdParty {
    pub tenant_id: TenantId,
    pub contact_id: ContactId,
    pub third_party_id: ThirdPartyId,
    pub link_type: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlinkThirdParty {
    pub tenant_id: TenantId,
    pub contact_id: ContactId,
    pub third_party_id: ThirdPartyId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContactCommand {
    Create(CreateContact),
    Update(UpdateContact),
    Delete(DeleteContact),
    Link(LinkThirdParty),
    Unlink(UnlinkThirdParty),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactCreated {
    pub tenant_id: TenantId,
    pub contact_id: ContactId,
    pub profile: ContactProfile,
    pub primary: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactUpdated {
    pub tenant_id: TenantId,
    pub contact_id: ContactId,
    pub profile: ContactProfile,
    pub primary: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactDeleted {
    pub tenant_id: TenantId,
    pub contact_id: ContactId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThirdPartyLinked {
    pub tenant_id: TenantId,
    pub contact_id: ContactId,
    pub third_party_id: ThirdPartyId,
    pub link_type: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThirdPartyUnlinked {
    pub tenant_id: TenantId,
    pub contact_id: ContactId,
    pub third_party_id: ThirdPartyId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContactEvent {
    Created(ContactCreated),
    Updated(ContactUpdated),
    Deleted(ContactDeleted),
    Linked(ThirdPartyLinked),
    Unlinked(ThirdPartyUnlinked),
}

impl Event for ContactEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ContactEvent::Created(_) => "parties.contact.created",
            ContactEvent::Updated(_) => "parties.contact.updated",
            ContactEvent::Deleted(_) => "parties.contact.deleted",
            ContactEvent::Linked(_) => "parties.contact.third_party_linked",
            ContactEvent::Unlinked(_) => "parties.contact.third_party_unlinked",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ContactEvent::Created(e) => e.occurred_at,
            ContactEvent::Updated(e) => e.occurred_at,
            ContactEvent::Deleted(e) => e.occurred_at,
            ContactEvent::Linked(e) => e.occurred_at,
            ContactEvent::Unlinked(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Contact {
    type Command = ContactCommand;
    type Event = ContactEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ContactEvent::Created(e) => {
                self.id = e.contact_id;
                self.tenant_id = Some(e.tenant_id);
                self.profile = e.profile.clone();
                self.primary = e.primary;
                self.created = true;
            }
            ContactEvent::Updated(e) => {
                self.profile = e.profile.clone();
                self.primary = e.primary;
            }
            ContactEvent::Deleted(_) => self.deleted = true,
            ContactEvent::Linked(e) => self.links.push(ThirdPartyLink {
                third_party_id: e.third_party_id,
                link_type: e.link_type.clone(),
            }),
            ContactEvent::Unlinked(e) => self.links.retain(|l| l.third_party_id != e.third_party_id),
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ContactCommand::Create(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("contact already exists"));
                }
                Ok(vec![ContactEvent::Created(ContactCreated {
                    tenant_id: cmd.tenant_id,
                    contact_id: cmd.contact_id,
                    profile: cmd.profile.normalized()?,
                    primary: cmd.primary,
                    occurred_at: cmd.occurred_at,
                })])
            }
            ContactCommand::Update(cmd) => {
                self.ensure_writable(cmd.tenant_id, cmd.contact_id)?;
                Ok(vec![ContactEvent::Updated(ContactUpdated {
                    tenant_id: cmd.tenant_id,
                    contact_id: cmd.contact_id,
                    profile: cmd.profile.normalized()?,
                    primary: cmd.primary.unwrap_or(self.primary),
                    occurred_at: cmd.occurred_at,
                })])
            }
            ContactCommand::Delete(cmd) => {
                self.ensure_writable(cmd.tenant_id, cmd.contact_id)?;
                Ok(vec![ContactEvent::Deleted(ContactDeleted {
                    tenant_id: cmd.tenant_id,
                    contact_id: cmd.contact_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
            ContactCommand::Link(cmd) => {
                self.ensure_writable(cmd.tenant_id, cmd.contact_id)?;
                if self.links.iter().any(|l| l.third_party_id == cmd.third_party_id) {
                    return Err(DomainError::conflict("contact is already linked to this third party"));
                }
                Ok(vec![ContactEvent::Linked(ThirdPartyLinked {
                    tenant_id: cmd.tenant_id,
                    contact_id: cmd.contact_id,
                    third_party_id: cmd.third_party_id,
                    link_type: normalize_code(&cmd.link_type, "link type")?,
                    occurred_at: cmd.occurred_at,
                })])
            }
            ContactCommand::Unlink(cmd) => {
                self.ensure_writable(cmd.tenant_id, cmd.contact_id)?;
                if !self.links.iter().any(|l| l.third_party_id == cmd.third_party_id) {
                    return Err(DomainError::not_found());
                }
                Ok(vec![ContactEvent::Unlinked(ThirdPartyUnlinked {
                    tenant_id: cmd.tenant_id,
                    contact_id: cmd.contact_id,
                    third_party_id: cmd.third_party_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

impl Contact {
    fn ensure_writable(&self, tenant_id: TenantId, contact_id: ContactId) -> Result<(), DomainError> {
        if !self.created || self.deleted {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != contact_id {
            return Err(DomainError::invariant("contact_id mismatch"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_events::execute;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn created() -> (Contact, TenantId, ContactId) {
        let tenant_id = TenantId::new();
        let id = ContactId::new(AggregateId::new());
        let mut c = Contact::empty(id);
        execute(
            &mut c,
            &ContactCommand::Create(CreateContact {
                tenant_id,
                contact_id: id,
                profile: ContactProfile {
                    civility: Some("mme".to_string()),
                    first_name: Some("Claire".to_string()),
                    last_name: " Dubois ".to_string(),
                    email: Some("claire@dubois.fr".to_string()),
                    ..Default::default()
                },
                primary: true,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        (c, tenant_id, id)
    }

    fn link(tenant_id: TenantId, contact_id: ContactId, tp: ThirdPartyId) -> ContactCommand {
        ContactCommand::Link(LinkThirdParty {
            tenant_id,
            contact_id,
            third_party_id: tp,
            link_type: "salarie".to_string(),
            occurred_at: test_time(),
        })
    }

    #[test]
    fn create_normalises_profile() {
        let (c, _, _) = created();
        assert_eq!(c.profile().last_name, "Dubois");
        assert_eq!(c.profile().civility.as_deref(), Some("MME"));
        assert_eq!(c.profile().display_name(), "Claire Dubois");
        assert!(c.is_primary());
    }

    #[test]
    fn last_name_is_required() {
        let c = Contact::empty(ContactId::new(AggregateId::new()));
        let err = c
            .handle(&ContactCommand::Create(CreateContact {
                tenant_id: TenantId::new(),
                contact_id: ContactId::new(AggregateId::new()),
                profile: ContactProfile::default(),
                primary: false,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        match err {
            DomainError::Validation(msg) if msg.contains("last name") => {}
            other => panic!("Expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_link_conflicts_and_unlink_removes() {
        let (mut c, tenant_id, id) = created();
        let tp = ThirdPartyId::new(AggregateId::new());
        execute(&mut c, &link(tenant_id, id, tp)).unwrap();
        assert_eq!(c.links()[0].link_type, "SALARIE");

        assert!(matches!(c.handle(&link(tenant_id, id, tp)), Err(DomainError::Conflict(_))));

        execute(
            &mut c,
            &ContactCommand::Unlink(UnlinkThirdParty {
                tenant_id,
                contact_id: id,
                third_party_id: tp,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        assert!(c.links().is_empty());
    }

    #[test]
    fn deleted_contact_is_not_found() {
        let (mut c, tenant_id, id) = created();
        execute(
            &mut c,
            &ContactCommand::Delete(DeleteContact { tenant_id, contact_id: id, occurred_at: test_time() }),
        )
        .unwrap();
        let tp = ThirdPartyId::new(AggregateId::new());
        assert_eq!(c.handle(&link(tenant_id, id, tp)).unwrap_err(), DomainError::NotFound);
    }
}
