//! Parties domain module: third parties (customers, suppliers, prospects) and the
//! people working for them, event-sourced. Pure domain logic; uniqueness of codes
//! across the tenant is checked by the caller against the read model.

pub mod contact;
pub mod third_party;

pub use contact::{
    CONTACT_AGGREGATE, Contact, ContactCommand, ContactCreated, ContactDeleted, ContactEvent,
    ContactId, ContactProfile, ContactUpdated, CreateContact, DeleteContact, LinkThirdParty,
    ThirdPartyLink, ThirdPartyLinked, ThirdPartyUnlinked, UnlinkThirdParty, UpdateContact,
};
pub use third_party::{
    DEFAULT_PAYMENT_TERMS_DAYS, RegisterThirdParty, THIRD_PARTY_AGGREGATE, ThirdParty,
    ThirdPartyCommand, ThirdPartyDetails, ThirdPartyEvent, ThirdPartyId, ThirdPartyKind,
    ThirdPartyRef, ThirdPartyRegistered, ThirdPartyStatus, ThirdPartyStatusChanged,
    ThirdPartyUpdated, UpdateThirdParty,
};
