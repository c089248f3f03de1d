//! `atelier-core`: domain building blocks shared by every Atelier module.
//!
//! Nothing here performs IO: identifiers, the domain error model, the aggregate
//! contract and integer money arithmetic.

pub mod aggregate;
pub mod error;
pub mod id;
pub mod money;
pub mod numbering;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::{AggregateId, TenantId, UserId};
