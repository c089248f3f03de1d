//! Accounting module (double-entry ledger, event-sourced).
//!
//! Pure domain logic only: no IO, no HTTP, no persistence concerns.

pub mod ledger;

pub use ledger::{
    Account, AccountDeactivated, AccountOpened, AccountType, DeactivateAccount, EntryLine,
    EntryPosted, Journal, JournalEntry, JournalOpened, LEDGER_AGGREGATE, Ledger, LedgerCommand,
    LedgerEvent, LedgerId, OpenAccount, OpenJournal, PostEntry, account_balance,
};
