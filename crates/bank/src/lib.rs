//! Bank accounts and their movements (event-sourced).

pub mod account;

pub use account::{
    BANK_ACCOUNT_AGGREGATE, BankAccount, BankAccountClosed, BankAccountCommand, BankAccountEvent,
    BankAccountId, BankAccountOpened, CloseBankAccount, DEFAULT_CURRENCY, Movement,
    MovementRecorded, OpenBankAccount, RecordMovement,
};
