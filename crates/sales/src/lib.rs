//! Sales domain module (event-sourced): proposals and customer orders.
//!
//! Pure business rules. Numbering, persistence and HTTP live in `infra`/`api`.

pub mod document;
pub mod order;
pub mod proposal;

pub use document::{DocumentLine, DocumentTotals, LineInput, next_line_no, price_lines};
pub use order::{
    CreateOrderFromProposal, CreateSalesOrder, ImportSalesOrder, OrderStatus, OrderTransition,
    SALES_ORDER_AGGREGATE, SalesOrder, SalesOrderCommand, SalesOrderCreated, SalesOrderEvent,
    SalesOrderId, SalesOrderStatusChanged,
};
pub use proposal::{
    AddProposalLine, CreateProposal, ImportProposal, MarkProposalConverted, PROPOSAL_AGGREGATE,
    Proposal, ProposalCommand, ProposalConverted, ProposalCreated, ProposalEvent,
    ProposalHeaderUpdated, ProposalId, ProposalImported, ProposalLinesChanged, ProposalSnapshot,
    ProposalStatus, ProposalStatusChanged, ProposalTransition, RemoveProposalLine,
    SetProposalDiscount, UpdateProposalHeader,
};
