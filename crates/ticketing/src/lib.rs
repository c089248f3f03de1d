//! Support tickets (event-sourced).

pub mod ticket;

pub use ticket::{
    AddTicketComment, AssignTicket, ChangeTicketPriority, ChangeTicketStatus, OpenTicket,
    TICKET_AGGREGATE, Ticket, TicketAssigned, TicketCommand, TicketComment, TicketCommented,
    TicketEvent, TicketId, TicketOpened, TicketPriority, TicketPriorityChanged, TicketStatus,
    TicketStatusChanged,
};
