//! Agenda: meetings, calls and reminders linked to third parties.

pub mod event;

pub use event::{
    AGENDA_EVENT_AGGREGATE, AgendaCommand, AgendaEvent, AgendaEventEvent, AgendaEventId,
    AgendaEventKind, AgendaEventStatus, Attendee, AttendeeChanged, AttendeeStatus, CloseEvent,
    EventClosed, EventDetails, EventScheduled, EventUpdated, InviteAttendee, RespondInvitation,
    ScheduleEvent, UpdateEvent, upcoming_until,
};
