//! Calendar input: the event snapshot, slot classification and the local
//! calendar store written back to.

mod slots;
mod snapshot;
mod store;

pub use slots::{classify_slots, CalendarSlot, FocusMatch, FocusRule, SlotLabel, WorkWindow};
pub use snapshot::{CalendarEvent, JsonSnapshotStore, Snapshot, SnapshotSource};
pub use store::JsonCalendarStore;
