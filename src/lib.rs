pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::commands::{
    create_event_impl, create_events_impl, delete_events_impl, enable_event_impl,
    export_events_impl, import_events_impl, load_resource_impl, modify_event_impl,
    purge_archived_impl, reactivate_events_impl, redo_actions_impl, redo_impl,
    save_resource_impl, undo_actions_impl, undo_impl, CommandError, ExportResult, ImportResult,
    SessionContext,
};
pub use application::event_store::{EventStore, StoreError};
pub use application::rule_editor::{
    DayPosKind, EditField, RangeKind, RepeatPeriod, RuleEditor, ValidationError,
};
pub use application::undo::{
    ActionEntry, ExternalCalendarSync, ListKind, NoExternalSync, RestoreError, RestoreWarning,
    UndoLog,
};
pub use domain::event::{AlarmAction, AlarmEvent, CollectionId, EventCategory};
pub use domain::recurrence::{
    EndCondition, Feb29Policy, MonthDay, MonthPos, MonthSet, RecurrenceKind, RecurrenceRule,
    WeekOrdinal, WeekdaySet,
};
pub use infrastructure::calendar_store::{
    CalendarBackend, CalendarResourceService, InMemoryCalendarBackend, ResourceChange,
    SqliteCalendarBackend,
};
pub use infrastructure::error::InfraError;
pub use infrastructure::interchange::{
    decode_event, encode_event, InterchangeAction, InterchangeEvent, InterchangeRule,
};
