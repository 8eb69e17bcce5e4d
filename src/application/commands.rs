use crate::application::bootstrap::bootstrap_workspace;
use crate::application::event_store::{EventStore, StoreError};
use crate::application::rule_editor::{RepeatPeriod, RuleEditor};
use crate::application::undo::{
    ActionEntry, ExternalCalendarSync, ListKind, NoExternalSync, RestoreError, RestoreWarning,
    UndoLog,
};
use crate::domain::event::{AlarmEvent, CollectionId, EventCategory};
use crate::domain::recurrence::Feb29Policy;
use crate::infrastructure::calendar_store::{CalendarBackend, CalendarResourceService};
use crate::infrastructure::config::{
    read_default_feb29_policy, read_default_recur_period, read_start_of_day, read_timezone,
    read_undo_history_size,
};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::interchange::{decode_event, encode_event, InterchangeEvent};
use chrono::{NaiveDateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{}", .0.message())]
    Restore(RestoreError),
    #[error(transparent)]
    Infra(#[from] InfraError),
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportResult {
    pub ids: Vec<String>,
    pub failed: usize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExportResult {
    pub events: Vec<InterchangeEvent>,
    pub failed: usize,
}

/// Owns the session's event store, undo log and external-sync collaborator.
/// All command entry points operate on one of these; there is no global
/// shared state.
pub struct SessionContext {
    store: EventStore,
    undo: UndoLog,
    external: Box<dyn ExternalCalendarSync + Send>,
    database_path: Option<PathBuf>,
    default_recur_period: RepeatPeriod,
    default_feb29_policy: Feb29Policy,
    update_depth: u32,
    update_save_pending: bool,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionContext {
    pub fn new() -> Self {
        Self {
            store: EventStore::resources(),
            undo: UndoLog::new(),
            external: Box::new(NoExternalSync),
            database_path: None,
            default_recur_period: RepeatPeriod::None,
            default_feb29_policy: Feb29Policy::None,
            update_depth: 0,
            update_save_pending: false,
        }
    }

    /// Build a session from a workspace directory: directories and default
    /// configs are created as needed, and the store follows the configured
    /// timezone, start-of-day and undo bound.
    pub fn from_workspace(workspace_root: &Path) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(workspace_root)?;
        let config_dir = workspace_root.join("config");
        let timezone = read_timezone(&config_dir)?;
        let start_of_day = read_start_of_day(&config_dir)?;
        let undo_bound = read_undo_history_size(&config_dir)?;
        let default_recur_period = read_default_recur_period(&config_dir)?;
        let default_feb29_policy = read_default_feb29_policy(&config_dir)?;

        let store = EventStore::resources()
            .with_start_of_day(start_of_day)
            .with_now_provider(Arc::new(move || {
                Utc::now().with_timezone(&timezone).naive_local()
            }));
        Ok(Self {
            store,
            undo: UndoLog::new().with_bound(undo_bound),
            external: Box::new(NoExternalSync),
            database_path: Some(bootstrap.database_path),
            default_recur_period,
            default_feb29_policy,
            update_depth: 0,
            update_save_pending: false,
        })
    }

    /// Flag the start of a group of calendar update calls, so one deferred
    /// save covers the whole group.
    pub fn start_update(&mut self) {
        self.update_depth += 1;
    }

    /// Flag the end of an update group. Returns true when a save deferred
    /// during the group is now due.
    pub fn end_update(&mut self) -> bool {
        if self.update_depth > 0 {
            self.update_depth -= 1;
        }
        if self.update_depth == 0 && self.update_save_pending {
            self.update_save_pending = false;
            return true;
        }
        false
    }

    /// Ask for the backing store to be saved. Returns true when the save
    /// should happen now; inside an update group it is deferred until
    /// `end_update`.
    pub fn request_save(&mut self) -> bool {
        if self.update_depth > 0 {
            self.update_save_pending = true;
            false
        } else {
            true
        }
    }

    pub fn with_external(mut self, external: Box<dyn ExternalCalendarSync + Send>) -> Self {
        self.external = external;
        self
    }

    pub fn with_store(mut self, store: EventStore) -> Self {
        self.store = store;
        self
    }

    pub fn store(&self) -> &EventStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut EventStore {
        &mut self.store
    }

    pub fn undo_log(&self) -> &UndoLog {
        &self.undo
    }

    pub fn database_path(&self) -> Option<&Path> {
        self.database_path.as_deref()
    }

    /// New rule editor seeded with the configured defaults, for starting or
    /// resuming an edit dialog.
    pub fn new_rule_editor(&self, start: NaiveDateTime) -> RuleEditor {
        RuleEditor::new(start, self.default_recur_period, self.default_feb29_policy)
    }
}

pub fn create_event_impl(
    ctx: &mut SessionContext,
    event: AlarmEvent,
    collection: CollectionId,
    use_existing_id: bool,
) -> Result<String, CommandError> {
    event.validate().map_err(CommandError::Validation)?;
    let id = ctx.store.add_event(event, collection, use_existing_id)?;
    let stored = ctx
        .store
        .event(collection, &id)
        .cloned()
        .ok_or(StoreError::NotFound(id.clone()))?;
    if !ctx.external.event_added(&stored) {
        warn!(%id, "external calendar rejected added event");
    }
    ctx.undo.record_add(&stored, None);
    Ok(id)
}

/// Create a batch of events as one user-visible action. Events which fail to
/// add are skipped; the ones that were stored are recorded as a single undo
/// entry.
pub fn create_events_impl(
    ctx: &mut SessionContext,
    events: Vec<AlarmEvent>,
    collection: CollectionId,
    name: Option<String>,
) -> Result<Vec<String>, CommandError> {
    let mut stored = Vec::new();
    for event in events {
        if let Err(failure) = event.validate() {
            warn!(%failure, "skipping invalid event in batch create");
            continue;
        }
        match ctx.store.add_event(event, collection, false) {
            Ok(id) => {
                if let Some(added) = ctx.store.event(collection, &id).cloned() {
                    if !ctx.external.event_added(&added) {
                        warn!(%id, "external calendar rejected added event");
                    }
                    stored.push(added);
                }
            }
            Err(failure) => warn!(%failure, "skipping event which failed to add"),
        }
    }
    ctx.undo.record_adds(&stored, name);
    Ok(stored.into_iter().map(|event| event.id).collect())
}

/// Modify an event under a new identity. The pre-edit snapshot feeds the
/// undo log, and any redo entries for this alarm become invalid.
pub fn modify_event_impl(
    ctx: &mut SessionContext,
    collection: CollectionId,
    old_id: &str,
    new_event: AlarmEvent,
) -> Result<String, CommandError> {
    new_event.validate().map_err(CommandError::Validation)?;
    let old_event = ctx
        .store
        .event(collection, old_id)
        .cloned()
        .ok_or_else(|| StoreError::NotFound(old_id.to_string()))?;
    let new_id = ctx.store.modify_event(collection, old_id, new_event)?;
    let stored = ctx
        .store
        .event(collection, &new_id)
        .cloned()
        .ok_or(StoreError::NotFound(new_id.clone()))?;
    if !ctx.external.event_updated(&stored) {
        warn!(id = %new_id, "external calendar rejected modified event");
    }
    ctx.undo.record_edit(&old_event, &stored);
    Ok(new_id)
}

/// Enable or disable an alarm in place. Not an undoable action.
pub fn enable_event_impl(
    ctx: &mut SessionContext,
    collection: CollectionId,
    id: &str,
    enabled: bool,
) -> Result<(), CommandError> {
    let mut event = ctx
        .store
        .event(collection, id)
        .cloned()
        .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
    if event.enabled == enabled {
        return Ok(());
    }
    event.enabled = enabled;
    ctx.store.update_event_in_place(event)?;
    Ok(())
}

/// Delete a batch of events as one user-visible action. Active alarms which
/// have already triggered are moved to the expired calendar instead of being
/// discarded.
pub fn delete_events_impl(
    ctx: &mut SessionContext,
    keys: &[(CollectionId, String)],
    name: Option<String>,
) -> Result<usize, CommandError> {
    let mut snapshots = Vec::new();
    for (collection, id) in keys {
        let Some(snapshot) = ctx.store.event(*collection, id).cloned() else {
            warn!(%id, "event to delete not found");
            continue;
        };
        if ctx.store.delete_event(*collection, id).is_none() {
            continue;
        }
        if snapshot.category == EventCategory::Active && snapshot.to_be_archived {
            let mut archived = snapshot.clone();
            archived.category = EventCategory::Expired;
            if let Err(failure) = ctx.store.add_event(archived, *collection, true) {
                warn!(%id, %failure, "failed to archive triggered alarm");
            }
        }
        if !ctx.external.event_deleted(id) {
            warn!(%id, "external calendar rejected deletion");
        }
        snapshots.push(snapshot);
    }
    ctx.undo.record_deletes(&snapshots, name);
    Ok(snapshots.len())
}

/// Bring archived/expired alarms back to the active calendar as one
/// user-visible action.
pub fn reactivate_events_impl(
    ctx: &mut SessionContext,
    keys: &[(CollectionId, String)],
    name: Option<String>,
) -> Result<usize, CommandError> {
    let mut reactivated = Vec::new();
    for (collection, id) in keys {
        let Some(snapshot) = ctx.store.event(*collection, id).cloned() else {
            warn!(%id, "event to reactivate not found");
            continue;
        };
        if !matches!(
            snapshot.category,
            EventCategory::Archived | EventCategory::Expired
        ) {
            warn!(%id, category = snapshot.category.as_str(), "not an archived alarm");
            continue;
        }
        let _ = ctx.store.delete_event(*collection, id);
        let mut active = snapshot;
        active.category = EventCategory::Active;
        active.to_be_archived = true;
        match ctx.store.add_event(active, *collection, true) {
            Ok(new_id) => {
                if let Some(event) = ctx.store.event(*collection, &new_id).cloned() {
                    if !ctx.external.event_added(&event) {
                        warn!(id = %new_id, "external calendar rejected reactivated event");
                    }
                    reactivated.push(event);
                }
            }
            Err(failure) => warn!(%id, %failure, "failed to reactivate alarm"),
        }
    }
    ctx.undo.record_reactivates(&reactivated, name);
    Ok(reactivated.len())
}

/// Undo the given item (or the most recent one). Warnings are non-fatal
/// external-sync notices for the user.
pub fn undo_impl(
    ctx: &mut SessionContext,
    item_id: Option<u32>,
) -> Result<Vec<RestoreWarning>, CommandError> {
    restore_impl(ctx, ListKind::Undo, item_id)
}

pub fn redo_impl(
    ctx: &mut SessionContext,
    item_id: Option<u32>,
) -> Result<Vec<RestoreWarning>, CommandError> {
    restore_impl(ctx, ListKind::Redo, item_id)
}

fn restore_impl(
    ctx: &mut SessionContext,
    list: ListKind,
    item_id: Option<u32>,
) -> Result<Vec<RestoreWarning>, CommandError> {
    let Some(item_id) = item_id.or_else(|| ctx.undo.latest_item_id(list)) else {
        return Ok(Vec::new());
    };
    ctx.undo
        .restore(list, item_id, &mut ctx.store, ctx.external.as_mut())
        .map_err(CommandError::Restore)
}

pub fn undo_actions_impl(ctx: &SessionContext) -> Vec<ActionEntry> {
    ctx.undo.list_actions(ListKind::Undo)
}

pub fn redo_actions_impl(ctx: &SessionContext) -> Vec<ActionEntry> {
    ctx.undo.list_actions(ListKind::Redo)
}

/// Remove all archived/expired alarms from a collection. Not undoable.
pub fn purge_archived_impl(ctx: &mut SessionContext, collection: CollectionId) -> usize {
    let ids: Vec<String> = ctx
        .store
        .collection_events(collection)
        .into_iter()
        .filter(|event| {
            matches!(
                event.category,
                EventCategory::Archived | EventCategory::Expired
            )
        })
        .map(|event| event.id.clone())
        .collect();
    let mut purged = 0;
    for id in ids {
        if ctx.store.delete_event(collection, &id).is_some() {
            purged += 1;
        }
    }
    purged
}

/// Import event snapshots from an external calendar. Every imported event
/// gets a fresh unique id; templates without a name are imported as active
/// alarms.
pub fn import_events_impl(
    ctx: &mut SessionContext,
    snapshots: &[InterchangeEvent],
    collection: CollectionId,
) -> Result<ImportResult, CommandError> {
    let mut result = ImportResult::default();
    let mut imported = Vec::new();
    for snapshot in snapshots {
        let mut event = match decode_event(snapshot) {
            Ok(event) => event,
            Err(failure) => {
                warn!(uid = %snapshot.uid, %failure, "skipping unusable import");
                result.failed += 1;
                continue;
            }
        };
        if event.category == EventCategory::Template
            && event
                .template_name
                .as_deref()
                .map(str::trim)
                .unwrap_or_default()
                .is_empty()
        {
            event.category = EventCategory::Active;
        }
        event.id.clear();
        match ctx.store.add_event(event, collection, false) {
            Ok(id) => {
                if let Some(added) = ctx.store.event(collection, &id).cloned() {
                    imported.push(added);
                }
                result.ids.push(id);
            }
            Err(failure) => {
                warn!(uid = %snapshot.uid, %failure, "failed to import event");
                result.failed += 1;
            }
        }
    }
    ctx.undo.record_adds(&imported, Some("Import alarms".to_string()));
    Ok(result)
}

/// Populate a collection from a backing calendar resource. Stored events
/// keep their ids; unusable ones are skipped. Loading is not undoable.
pub async fn load_resource_impl<B>(
    ctx: &mut SessionContext,
    service: &CalendarResourceService<B>,
    resource: &str,
    collection: CollectionId,
) -> Result<usize, CommandError>
where
    B: CalendarBackend,
{
    let snapshots = service.load(resource).await?;
    let mut loaded = 0;
    for snapshot in &snapshots {
        match decode_event(snapshot) {
            Ok(event) => match ctx.store.add_event(event, collection, true) {
                Ok(_) => loaded += 1,
                Err(failure) => {
                    warn!(uid = %snapshot.uid, %failure, "skipping stored event")
                }
            },
            Err(failure) => warn!(uid = %snapshot.uid, %failure, "skipping unusable stored event"),
        }
    }
    Ok(loaded)
}

/// Write a collection's events out to a backing calendar resource.
pub async fn save_resource_impl<B>(
    ctx: &SessionContext,
    service: &CalendarResourceService<B>,
    resource: &str,
    collection: CollectionId,
) -> Result<usize, CommandError>
where
    B: CalendarBackend,
{
    let snapshots: Vec<InterchangeEvent> = ctx
        .store
        .collection_events(collection)
        .into_iter()
        .map(encode_event)
        .collect();
    service.save(resource, &snapshots).await?;
    Ok(snapshots.len())
}

/// Export event snapshots for an external calendar. Missing events are
/// counted but do not abort the batch.
pub fn export_events_impl(
    ctx: &SessionContext,
    keys: &[(CollectionId, String)],
) -> ExportResult {
    let mut result = ExportResult::default();
    for (collection, id) in keys {
        match ctx.store.event(*collection, id) {
            Some(event) => result.events.push(encode_event(event)),
            None => {
                warn!(%id, "event to export not found");
                result.failed += 1;
            }
        }
    }
    result
}
