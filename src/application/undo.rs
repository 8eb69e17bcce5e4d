use crate::application::event_store::EventStore;
use crate::domain::event::{AlarmEvent, CollectionId, EventCategory};
use tracing::debug;

pub const DEFAULT_HISTORY_BOUND: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    Undo,
    Redo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndoOperation {
    Add,
    Edit,
    Delete,
    Reactivate,
    Deactivate,
    Multi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultiKind {
    Adds,
    Deletes,
    Reactivates,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreError {
    NotFound,
    CreateFailed,
    TemplateFailed,
    ExpiredReactivationFailed,
    ProgramError,
}

impl RestoreError {
    pub fn message(self) -> &'static str {
        match self {
            Self::NotFound => "Alarm not found",
            Self::CreateFailed => "Error recreating alarm",
            Self::TemplateFailed => "Error recreating alarm template",
            Self::ExpiredReactivationFailed => "Cannot reactivate expired alarm",
            Self::ProgramError => "Program error",
        }
    }
}

/// Non-fatal warnings from the external calendar-interchange collaborator.
/// They are reported to the user but never fail the local restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreWarning {
    ExternalAddFailed,
    ExternalModifyFailed,
    ExternalDeleteFailed,
}

/// External calendar collaborator kept in step with local mutations.
/// A `false` return surfaces as a warning, not an error.
pub trait ExternalCalendarSync {
    fn event_added(&mut self, event: &AlarmEvent) -> bool;
    fn event_updated(&mut self, event: &AlarmEvent) -> bool;
    fn event_deleted(&mut self, event_id: &str) -> bool;
}

pub struct NoExternalSync;

impl ExternalCalendarSync for NoExternalSync {
    fn event_added(&mut self, _event: &AlarmEvent) -> bool {
        true
    }

    fn event_updated(&mut self, _event: &AlarmEvent) -> bool {
        true
    }

    fn event_deleted(&mut self, _event_id: &str) -> bool {
        true
    }
}

#[derive(Debug, Clone, PartialEq)]
enum UndoKind {
    Add {
        event_id: String,
        collection: CollectionId,
        description: String,
    },
    Edit {
        old_event: Box<AlarmEvent>,
        new_id: String,
        description: String,
    },
    Delete {
        event: Box<AlarmEvent>,
    },
    Reactivate {
        event_id: String,
        collection: CollectionId,
        description: String,
    },
    Deactivate {
        event: Box<AlarmEvent>,
    },
    Multi {
        kind: MultiKind,
        children: Vec<UndoItem>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct UndoItem {
    id: u32,
    name: Option<String>,
    category: EventCategory,
    kind: UndoKind,
}

impl UndoItem {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn operation(&self) -> UndoOperation {
        match self.kind {
            UndoKind::Add { .. } => UndoOperation::Add,
            UndoKind::Edit { .. } => UndoOperation::Edit,
            UndoKind::Delete { .. } => UndoOperation::Delete,
            UndoKind::Reactivate { .. } => UndoOperation::Reactivate,
            UndoKind::Deactivate { .. } => UndoOperation::Deactivate,
            UndoKind::Multi { .. } => UndoOperation::Multi,
        }
    }

    pub fn event_id(&self) -> &str {
        match &self.kind {
            UndoKind::Add { event_id, .. } | UndoKind::Reactivate { event_id, .. } => event_id,
            UndoKind::Edit { new_id, .. } => new_id,
            UndoKind::Delete { event } | UndoKind::Deactivate { event } => &event.id,
            UndoKind::Multi { .. } => "",
        }
    }

    pub fn old_event_id(&self) -> &str {
        match &self.kind {
            UndoKind::Edit { old_event, .. } => &old_event.id,
            UndoKind::Delete { event } | UndoKind::Deactivate { event } => &event.id,
            _ => "",
        }
    }

    pub fn description(&self) -> String {
        match &self.kind {
            UndoKind::Add { description, .. }
            | UndoKind::Edit { description, .. }
            | UndoKind::Reactivate { description, .. } => description.clone(),
            UndoKind::Delete { event } | UndoKind::Deactivate { event } => event.summary(),
            UndoKind::Multi { .. } => String::new(),
        }
    }

    pub fn action_text(&self, list: ListKind) -> String {
        if let Some(name) = &self.name {
            if !name.is_empty() {
                return name.clone();
            }
        }
        self.default_action_text(list)
    }

    fn default_action_text(&self, list: ListKind) -> String {
        match &self.kind {
            UndoKind::Add { .. } => {
                add_delete_action_text(self.category, list == ListKind::Undo)
            }
            UndoKind::Delete { .. } => {
                add_delete_action_text(self.category, list == ListKind::Redo)
            }
            UndoKind::Edit { .. } => match self.category {
                EventCategory::Active => "Edit alarm".to_string(),
                EventCategory::Template => "Edit template".to_string(),
                _ => String::new(),
            },
            UndoKind::Reactivate { .. } | UndoKind::Deactivate { .. } => {
                "Reactivate alarm".to_string()
            }
            UndoKind::Multi { kind, children } => match kind {
                MultiKind::Adds => "Create multiple alarms".to_string(),
                MultiKind::Reactivates => "Reactivate multiple alarms".to_string(),
                MultiKind::Deletes => {
                    for child in children {
                        match child.category {
                            EventCategory::Active => return "Delete multiple alarms".to_string(),
                            EventCategory::Template => {
                                return "Delete multiple templates".to_string()
                            }
                            EventCategory::Archived | EventCategory::Expired => continue,
                            _ => return String::new(),
                        }
                    }
                    "Delete multiple expired alarms".to_string()
                }
            },
        }
    }
}

fn add_delete_action_text(category: EventCategory, add: bool) -> String {
    match category {
        EventCategory::Active => {
            if add {
                "New alarm".to_string()
            } else {
                "Delete alarm".to_string()
            }
        }
        EventCategory::Template => {
            if add {
                "New template".to_string()
            } else {
                "Delete template".to_string()
            }
        }
        EventCategory::Archived | EventCategory::Expired => "Delete expired alarm".to_string(),
        _ => String::new(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionEntry {
    pub id: u32,
    pub text: String,
    pub description: String,
}

#[derive(Debug, Default)]
struct RestoreState {
    error: Option<RestoreError>,
    warnings: Vec<RestoreWarning>,
}

enum DeleteChildOutcome {
    NotFound,
    Removed,
    Collapsed(UndoItem),
}

/// Bounded double stack of reversible operations. Index 0 of either list is
/// the most recent entry.
pub struct UndoLog {
    undo: Vec<UndoItem>,
    redo: Vec<UndoItem>,
    bound: usize,
    last_id: u32,
}

impl Default for UndoLog {
    fn default() -> Self {
        Self::new()
    }
}

impl UndoLog {
    pub fn new() -> Self {
        Self {
            undo: Vec::new(),
            redo: Vec::new(),
            bound: DEFAULT_HISTORY_BOUND,
            last_id: 0,
        }
    }

    pub fn with_bound(mut self, bound: usize) -> Self {
        self.bound = bound.max(2);
        self
    }

    pub fn undo_count(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo.len()
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }

    /// Action text of the latest item in the given list, if any.
    pub fn latest_action_text(&self, list: ListKind) -> Option<String> {
        self.list(list).first().map(|item| item.action_text(list))
    }

    pub fn latest_item_id(&self, list: ListKind) -> Option<u32> {
        self.list(list).first().map(|item| item.id)
    }

    fn list(&self, list: ListKind) -> &Vec<UndoItem> {
        match list {
            ListKind::Undo => &self.undo,
            ListKind::Redo => &self.redo,
        }
    }

    fn next_id(&mut self) -> u32 {
        self.last_id = self.last_id.checked_add(1).unwrap_or(1);
        self.last_id
    }

    fn new_item(&mut self, category: EventCategory, name: Option<String>, kind: UndoKind) -> UndoItem {
        UndoItem {
            id: self.next_id(),
            name,
            category,
            kind,
        }
    }

    fn detached_item(category: EventCategory, kind: UndoKind) -> UndoItem {
        UndoItem {
            id: 0,
            name: None,
            category,
            kind,
        }
    }

    /// Prepend an item to a list, evicting the oldest entry from the longer
    /// list first so the combined count stays within the bound.
    fn push(&mut self, item: UndoItem, list: ListKind) {
        if self.undo.len() + self.redo.len() >= self.bound - 1 {
            if !self.undo.is_empty() {
                self.undo.pop();
            } else {
                self.redo.pop();
            }
        }
        match list {
            ListKind::Undo => self.undo.insert(0, item),
            ListKind::Redo => self.redo.insert(0, item),
        }
    }

    fn add_kind(event: &AlarmEvent) -> UndoKind {
        UndoKind::Add {
            event_id: event.id.clone(),
            collection: event.collection_id,
            description: event.summary(),
        }
    }

    fn reactivate_kind(event: &AlarmEvent) -> UndoKind {
        UndoKind::Reactivate {
            event_id: event.id.clone(),
            collection: event.collection_id,
            description: event.summary(),
        }
    }

    pub fn record_add(&mut self, event: &AlarmEvent, name: Option<String>) {
        let item = self.new_item(event.category, name, Self::add_kind(event));
        self.push(item, ListKind::Undo);
    }

    pub fn record_adds(&mut self, events: &[AlarmEvent], name: Option<String>) {
        match events {
            [] => {}
            [event] => self.record_add(event, name),
            _ => {
                let children = events
                    .iter()
                    .map(|event| Self::detached_item(event.category, Self::add_kind(event)))
                    .collect();
                let item = self.new_item(
                    events[0].category,
                    name,
                    UndoKind::Multi {
                        kind: MultiKind::Adds,
                        children,
                    },
                );
                self.push(item, ListKind::Undo);
            }
        }
    }

    pub fn record_edit(&mut self, old_event: &AlarmEvent, new_event: &AlarmEvent) {
        let item = self.new_item(
            new_event.category,
            None,
            UndoKind::Edit {
                old_event: Box::new(old_event.clone()),
                new_id: new_event.id.clone(),
                description: new_event.summary(),
            },
        );
        self.push(item, ListKind::Undo);
        // A fresh edit invalidates any redo path referencing this alarm.
        self.remove_redos(&old_event.id);
    }

    pub fn record_delete(&mut self, event: &AlarmEvent, name: Option<String>) {
        let item = self.new_item(
            event.category,
            name,
            UndoKind::Delete {
                event: Box::new(event.clone()),
            },
        );
        self.push(item, ListKind::Undo);
        self.remove_redos(&event.id);
    }

    pub fn record_deletes(&mut self, events: &[AlarmEvent], name: Option<String>) {
        match events {
            [] => {}
            [event] => self.record_delete(event, name),
            _ => {
                let children = events
                    .iter()
                    .map(|event| {
                        Self::detached_item(
                            event.category,
                            UndoKind::Delete {
                                event: Box::new(event.clone()),
                            },
                        )
                    })
                    .collect();
                let item = self.new_item(
                    events[0].category,
                    name,
                    UndoKind::Multi {
                        kind: MultiKind::Deletes,
                        children,
                    },
                );
                self.push(item, ListKind::Undo);
                for event in events {
                    self.remove_redos(&event.id);
                }
            }
        }
    }

    pub fn record_reactivate(&mut self, event: &AlarmEvent, name: Option<String>) {
        let item = self.new_item(EventCategory::Active, name, Self::reactivate_kind(event));
        self.push(item, ListKind::Undo);
    }

    pub fn record_reactivates(&mut self, events: &[AlarmEvent], name: Option<String>) {
        match events {
            [] => {}
            [event] => self.record_reactivate(event, name),
            _ => {
                let children = events
                    .iter()
                    .map(|event| {
                        Self::detached_item(EventCategory::Active, Self::reactivate_kind(event))
                    })
                    .collect();
                let item = self.new_item(
                    EventCategory::Active,
                    name,
                    UndoKind::Multi {
                        kind: MultiKind::Reactivates,
                        children,
                    },
                );
                self.push(item, ListKind::Undo);
            }
        }
    }

    /// Remove redo entries invalidated by a new undo for `event_id`. Edit
    /// entries keep chasing the alarm's pre-edit identity, since older redo
    /// entries reference that earlier id.
    fn remove_redos(&mut self, event_id: &str) {
        let mut id = event_id.to_string();
        let mut index = 0;
        while index < self.redo.len() {
            let item = &mut self.redo[index];
            if item.operation() == UndoOperation::Multi {
                match Self::delete_child(item, &id) {
                    DeleteChildOutcome::Collapsed(mut lone) => {
                        lone.id = item.id;
                        self.redo[index] = lone;
                    }
                    DeleteChildOutcome::Removed | DeleteChildOutcome::NotFound => {}
                }
                index += 1;
            } else if item.event_id() == id {
                if item.operation() == UndoOperation::Edit {
                    id = item.old_event_id().to_string();
                }
                self.redo.remove(index);
            } else {
                index += 1;
            }
        }
    }

    /// Remove one child of a multi item whose event id matches. When exactly
    /// one child remains, the multi collapses into it transparently.
    fn delete_child(item: &mut UndoItem, id: &str) -> DeleteChildOutcome {
        let UndoKind::Multi { children, .. } = &mut item.kind else {
            return DeleteChildOutcome::NotFound;
        };
        let Some(position) = children.iter().position(|child| child.event_id() == id) else {
            return DeleteChildOutcome::NotFound;
        };
        children.remove(position);
        if children.len() == 1 {
            let lone = children.remove(0);
            DeleteChildOutcome::Collapsed(lone)
        } else {
            DeleteChildOutcome::Removed
        }
    }

    /// Remove one event's entry from a multi item in the given list,
    /// collapsing the multi when a single child remains. Non-multi items are
    /// untouched.
    pub fn delete_multi_member(&mut self, list: ListKind, item_id: u32, event_id: &str) -> bool {
        let entries = match list {
            ListKind::Undo => &mut self.undo,
            ListKind::Redo => &mut self.redo,
        };
        let Some(position) = entries.iter().position(|item| item.id == item_id) else {
            return false;
        };
        match Self::delete_child(&mut entries[position], event_id) {
            DeleteChildOutcome::Collapsed(mut lone) => {
                lone.id = entries[position].id;
                entries[position] = lone;
                true
            }
            DeleteChildOutcome::Removed => true,
            DeleteChildOutcome::NotFound => false,
        }
    }

    pub fn item(&self, list: ListKind, item_id: u32) -> Option<&UndoItem> {
        self.list(list).iter().find(|item| item.id == item_id)
    }

    /// Descriptions of the list's items, latest first. Once a more recent
    /// entry has claimed an alarm's id, older entries for the same alarm are
    /// suppressed so dependent undos are executed in order; they stay in the
    /// list and remain restorable by id.
    pub fn list_actions(&self, list: ListKind) -> Vec<ActionEntry> {
        let mut ignore: Vec<String> = Vec::new();
        let mut entries = Vec::new();
        for item in self.list(list) {
            let mut omit = false;
            if let UndoKind::Multi { children, .. } = &item.kind {
                // If any child is disqualified, omit the whole multi item.
                let mut fresh_ids: Vec<String> = Vec::new();
                for child in children {
                    let event_id = child.event_id().to_string();
                    if ignore.contains(&event_id) {
                        omit = true;
                    } else if omit {
                        ignore.push(event_id);
                    } else {
                        fresh_ids.push(event_id);
                    }
                }
                if omit {
                    ignore.extend(fresh_ids);
                }
            } else {
                let event_id = item.event_id().to_string();
                omit = ignore.contains(&event_id);
                if !omit {
                    ignore.push(event_id);
                }
                if item.operation() == UndoOperation::Edit {
                    ignore.push(item.old_event_id().to_string());
                }
            }
            if !omit {
                entries.push(ActionEntry {
                    id: item.id,
                    text: item.action_text(list),
                    description: item.description(),
                });
            }
        }
        entries
    }

    /// Undo or redo the item with the given id. The attempt is consumed:
    /// the item leaves its list whether or not the restore succeeds, and on
    /// success an opposite-direction item is recorded.
    pub fn restore(
        &mut self,
        list: ListKind,
        item_id: u32,
        store: &mut EventStore,
        external: &mut dyn ExternalCalendarSync,
    ) -> Result<Vec<RestoreWarning>, RestoreError> {
        let entries = match list {
            ListKind::Undo => &mut self.undo,
            ListKind::Redo => &mut self.redo,
        };
        let Some(position) = entries.iter().position(|item| item.id == item_id) else {
            // The item no longer exists; nothing to do.
            return Ok(Vec::new());
        };
        let item = entries.remove(position);
        debug!(item_id, operation = ?item.operation(), "restoring undo item");

        let mut state = RestoreState::default();
        let produced = self.restore_item(item, store, external, &mut state);
        if let Some(produced) = produced {
            let opposite = match list {
                ListKind::Undo => ListKind::Redo,
                ListKind::Redo => ListKind::Undo,
            };
            self.push(produced, opposite);
        }
        match state.error {
            Some(error) => Err(error),
            None => Ok(state.warnings),
        }
    }

    fn restore_item(
        &mut self,
        item: UndoItem,
        store: &mut EventStore,
        external: &mut dyn ExternalCalendarSync,
        state: &mut RestoreState,
    ) -> Option<UndoItem> {
        let UndoItem {
            name,
            category,
            kind,
            ..
        } = item;
        match kind {
            UndoKind::Add {
                event_id,
                collection,
                ..
            } => self.restore_added(
                category, name, collection, &event_id, false, store, external, state,
            ),
            UndoKind::Reactivate {
                event_id,
                collection,
                ..
            } => {
                if category != EventCategory::Active {
                    state.error = Some(RestoreError::ProgramError);
                    return None;
                }
                self.restore_added(
                    category, name, collection, &event_id, true, store, external, state,
                )
            }
            UndoKind::Edit {
                old_event,
                new_id,
                description,
            } => self.restore_edited(
                category,
                *old_event,
                &new_id,
                description,
                store,
                external,
                state,
            ),
            UndoKind::Delete { event } => {
                self.restore_deleted(category, name, *event, false, store, external, state)
            }
            UndoKind::Deactivate { event } => {
                if category != EventCategory::Active {
                    state.error = Some(RestoreError::ProgramError);
                    return None;
                }
                self.restore_deleted(category, name, *event, true, store, external, state)
            }
            UndoKind::Multi { kind, children } => {
                let mut restored = Vec::new();
                for child in children {
                    if let Some(produced) = self.restore_item(child, store, external, state) {
                        restored.push(Self::into_detached(produced));
                    }
                }
                match restored.len() {
                    0 => None,
                    1 => {
                        let mut lone = restored.remove(0);
                        lone.id = self.next_id();
                        Some(lone)
                    }
                    _ => Some(self.new_item(category, name, UndoKind::Multi { kind, children: restored })),
                }
            }
        }
    }

    fn into_detached(mut item: UndoItem) -> UndoItem {
        item.id = 0;
        item
    }

    /// Reverse an add (or, with `reactivation`, a reactivation): delete the
    /// alarm again, archiving it when it has already triggered.
    fn restore_added(
        &mut self,
        category: EventCategory,
        name: Option<String>,
        collection: CollectionId,
        event_id: &str,
        reactivation: bool,
        store: &mut EventStore,
        external: &mut dyn ExternalCalendarSync,
        state: &mut RestoreState,
    ) -> Option<UndoItem> {
        let Some(current) = store.event(collection, event_id).cloned() else {
            state.error = Some(RestoreError::NotFound);
            return None;
        };
        let mut snapshot = current.clone();
        if reactivation {
            snapshot.to_be_archived = true;
        }
        let redo_kind = if reactivation {
            UndoKind::Deactivate {
                event: Box::new(snapshot.clone()),
            }
        } else {
            UndoKind::Delete {
                event: Box::new(snapshot.clone()),
            }
        };
        let redo = self.new_item(category, name, redo_kind);

        match category {
            EventCategory::Active => {
                if store.delete_event(collection, event_id).is_none() {
                    state.error = Some(RestoreError::CreateFailed);
                } else {
                    if snapshot.to_be_archived {
                        // It has already triggered: keep it in the expired
                        // calendar rather than discarding it.
                        let mut archived = snapshot.clone();
                        archived.category = EventCategory::Expired;
                        let _ = store.add_event(archived, collection, true);
                    }
                    if !external.event_deleted(event_id) {
                        state.warnings.push(RestoreWarning::ExternalDeleteFailed);
                    }
                }
            }
            EventCategory::Template => {
                if store.delete_event(collection, event_id).is_none() {
                    state.error = Some(RestoreError::TemplateFailed);
                }
            }
            EventCategory::Archived | EventCategory::Expired => {
                let _ = store.delete_event(collection, event_id);
            }
            _ => {
                state.error = Some(RestoreError::ProgramError);
                return None;
            }
        }
        Some(redo)
    }

    /// Reverse an edit: put the pre-edit event back, under its old identity.
    fn restore_edited(
        &mut self,
        category: EventCategory,
        old_event: AlarmEvent,
        new_id: &str,
        description: String,
        store: &mut EventStore,
        external: &mut dyn ExternalCalendarSync,
        state: &mut RestoreState,
    ) -> Option<UndoItem> {
        let collection = old_event.collection_id;
        let Some(current) = store.event(collection, new_id).cloned() else {
            state.error = Some(RestoreError::NotFound);
            return None;
        };
        let redo = self.new_item(
            category,
            None,
            UndoKind::Edit {
                old_event: Box::new(current),
                new_id: old_event.id.clone(),
                description,
            },
        );
        match category {
            EventCategory::Active => {
                match store.modify_event(collection, new_id, old_event.clone()) {
                    Ok(_) => {
                        if !external.event_updated(&old_event) {
                            state.warnings.push(RestoreWarning::ExternalModifyFailed);
                        }
                    }
                    Err(_) => state.error = Some(RestoreError::CreateFailed),
                }
            }
            EventCategory::Template => {
                if store.update_event_in_place(old_event).is_err() {
                    state.error = Some(RestoreError::TemplateFailed);
                }
            }
            _ => {
                state.error = Some(RestoreError::ProgramError);
                return None;
            }
        }
        Some(redo)
    }

    /// Reverse a deletion (or a deactivation): put the alarm back, via the
    /// expired calendar when it had been archived.
    fn restore_deleted(
        &mut self,
        category: EventCategory,
        name: Option<String>,
        event: AlarmEvent,
        redo_is_reactivate: bool,
        store: &mut EventStore,
        external: &mut dyn ExternalCalendarSync,
        state: &mut RestoreState,
    ) -> Option<UndoItem> {
        let collection = event.collection_id;
        let restored_id = match category {
            EventCategory::Active => {
                if event.to_be_archived {
                    // It was archived when deleted: reactivate it.
                    let _ = store.delete_event(collection, &event.id);
                    match store.add_event(event.clone(), collection, true) {
                        Ok(id) => {
                            if !external.event_added(&event) {
                                state.warnings.push(RestoreWarning::ExternalAddFailed);
                            }
                            id
                        }
                        Err(_) => {
                            state.error = Some(RestoreError::ExpiredReactivationFailed);
                            return None;
                        }
                    }
                } else {
                    match store.add_event(event.clone(), collection, true) {
                        Ok(id) => {
                            if !external.event_added(&event) {
                                state.warnings.push(RestoreWarning::ExternalAddFailed);
                            }
                            id
                        }
                        Err(_) => {
                            state.error = Some(RestoreError::CreateFailed);
                            return None;
                        }
                    }
                }
            }
            EventCategory::Template
            | EventCategory::Archived
            | EventCategory::Expired => match store.add_event(event.clone(), collection, true) {
                Ok(id) => id,
                Err(_) => {
                    state.error = Some(RestoreError::CreateFailed);
                    return None;
                }
            },
            _ => {
                state.error = Some(RestoreError::ProgramError);
                return None;
            }
        };

        let mut restored = event;
        restored.id = restored_id;
        let redo_kind = if redo_is_reactivate {
            Self::reactivate_kind(&restored)
        } else {
            Self::add_kind(&restored)
        };
        Some(self.new_item(category, name, redo_kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::event_store::EventStore;
    use crate::domain::event::AlarmAction;
    use chrono::NaiveDateTime;
    use std::sync::Arc;

    fn fixed_now() -> NaiveDateTime {
        "2024-03-15T08:00:00".parse().expect("valid datetime")
    }

    fn test_store() -> EventStore {
        EventStore::resources().with_now_provider(Arc::new(fixed_now))
    }

    fn sample_event(id: &str) -> AlarmEvent {
        AlarmEvent {
            id: id.to_string(),
            category: EventCategory::Active,
            collection_id: 1,
            action: AlarmAction::Message {
                text: format!("alarm {id}"),
            },
            start_date: "2024-03-16".parse().expect("valid date"),
            start_time: "09:00:00".parse().ok(),
            enabled: true,
            recurrence: None,
            template_name: None,
            to_be_archived: false,
        }
    }

    struct FailingSync;

    impl ExternalCalendarSync for FailingSync {
        fn event_added(&mut self, _event: &AlarmEvent) -> bool {
            false
        }

        fn event_updated(&mut self, _event: &AlarmEvent) -> bool {
            false
        }

        fn event_deleted(&mut self, _event_id: &str) -> bool {
            false
        }
    }

    fn added(store: &mut EventStore, id: &str) -> AlarmEvent {
        store
            .add_event(sample_event(id), 1, true)
            .expect("add event");
        store.event(1, id).expect("event").clone()
    }

    fn latest_id(log: &UndoLog, list: ListKind) -> u32 {
        log.list_actions(list)
            .first()
            .map(|entry| entry.id)
            .expect("list entry")
    }

    #[test]
    fn undo_of_delete_restores_the_event() {
        let mut store = test_store();
        let mut log = UndoLog::new();
        let event = added(&mut store, "evt-a");
        let _ = store.delete_event(1, "evt-a");
        log.record_delete(&event, None);

        let item = latest_id(&log, ListKind::Undo);
        let warnings = log
            .restore(ListKind::Undo, item, &mut store, &mut NoExternalSync)
            .expect("restore");
        assert!(warnings.is_empty());
        assert_eq!(store.event(1, "evt-a"), Some(&event));
        assert_eq!(log.undo_count(), 0);
        assert_eq!(log.redo_count(), 1);
    }

    #[test]
    fn undo_redo_undo_reaches_single_undo_state() {
        let mut store = test_store();
        let mut log = UndoLog::new();
        let event = added(&mut store, "evt-a");
        let _ = store.delete_event(1, "evt-a");
        log.record_delete(&event, None);

        let undo_id = latest_id(&log, ListKind::Undo);
        log.restore(ListKind::Undo, undo_id, &mut store, &mut NoExternalSync)
            .expect("undo");
        let after_undo = store.event(1, "evt-a").cloned();

        let redo_id = latest_id(&log, ListKind::Redo);
        log.restore(ListKind::Redo, redo_id, &mut store, &mut NoExternalSync)
            .expect("redo");
        assert!(store.event(1, "evt-a").is_none());

        let undo_id = latest_id(&log, ListKind::Undo);
        log.restore(ListKind::Undo, undo_id, &mut store, &mut NoExternalSync)
            .expect("undo again");
        assert_eq!(store.event(1, "evt-a").cloned(), after_undo);
    }

    #[test]
    fn undo_of_add_deletes_and_produces_redo() {
        let mut store = test_store();
        let mut log = UndoLog::new();
        let event = added(&mut store, "evt-a");
        log.record_add(&event, None);

        let item = latest_id(&log, ListKind::Undo);
        log.restore(ListKind::Undo, item, &mut store, &mut NoExternalSync)
            .expect("restore");
        assert!(store.event(1, "evt-a").is_none());

        let redo = latest_id(&log, ListKind::Redo);
        log.restore(ListKind::Redo, redo, &mut store, &mut NoExternalSync)
            .expect("redo");
        assert!(store.event(1, "evt-a").is_some());
    }

    #[test]
    fn undo_of_edit_restores_old_identity() {
        let mut store = test_store();
        let mut log = UndoLog::new();
        let old_event = added(&mut store, "evt-a");
        let mut new_event = sample_event("evt-b");
        new_event.action = AlarmAction::Message {
            text: "changed".to_string(),
        };
        store
            .modify_event(1, "evt-a", new_event.clone())
            .expect("modify");
        log.record_edit(&old_event, &new_event);

        let item = latest_id(&log, ListKind::Undo);
        log.restore(ListKind::Undo, item, &mut store, &mut NoExternalSync)
            .expect("restore");
        assert!(store.event(1, "evt-b").is_none());
        assert_eq!(store.event(1, "evt-a"), Some(&old_event));
    }

    #[test]
    fn restore_of_missing_event_reports_not_found_and_is_consumed() {
        let mut store = test_store();
        let mut log = UndoLog::new();
        let event = added(&mut store, "evt-a");
        log.record_add(&event, None);
        let _ = store.delete_event(1, "evt-a");

        let item = latest_id(&log, ListKind::Undo);
        let error = log
            .restore(ListKind::Undo, item, &mut store, &mut NoExternalSync)
            .expect_err("missing event");
        assert_eq!(error, RestoreError::NotFound);
        assert_eq!(log.undo_count(), 0);
        assert_eq!(log.redo_count(), 0);
    }

    #[test]
    fn external_sync_failure_is_a_warning_not_an_error() {
        let mut store = test_store();
        let mut log = UndoLog::new();
        let event = added(&mut store, "evt-a");
        let _ = store.delete_event(1, "evt-a");
        log.record_delete(&event, None);

        let item = latest_id(&log, ListKind::Undo);
        let warnings = log
            .restore(ListKind::Undo, item, &mut store, &mut FailingSync)
            .expect("restore succeeds locally");
        assert_eq!(warnings, vec![RestoreWarning::ExternalAddFailed]);
        assert!(store.event(1, "evt-a").is_some());
    }

    #[test]
    fn new_edit_invalidates_redos_chasing_pre_edit_ids() {
        let mut store = test_store();
        let mut log = UndoLog::new();
        let event_a = added(&mut store, "evt-a");
        let unrelated = added(&mut store, "evt-z");

        // Build a redo entry for evt-a by undoing an add.
        log.record_add(&event_a, None);
        let item = latest_id(&log, ListKind::Undo);
        log.restore(ListKind::Undo, item, &mut store, &mut NoExternalSync)
            .expect("undo add");
        // And an unrelated redo entry.
        log.record_add(&unrelated, None);
        let item = latest_id(&log, ListKind::Undo);
        log.restore(ListKind::Undo, item, &mut store, &mut NoExternalSync)
            .expect("undo add");
        assert_eq!(log.redo_count(), 2);

        // Re-create evt-a under a new identity and record the edit: the
        // redo referencing evt-a (via either id) must go, evt-z stays.
        store
            .add_event(sample_event("evt-a"), 1, true)
            .expect("re-add");
        let old_event = store.event(1, "evt-a").expect("event").clone();
        let new_event = sample_event("evt-b");
        store
            .modify_event(1, "evt-a", new_event.clone())
            .expect("modify");
        log.record_edit(&old_event, &new_event);

        assert_eq!(log.redo_count(), 1);
        let remaining = log.list_actions(ListKind::Redo);
        assert_eq!(remaining[0].description, unrelated.summary());
    }

    #[test]
    fn multi_delete_undo_restores_all_and_collapses_by_member() {
        let mut store = test_store();
        let mut log = UndoLog::new();
        let events: Vec<AlarmEvent> = ["evt-a", "evt-b", "evt-c"]
            .iter()
            .map(|id| added(&mut store, id))
            .collect();
        for event in &events {
            let _ = store.delete_event(1, &event.id);
        }
        log.record_deletes(&events, Some("Delete 3 alarms".to_string()));
        assert_eq!(log.undo_count(), 1);

        let item = latest_id(&log, ListKind::Undo);
        log.delete_multi_member(ListKind::Undo, item, "evt-a");
        log.delete_multi_member(ListKind::Undo, item, "evt-b");

        // Two removals later the multi has transparently become the single
        // remaining delete, still addressable by the same item id.
        let entry = log.item(ListKind::Undo, item).expect("item");
        assert_eq!(entry.operation(), UndoOperation::Delete);
        assert_eq!(entry.event_id(), "evt-c");

        log.restore(ListKind::Undo, item, &mut store, &mut NoExternalSync)
            .expect("restore");
        assert!(store.event(1, "evt-c").is_some());
        assert!(store.event(1, "evt-a").is_none());
    }

    #[test]
    fn multi_restore_omits_failed_children() {
        let mut store = test_store();
        let mut log = UndoLog::new();
        let events: Vec<AlarmEvent> = ["evt-a", "evt-b"]
            .iter()
            .map(|id| added(&mut store, id))
            .collect();
        log.record_adds(&events, None);
        // evt-b vanishes before the undo runs; its child fails NotFound and
        // is omitted from the redo batch.
        let _ = store.delete_event(1, "evt-b");

        let item = latest_id(&log, ListKind::Undo);
        let error = log
            .restore(ListKind::Undo, item, &mut store, &mut NoExternalSync)
            .expect_err("child failure is reported");
        assert_eq!(error, RestoreError::NotFound);
        assert!(store.event(1, "evt-a").is_none());

        // The surviving child produced a single (collapsed) redo item.
        assert_eq!(log.redo_count(), 1);
        let redo = latest_id(&log, ListKind::Redo);
        let entry = log.item(ListKind::Redo, redo).expect("redo item");
        assert_eq!(entry.operation(), UndoOperation::Delete);
        assert_eq!(entry.event_id(), "evt-a");
    }

    #[test]
    fn multi_restore_with_all_children_failed_produces_no_redo() {
        let mut store = test_store();
        let mut log = UndoLog::new();
        let events: Vec<AlarmEvent> = ["evt-a", "evt-b"]
            .iter()
            .map(|id| added(&mut store, id))
            .collect();
        log.record_adds(&events, None);
        let _ = store.delete_event(1, "evt-a");
        let _ = store.delete_event(1, "evt-b");

        let item = latest_id(&log, ListKind::Undo);
        let error = log
            .restore(ListKind::Undo, item, &mut store, &mut NoExternalSync)
            .expect_err("all children failed");
        assert_eq!(error, RestoreError::NotFound);
        assert_eq!(log.redo_count(), 0);
    }

    #[test]
    fn reactivate_undo_rearchives_and_redo_reactivates() {
        let mut store = test_store();
        let mut log = UndoLog::new();
        // An archived alarm is reactivated by the command layer.
        let mut archived = sample_event("evt-a");
        archived.category = EventCategory::Expired;
        archived.to_be_archived = true;
        store.add_event(archived, 1, true).expect("add");
        let mut reactivated = store.event(1, "evt-a").expect("event").clone();
        reactivated.category = EventCategory::Active;
        let _ = store.delete_event(1, "evt-a");
        store
            .add_event(reactivated.clone(), 1, true)
            .expect("reactivate");
        log.record_reactivate(&reactivated, None);

        // Undo: the alarm is re-archived.
        let item = latest_id(&log, ListKind::Undo);
        log.restore(ListKind::Undo, item, &mut store, &mut NoExternalSync)
            .expect("undo reactivation");
        assert_eq!(
            store.event(1, "evt-a").map(|event| event.category),
            Some(EventCategory::Expired)
        );

        // Redo: the alarm becomes active again.
        let redo = latest_id(&log, ListKind::Redo);
        let entry = log.item(ListKind::Redo, redo).expect("redo item");
        assert_eq!(entry.operation(), UndoOperation::Deactivate);
        log.restore(ListKind::Redo, redo, &mut store, &mut NoExternalSync)
            .expect("redo reactivation");
        assert_eq!(
            store.event(1, "evt-a").map(|event| event.category),
            Some(EventCategory::Active)
        );
    }

    #[test]
    fn history_is_bounded_with_oldest_evicted() {
        let mut store = test_store();
        let mut log = UndoLog::new();
        for index in 0..20 {
            let event = added(&mut store, &format!("evt-{index}"));
            log.record_add(&event, None);
        }
        assert_eq!(log.undo_count(), DEFAULT_HISTORY_BOUND - 1);
        // The most recent items survive.
        let entries = log.list_actions(ListKind::Undo);
        assert_eq!(entries[0].description, "alarm evt-19");
    }

    #[test]
    fn dependent_entries_are_suppressed_in_listing_but_stay_restorable() {
        let mut store = test_store();
        let mut log = UndoLog::new();
        let original = added(&mut store, "evt-a");
        log.record_add(&original, None);

        // First edit: evt-a -> evt-b.
        let first = sample_event("evt-b");
        store.modify_event(1, "evt-a", first.clone()).expect("modify");
        log.record_edit(&original, &first);

        // Second edit: evt-b -> evt-c.
        let second = sample_event("evt-c");
        store.modify_event(1, "evt-b", second.clone()).expect("modify");
        log.record_edit(&first, &second);

        // Only the most recent entry for this alarm is listed; the older
        // edit and the add are dependent continuations.
        let entries = log.list_actions(ListKind::Undo);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].text, "Edit alarm");
        assert_eq!(log.undo_count(), 3);
    }

    #[test]
    fn latest_action_text_prefers_explicit_name() {
        let mut store = test_store();
        let mut log = UndoLog::new();
        let event = added(&mut store, "evt-a");
        log.record_delete(&event, Some("Clear morning alarm".to_string()));
        assert_eq!(
            log.latest_action_text(ListKind::Undo),
            Some("Clear morning alarm".to_string())
        );

        let other = added(&mut store, "evt-b");
        log.record_delete(&other, None);
        assert_eq!(
            log.latest_action_text(ListKind::Undo),
            Some("Delete alarm".to_string())
        );
    }

    #[test]
    fn restore_of_unknown_item_id_is_a_no_op() {
        let mut store = test_store();
        let mut log = UndoLog::new();
        let warnings = log
            .restore(ListKind::Undo, 42, &mut store, &mut NoExternalSync)
            .expect("no-op");
        assert!(warnings.is_empty());
    }
}
