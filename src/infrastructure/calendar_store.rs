use crate::infrastructure::error::InfraError;
use crate::infrastructure::interchange::InterchangeEvent;
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, error};

const SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceChange {
    ItemsAdded { resource: String, uids: Vec<String> },
    ItemsRemoved { resource: String, uids: Vec<String> },
}

pub type ChangeListener = Arc<dyn Fn(ResourceChange) + Send + Sync>;

/// Backing store for calendar resources. All operations are fallible and
/// possibly slow; callers must treat them as suspend points.
#[async_trait]
pub trait CalendarBackend: Send + Sync {
    async fn load(&self, resource: &str) -> Result<Vec<InterchangeEvent>, InfraError>;
    async fn save(&self, resource: &str, events: &[InterchangeEvent]) -> Result<(), InfraError>;
    async fn add_item(&self, resource: &str, event: &InterchangeEvent) -> Result<(), InfraError>;
    async fn delete_item(&self, resource: &str, uid: &str) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct SqliteCalendarBackend {
    db_path: PathBuf,
}

impl SqliteCalendarBackend {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    pub fn initialize(&self) -> Result<(), InfraError> {
        let connection = self.connect()?;
        connection.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        Connection::open(&self.db_path).map_err(InfraError::from)
    }
}

#[async_trait]
impl CalendarBackend for SqliteCalendarBackend {
    async fn load(&self, resource: &str) -> Result<Vec<InterchangeEvent>, InfraError> {
        let connection = self.connect()?;
        let mut statement = connection
            .prepare("SELECT payload FROM calendar_events WHERE resource = ?1 ORDER BY uid")?;
        let rows = statement.query_map(params![resource], |row| row.get::<_, String>(0))?;
        let mut events = Vec::new();
        for payload in rows {
            let payload = payload?;
            events.push(serde_json::from_str(&payload)?);
        }
        debug!(resource, count = events.len(), "calendar resource loaded");
        Ok(events)
    }

    async fn save(&self, resource: &str, events: &[InterchangeEvent]) -> Result<(), InfraError> {
        let mut connection = self.connect()?;
        let transaction = connection.transaction()?;
        transaction.execute(
            "DELETE FROM calendar_events WHERE resource = ?1",
            params![resource],
        )?;
        for event in events {
            transaction.execute(
                "INSERT INTO calendar_events (resource, uid, category, payload, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    resource,
                    event.uid,
                    event.category,
                    serde_json::to_string(event)?,
                    Utc::now().to_rfc3339(),
                ],
            )?;
        }
        transaction.commit()?;
        Ok(())
    }

    async fn add_item(&self, resource: &str, event: &InterchangeEvent) -> Result<(), InfraError> {
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO calendar_events (resource, uid, category, payload, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(resource, uid) DO UPDATE SET
               category = excluded.category,
               payload = excluded.payload,
               updated_at = excluded.updated_at",
            params![
                resource,
                event.uid,
                event.category,
                serde_json::to_string(event)?,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    async fn delete_item(&self, resource: &str, uid: &str) -> Result<(), InfraError> {
        let connection = self.connect()?;
        let deleted = connection.execute(
            "DELETE FROM calendar_events WHERE resource = ?1 AND uid = ?2",
            params![resource, uid],
        )?;
        if deleted == 0 {
            return Err(InfraError::Backend(format!(
                "event '{uid}' not found in resource '{resource}'"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCalendarBackend {
    resources: Mutex<HashMap<String, Vec<InterchangeEvent>>>,
}

impl InMemoryCalendarBackend {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Vec<InterchangeEvent>>>, InfraError> {
        self.resources
            .lock()
            .map_err(|error| InfraError::Backend(format!("calendar store lock poisoned: {error}")))
    }
}

#[async_trait]
impl CalendarBackend for InMemoryCalendarBackend {
    async fn load(&self, resource: &str) -> Result<Vec<InterchangeEvent>, InfraError> {
        Ok(self.lock()?.get(resource).cloned().unwrap_or_default())
    }

    async fn save(&self, resource: &str, events: &[InterchangeEvent]) -> Result<(), InfraError> {
        self.lock()?.insert(resource.to_string(), events.to_vec());
        Ok(())
    }

    async fn add_item(&self, resource: &str, event: &InterchangeEvent) -> Result<(), InfraError> {
        let mut resources = self.lock()?;
        let events = resources.entry(resource.to_string()).or_default();
        match events.iter_mut().find(|existing| existing.uid == event.uid) {
            Some(existing) => *existing = event.clone(),
            None => events.push(event.clone()),
        }
        Ok(())
    }

    async fn delete_item(&self, resource: &str, uid: &str) -> Result<(), InfraError> {
        let mut resources = self.lock()?;
        let Some(events) = resources.get_mut(resource) else {
            return Err(InfraError::Backend(format!(
                "unknown resource '{resource}'"
            )));
        };
        let before = events.len();
        events.retain(|event| event.uid != uid);
        if events.len() == before {
            return Err(InfraError::Backend(format!(
                "event '{uid}' not found in resource '{resource}'"
            )));
        }
        Ok(())
    }
}

struct InFlightGuard<'a> {
    in_flight: &'a Mutex<HashSet<String>>,
    resource: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut in_flight) = self.in_flight.lock() {
            in_flight.remove(&self.resource);
        }
    }
}

/// Wraps a backend with a per-resource in-flight guard: while a load or save
/// of a resource is outstanding, another load or save of the same resource
/// is rejected rather than queued.
pub struct CalendarResourceService<B>
where
    B: CalendarBackend,
{
    backend: Arc<B>,
    in_flight: Mutex<HashSet<String>>,
    change_listener: Option<ChangeListener>,
}

impl<B> CalendarResourceService<B>
where
    B: CalendarBackend,
{
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            in_flight: Mutex::new(HashSet::new()),
            change_listener: None,
        }
    }

    pub fn with_change_listener(mut self, listener: ChangeListener) -> Self {
        self.change_listener = Some(listener);
        self
    }

    fn acquire(&self, resource: &str) -> Result<InFlightGuard<'_>, InfraError> {
        let mut in_flight = self
            .in_flight
            .lock()
            .map_err(|error| InfraError::Backend(format!("in-flight lock poisoned: {error}")))?;
        if !in_flight.insert(resource.to_string()) {
            return Err(InfraError::ResourceBusy(resource.to_string()));
        }
        Ok(InFlightGuard {
            in_flight: &self.in_flight,
            resource: resource.to_string(),
        })
    }

    fn notify(&self, change: ResourceChange) {
        if let Some(listener) = &self.change_listener {
            listener(change);
        }
    }

    pub async fn load(&self, resource: &str) -> Result<Vec<InterchangeEvent>, InfraError> {
        let _guard = self.acquire(resource)?;
        let loaded = self.backend.load(resource).await;
        if let Err(failure) = &loaded {
            error!(resource, %failure, "calendar load failed");
        }
        loaded
    }

    pub async fn save(&self, resource: &str, events: &[InterchangeEvent]) -> Result<(), InfraError> {
        let _guard = self.acquire(resource)?;
        let saved = self.backend.save(resource, events).await;
        if let Err(failure) = &saved {
            error!(resource, %failure, "calendar save failed");
        }
        saved
    }

    pub async fn add_item(&self, resource: &str, event: &InterchangeEvent) -> Result<(), InfraError> {
        self.backend.add_item(resource, event).await?;
        self.notify(ResourceChange::ItemsAdded {
            resource: resource.to_string(),
            uids: vec![event.uid.clone()],
        });
        Ok(())
    }

    pub async fn delete_item(&self, resource: &str, uid: &str) -> Result<(), InfraError> {
        self.backend.delete_item(resource, uid).await?;
        self.notify(ResourceChange::ItemsRemoved {
            resource: resource.to_string(),
            uids: vec![uid.to_string()],
        });
        Ok(())
    }
}
