use crate::domain::recurrence::{EndCondition, RecurrenceKind, RecurrenceRule};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

pub type CollectionId = i64;

/// Collection id for events not yet assigned to a backing store, and for
/// display-only events.
pub const UNASSIGNED_COLLECTION: CollectionId = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCategory {
    Active,
    Archived,
    Template,
    Displaying,
    Expired,
}

impl EventCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Archived => "archived",
            Self::Template => "template",
            Self::Displaying => "displaying",
            Self::Expired => "expired",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "active" => Some(Self::Active),
            "archived" => Some(Self::Archived),
            "template" => Some(Self::Template),
            "displaying" => Some(Self::Displaying),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlarmAction {
    Message { text: String },
    File { path: String },
    Command { command_line: String },
    Email {
        addresses: Vec<String>,
        subject: String,
        body: String,
    },
}

impl AlarmAction {
    /// Short user-facing summary, as shown in alarm lists and undo
    /// descriptions.
    pub fn summary(&self) -> String {
        match self {
            Self::Message { text } => text.lines().next().unwrap_or_default().to_string(),
            Self::File { path } => path.clone(),
            Self::Command { command_line } => command_line.clone(),
            Self::Email { subject, addresses, .. } => {
                if subject.is_empty() {
                    addresses.join(", ")
                } else {
                    subject.clone()
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmEvent {
    pub id: String,
    pub category: EventCategory,
    pub collection_id: CollectionId,
    pub action: AlarmAction,
    pub start_date: NaiveDate,
    /// `None` means a date-only alarm, anchored at the configured
    /// start-of-day time.
    pub start_time: Option<NaiveTime>,
    pub enabled: bool,
    pub recurrence: Option<RecurrenceRule>,
    pub template_name: Option<String>,
    /// Set once the alarm has triggered; deleting it then moves it to the
    /// expired calendar instead of discarding it.
    pub to_be_archived: bool,
}

impl AlarmEvent {
    pub fn summary(&self) -> String {
        match self.category {
            EventCategory::Template => self.template_name.clone().unwrap_or_default(),
            _ => self.action.summary(),
        }
    }

    pub fn is_date_only(&self) -> bool {
        self.start_time.is_none()
    }

    pub fn repeat_at_login(&self) -> bool {
        self.recurrence
            .as_ref()
            .is_some_and(|rule| rule.kind == RecurrenceKind::AtLogin)
    }

    pub fn start_date_time(&self, start_of_day: NaiveTime) -> NaiveDateTime {
        self.start_date
            .and_time(self.start_time.unwrap_or(start_of_day))
    }

    /// Next wall-clock trigger at or after `now`, or `None` if the alarm has
    /// run its course.
    pub fn next_trigger(&self, now: NaiveDateTime, start_of_day: NaiveTime) -> Option<NaiveDateTime> {
        let start = self.start_date_time(start_of_day);
        match &self.recurrence {
            None => {
                if start >= now {
                    Some(start)
                } else {
                    None
                }
            }
            Some(rule) => match &rule.kind {
                RecurrenceKind::None => {
                    if start >= now {
                        Some(start)
                    } else {
                        None
                    }
                }
                RecurrenceKind::AtLogin => {
                    // At-login alarms keep firing at every login until their
                    // end date; the trigger daemon owns the login edge.
                    match &rule.end {
                        EndCondition::Until { date, .. } if now.date() > *date => None,
                        _ => Some(start),
                    }
                }
                _ => rule.next_on_or_after(start, now),
            },
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.category == EventCategory::Template
            && self
                .template_name
                .as_deref()
                .map(str::trim)
                .unwrap_or_default()
                .is_empty()
        {
            return Err("event.template_name must not be empty for templates".to_string());
        }
        match &self.action {
            AlarmAction::File { path } => {
                if path.trim().is_empty() {
                    return Err("event.action.path must not be empty".to_string());
                }
            }
            AlarmAction::Command { command_line } => {
                if command_line.trim().is_empty() {
                    return Err("event.action.command_line must not be empty".to_string());
                }
            }
            AlarmAction::Email { addresses, .. } => {
                if addresses.is_empty() {
                    return Err("event.action.addresses must not be empty".to_string());
                }
            }
            AlarmAction::Message { .. } => {}
        }
        // Templates carry no meaningful schedule, so they are exempt from
        // the start/end ordering check.
        if self.category != EventCategory::Template {
            if let Some(rule) = &self.recurrence {
                if let EndCondition::Until { date, time } = &rule.end {
                    if *date < self.start_date {
                        return Err("event recurrence ends before it starts".to_string());
                    }
                    if let (Some(time), Some(start_time)) = (time, self.start_time) {
                        if *date == self.start_date && *time < start_time {
                            return Err("event recurrence ends before it starts".to_string());
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
