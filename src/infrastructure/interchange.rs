use crate::domain::event::{AlarmAction, AlarmEvent, EventCategory, UNASSIGNED_COLLECTION};
use crate::domain::recurrence::{
    EndCondition, Feb29Policy, MonthDay, MonthPos, MonthSet, RecurrenceKind, RecurrenceRule,
    WeekOrdinal, WeekdaySet,
};
use crate::infrastructure::error::InfraError;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

const FREQ_MINUTELY: &str = "MINUTELY";
const FREQ_DAILY: &str = "DAILY";
const FREQ_WEEKLY: &str = "WEEKLY";
const FREQ_MONTHLY: &str = "MONTHLY";
const FREQ_YEARLY: &str = "YEARLY";

const FEB29_MAR1: &str = "MAR1";
const FEB29_FEB28: &str = "FEB28";

const LAST_MONTH_DAY: i8 = -1;

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Recurrence encoding with iCalendar-equivalent fields: FREQ, INTERVAL,
/// BYDAY, BYMONTHDAY, BYMONTH, COUNT and UNTIL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InterchangeRule {
    pub freq: String,
    pub interval: u32,
    #[serde(rename = "byDay", default, skip_serializing_if = "Vec::is_empty")]
    pub by_day: Vec<String>,
    #[serde(rename = "byMonthDay", default, skip_serializing_if = "Vec::is_empty")]
    pub by_month_day: Vec<i8>,
    #[serde(rename = "byMonth", default, skip_serializing_if = "Vec::is_empty")]
    pub by_month: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InterchangeAction {
    Message {
        text: String,
    },
    File {
        path: String,
    },
    Command {
        command_line: String,
    },
    Email {
        addresses: Vec<String>,
        subject: String,
        body: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InterchangeEvent {
    pub uid: String,
    pub category: String,
    /// DTSTART: `YYYY-MM-DD` for date-only alarms, otherwise
    /// `YYYY-MM-DDTHH:MM:SS`.
    pub dtstart: String,
    pub enabled: bool,
    pub action: InterchangeAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rrule: Option<InterchangeRule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exdates: Vec<String>,
    /// Auxiliary non-standard property carrying the February 29th policy
    /// for annual-by-date rules.
    #[serde(
        rename = "X-ALARMDECK-FEB29",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub feb29: Option<String>,
    /// Auxiliary non-standard property for repeat-at-login alarms; holds the
    /// encoded end date/time.
    #[serde(
        rename = "X-ALARMDECK-LOGIN",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub at_login_until: Option<String>,
    #[serde(rename = "templateName", default, skip_serializing_if = "Option::is_none")]
    pub template_name: Option<String>,
    #[serde(rename = "toBeArchived", default, skip_serializing_if = "std::ops::Not::not")]
    pub to_be_archived: bool,
}

fn weekday_code(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "MO",
        Weekday::Tue => "TU",
        Weekday::Wed => "WE",
        Weekday::Thu => "TH",
        Weekday::Fri => "FR",
        Weekday::Sat => "SA",
        Weekday::Sun => "SU",
    }
}

fn parse_weekday_code(code: &str) -> Result<Weekday, InfraError> {
    match code {
        "MO" => Ok(Weekday::Mon),
        "TU" => Ok(Weekday::Tue),
        "WE" => Ok(Weekday::Wed),
        "TH" => Ok(Weekday::Thu),
        "FR" => Ok(Weekday::Fri),
        "SA" => Ok(Weekday::Sat),
        "SU" => Ok(Weekday::Sun),
        other => Err(InfraError::InvalidEvent(format!(
            "invalid BYDAY weekday '{other}'"
        ))),
    }
}

fn encode_days(days: WeekdaySet) -> Vec<String> {
    days.iter().map(|day| weekday_code(day).to_string()).collect()
}

fn decode_days(by_day: &[String]) -> Result<WeekdaySet, InfraError> {
    let mut days = WeekdaySet::empty();
    for code in by_day {
        days.insert(parse_weekday_code(code.trim())?);
    }
    Ok(days)
}

fn encode_position(position: &MonthPos) -> String {
    let day = weekday_code(position.weekday);
    match position.ordinal {
        WeekOrdinal::Nth(n) => format!("{n}{day}"),
        WeekOrdinal::NthLast(n) => format!("-{n}{day}"),
        WeekOrdinal::Every => day.to_string(),
    }
}

fn decode_position(value: &str) -> Result<MonthPos, InfraError> {
    let value = value.trim();
    let split = value.len().saturating_sub(2);
    let (ordinal_part, day_part) = value.split_at(split);
    let weekday = parse_weekday_code(day_part)?;
    let ordinal = if ordinal_part.is_empty() {
        WeekOrdinal::Every
    } else {
        let ordinal: i8 = ordinal_part.parse().map_err(|_| {
            InfraError::InvalidEvent(format!("invalid BYDAY ordinal '{value}'"))
        })?;
        match ordinal {
            1..=5 => WeekOrdinal::Nth(ordinal as u8),
            -5..=-1 => WeekOrdinal::NthLast(ordinal.unsigned_abs()),
            _ => {
                return Err(InfraError::InvalidEvent(format!(
                    "BYDAY ordinal '{value}' out of range"
                )))
            }
        }
    };
    Ok(MonthPos { ordinal, weekday })
}

fn encode_month_day(day: MonthDay) -> i8 {
    match day {
        MonthDay::Day(day) => day as i8,
        MonthDay::Last => LAST_MONTH_DAY,
    }
}

fn decode_month_day(value: i8) -> Result<MonthDay, InfraError> {
    match value {
        1..=31 => Ok(MonthDay::Day(value as u8)),
        LAST_MONTH_DAY => Ok(MonthDay::Last),
        other => Err(InfraError::InvalidEvent(format!(
            "invalid BYMONTHDAY value {other}"
        ))),
    }
}

fn encode_months(months: MonthSet) -> Vec<u8> {
    months.iter().map(|month| month as u8).collect()
}

fn decode_months(by_month: &[u8]) -> Result<MonthSet, InfraError> {
    let mut months = MonthSet::empty();
    for month in by_month {
        if !(1..=12).contains(month) {
            return Err(InfraError::InvalidEvent(format!(
                "invalid BYMONTH value {month}"
            )));
        }
        months.insert(u32::from(*month));
    }
    Ok(months)
}

fn encode_until(date: NaiveDate, time: Option<NaiveTime>) -> String {
    match time {
        Some(time) => date.and_time(time).format(DATE_TIME_FORMAT).to_string(),
        None => date.format(DATE_FORMAT).to_string(),
    }
}

fn decode_until(value: &str) -> Result<(NaiveDate, Option<NaiveTime>), InfraError> {
    if let Ok(datetime) = NaiveDateTime::parse_from_str(value, DATE_TIME_FORMAT) {
        return Ok((datetime.date(), Some(datetime.time())));
    }
    let date = NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|error| {
        InfraError::InvalidEvent(format!("invalid UNTIL value '{value}': {error}"))
    })?;
    Ok((date, None))
}

fn encode_end(rule: &InterchangeRule, end: &EndCondition) -> InterchangeRule {
    let mut rule = rule.clone();
    match end {
        EndCondition::Indefinite => {}
        EndCondition::Count(count) => rule.count = Some(*count),
        EndCondition::Until { date, time } => rule.until = Some(encode_until(*date, *time)),
    }
    rule
}

fn decode_end(rule: &InterchangeRule) -> Result<EndCondition, InfraError> {
    match (&rule.count, &rule.until) {
        (Some(count), _) => Ok(EndCondition::Count(*count)),
        (None, Some(until)) => {
            let (date, time) = decode_until(until)?;
            Ok(EndCondition::Until { date, time })
        }
        (None, None) => Ok(EndCondition::Indefinite),
    }
}

fn base_rule(freq: &str, interval: u32) -> InterchangeRule {
    InterchangeRule {
        freq: freq.to_string(),
        interval,
        by_day: Vec::new(),
        by_month_day: Vec::new(),
        by_month: Vec::new(),
        count: None,
        until: None,
    }
}

/// Encode a recurrence into interchange fields. At-login rules are carried
/// by the auxiliary login property instead; `None` is returned for them and
/// for non-repeating rules.
fn encode_rule(rule: &RecurrenceRule) -> Option<InterchangeRule> {
    let encoded = match &rule.kind {
        RecurrenceKind::None | RecurrenceKind::AtLogin => return None,
        RecurrenceKind::Minutely => base_rule(FREQ_MINUTELY, rule.frequency),
        RecurrenceKind::Daily { days } => {
            let mut encoded = base_rule(FREQ_DAILY, rule.frequency);
            encoded.by_day = encode_days(*days);
            encoded
        }
        RecurrenceKind::Weekly { days } => {
            let mut encoded = base_rule(FREQ_WEEKLY, rule.frequency);
            encoded.by_day = encode_days(*days);
            encoded
        }
        RecurrenceKind::MonthlyByDate { day } => {
            let mut encoded = base_rule(FREQ_MONTHLY, rule.frequency);
            encoded.by_month_day = vec![encode_month_day(*day)];
            encoded
        }
        RecurrenceKind::MonthlyByPosition { positions } => {
            let mut encoded = base_rule(FREQ_MONTHLY, rule.frequency);
            encoded.by_day = positions.iter().map(encode_position).collect();
            encoded
        }
        RecurrenceKind::AnnualByDate { day, months, .. } => {
            let mut encoded = base_rule(FREQ_YEARLY, rule.frequency);
            encoded.by_month_day = vec![encode_month_day(*day)];
            encoded.by_month = encode_months(*months);
            encoded
        }
        RecurrenceKind::AnnualByPosition { positions, months } => {
            let mut encoded = base_rule(FREQ_YEARLY, rule.frequency);
            encoded.by_day = positions.iter().map(encode_position).collect();
            encoded.by_month = encode_months(*months);
            encoded
        }
    };
    Some(encode_end(&encoded, &rule.end))
}

fn decode_rule(rule: &InterchangeRule, feb29: Option<&str>) -> Result<RecurrenceRule, InfraError> {
    if rule.interval == 0 {
        return Err(InfraError::InvalidEvent(
            "INTERVAL must be at least 1".to_string(),
        ));
    }
    let kind = match rule.freq.trim().to_ascii_uppercase().as_str() {
        FREQ_MINUTELY => RecurrenceKind::Minutely,
        FREQ_DAILY => {
            let days = decode_days(&rule.by_day)?;
            RecurrenceKind::Daily {
                days: if days.is_empty() {
                    WeekdaySet::all()
                } else {
                    days
                },
            }
        }
        FREQ_WEEKLY => RecurrenceKind::Weekly {
            days: decode_days(&rule.by_day)?,
        },
        FREQ_MONTHLY => {
            if rule.by_day.is_empty() {
                let day = rule.by_month_day.first().copied().ok_or_else(|| {
                    InfraError::InvalidEvent("monthly rule without BYMONTHDAY or BYDAY".to_string())
                })?;
                RecurrenceKind::MonthlyByDate {
                    day: decode_month_day(day)?,
                }
            } else {
                let positions = rule
                    .by_day
                    .iter()
                    .map(|value| decode_position(value))
                    .collect::<Result<Vec<MonthPos>, InfraError>>()?;
                RecurrenceKind::MonthlyByPosition { positions }
            }
        }
        FREQ_YEARLY => {
            let months = decode_months(&rule.by_month)?;
            if rule.by_day.is_empty() {
                let day = rule.by_month_day.first().copied().ok_or_else(|| {
                    InfraError::InvalidEvent("yearly rule without BYMONTHDAY or BYDAY".to_string())
                })?;
                let feb29 = match feb29 {
                    None => Feb29Policy::None,
                    Some(FEB29_MAR1) => Feb29Policy::Mar1,
                    Some(FEB29_FEB28) => Feb29Policy::Feb28,
                    Some(other) => {
                        return Err(InfraError::InvalidEvent(format!(
                            "invalid Feb-29 policy '{other}'"
                        )))
                    }
                };
                RecurrenceKind::AnnualByDate {
                    day: decode_month_day(day)?,
                    months,
                    feb29,
                }
            } else {
                let positions = rule
                    .by_day
                    .iter()
                    .map(|value| decode_position(value))
                    .collect::<Result<Vec<MonthPos>, InfraError>>()?;
                RecurrenceKind::AnnualByPosition { positions, months }
            }
        }
        other => {
            return Err(InfraError::InvalidEvent(format!(
                "unsupported FREQ value '{other}'"
            )))
        }
    };
    let mut decoded = RecurrenceRule::new(kind);
    decoded.frequency = rule.interval;
    decoded.end = decode_end(rule)?;
    Ok(decoded)
}

pub fn encode_event(event: &AlarmEvent) -> InterchangeEvent {
    let dtstart = match event.start_time {
        Some(time) => event
            .start_date
            .and_time(time)
            .format(DATE_TIME_FORMAT)
            .to_string(),
        None => event.start_date.format(DATE_FORMAT).to_string(),
    };
    let action = match &event.action {
        AlarmAction::Message { text } => InterchangeAction::Message { text: text.clone() },
        AlarmAction::File { path } => InterchangeAction::File { path: path.clone() },
        AlarmAction::Command { command_line } => InterchangeAction::Command {
            command_line: command_line.clone(),
        },
        AlarmAction::Email {
            addresses,
            subject,
            body,
        } => InterchangeAction::Email {
            addresses: addresses.clone(),
            subject: subject.clone(),
            body: body.clone(),
        },
    };
    let mut feb29 = None;
    let mut at_login_until = None;
    let mut exdates = Vec::new();
    if let Some(rule) = &event.recurrence {
        if let RecurrenceKind::AnnualByDate {
            feb29: policy, ..
        } = &rule.kind
        {
            feb29 = match policy {
                Feb29Policy::None => None,
                Feb29Policy::Mar1 => Some(FEB29_MAR1.to_string()),
                Feb29Policy::Feb28 => Some(FEB29_FEB28.to_string()),
            };
        }
        if rule.kind == RecurrenceKind::AtLogin {
            at_login_until = Some(match &rule.end {
                EndCondition::Until { date, time } => encode_until(*date, *time),
                _ => String::new(),
            });
        }
        exdates = rule
            .exceptions()
            .iter()
            .map(|date| date.format(DATE_FORMAT).to_string())
            .collect();
    }
    InterchangeEvent {
        uid: event.id.clone(),
        category: event.category.as_str().to_string(),
        dtstart,
        enabled: event.enabled,
        action,
        rrule: event.recurrence.as_ref().and_then(encode_rule),
        exdates,
        feb29,
        at_login_until,
        template_name: event.template_name.clone(),
        to_be_archived: event.to_be_archived,
    }
}

pub fn decode_event(event: &InterchangeEvent) -> Result<AlarmEvent, InfraError> {
    let category = EventCategory::parse(&event.category).ok_or_else(|| {
        InfraError::InvalidEvent(format!("invalid category '{}'", event.category))
    })?;
    let (start_date, start_time) =
        match NaiveDateTime::parse_from_str(&event.dtstart, DATE_TIME_FORMAT) {
            Ok(datetime) => (datetime.date(), Some(datetime.time())),
            Err(_) => {
                let date =
                    NaiveDate::parse_from_str(&event.dtstart, DATE_FORMAT).map_err(|error| {
                        InfraError::InvalidEvent(format!(
                            "invalid DTSTART '{}': {error}",
                            event.dtstart
                        ))
                    })?;
                (date, None)
            }
        };
    let action = match &event.action {
        InterchangeAction::Message { text } => AlarmAction::Message { text: text.clone() },
        InterchangeAction::File { path } => AlarmAction::File { path: path.clone() },
        InterchangeAction::Command { command_line } => AlarmAction::Command {
            command_line: command_line.clone(),
        },
        InterchangeAction::Email {
            addresses,
            subject,
            body,
        } => AlarmAction::Email {
            addresses: addresses.clone(),
            subject: subject.clone(),
            body: body.clone(),
        },
    };

    let mut recurrence = match (&event.rrule, &event.at_login_until) {
        (Some(_), Some(_)) => {
            return Err(InfraError::InvalidEvent(
                "event carries both RRULE and at-login properties".to_string(),
            ))
        }
        (Some(rule), None) => Some(decode_rule(rule, event.feb29.as_deref())?),
        (None, Some(until)) => {
            let mut rule = RecurrenceRule::new(RecurrenceKind::AtLogin);
            if !until.is_empty() {
                let (date, time) = decode_until(until)?;
                rule.end = EndCondition::Until { date, time };
            }
            Some(rule)
        }
        (None, None) => None,
    };
    if let Some(rule) = &mut recurrence {
        let mut exdates = Vec::with_capacity(event.exdates.len());
        for value in &event.exdates {
            exdates.push(NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|error| {
                InfraError::InvalidEvent(format!("invalid EXDATE '{value}': {error}"))
            })?);
        }
        rule.set_exceptions(exdates);
    }

    Ok(AlarmEvent {
        id: event.uid.clone(),
        category,
        collection_id: UNASSIGNED_COLLECTION,
        action,
        start_date,
        start_time,
        enabled: event.enabled,
        recurrence,
        template_name: event.template_name.clone(),
        to_be_archived: event.to_be_archived,
    })
}
