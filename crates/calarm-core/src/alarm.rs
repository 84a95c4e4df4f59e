//! Calendar events and the alarms attached to them
//!
//! [`AlarmRecord`] is what external collaborators hand us (a calendar CRUD
//! layer, a JSON file). [`Alarm`] is the validated form the engine works
//! with: its fields are private, so every `Alarm` in existence has a lead
//! time of at least one minute and a known start instant.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Title used when the calendar reports an event without a summary
pub const UNTITLED_EVENT: &str = "No Title";

/// A calendar event as supplied by the calendar provider
///
/// Immutable from the engine's point of view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    /// Provider-assigned identifier
    pub id: String,

    /// Event summary
    #[serde(default = "default_title")]
    pub title: String,

    /// Start instant (timezone-aware)
    pub start: DateTime<FixedOffset>,

    /// End instant, if the provider reports one
    #[serde(default)]
    pub end: Option<DateTime<FixedOffset>>,

    #[serde(default)]
    pub location: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    /// Link back to the event in the provider's UI
    #[serde(default)]
    pub html_link: Option<String>,
}

impl CalendarEvent {
    /// Create an event with only the required fields set
    pub fn new(id: impl Into<String>, title: impl Into<String>, start: DateTime<FixedOffset>) -> Self {
        let title = title.into();
        Self {
            id: id.into(),
            title: if title.trim().is_empty() {
                default_title()
            } else {
                title
            },
            start,
            end: None,
            location: None,
            description: None,
            html_link: None,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_end(mut self, end: DateTime<FixedOffset>) -> Self {
        self.end = Some(end);
        self
    }
}

fn default_title() -> String {
    UNTITLED_EVENT.to_string()
}

/// Identifier of an alarm
///
/// Identifiers are never reused: a deleted and recreated alarm gets a new id,
/// so its dedup marker starts fresh.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlarmId(String);

impl AlarmId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AlarmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AlarmId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for AlarmId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Raw alarm record as stored by the surrounding CRUD layer
///
/// Nothing here is trusted: lead minutes may be zero or negative and the
/// start may be missing. Convert with [`Alarm::try_from`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmRecord {
    pub id: String,

    /// Owner of the alarm (the calendar account's e-mail)
    #[serde(default, alias = "email", skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,

    pub event_id: String,

    /// Event title captured when the alarm was created
    #[serde(default)]
    pub event_title: String,

    /// Event start captured when the alarm was created, RFC 3339 or `YYYY-MM-DD`
    #[serde(default)]
    pub event_start: Option<String>,

    /// Lead time in minutes
    pub alarm_minutes_before: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// A validated alarm: fire `lead_minutes` before `event_start`
///
/// The title and start are denormalized copies taken when the alarm was
/// created and may drift from the live event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "AlarmRecord", into = "AlarmRecord")]
pub struct Alarm {
    id: AlarmId,
    event_id: String,
    event_title: String,
    event_start: DateTime<FixedOffset>,
    lead_minutes: u32,
    trigger_instant: DateTime<Utc>,
    owner: Option<String>,
    created_at: Option<DateTime<Utc>>,
}

impl Alarm {
    /// Create an alarm
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAlarm`] when the id is empty, the lead time is
    /// below one minute, or the trigger instant is not representable.
    pub fn new(
        id: impl Into<AlarmId>,
        event_id: impl Into<String>,
        event_title: impl Into<String>,
        event_start: DateTime<FixedOffset>,
        lead_minutes: i64,
    ) -> Result<Self> {
        let id = id.into();
        if id.as_str().trim().is_empty() {
            return Err(Error::invalid_alarm("alarm id cannot be empty"));
        }

        if lead_minutes < 1 {
            return Err(Error::invalid_alarm(format!(
                "alarm {}: lead time must be at least 1 minute, got {}",
                id, lead_minutes
            )));
        }
        let lead_minutes = u32::try_from(lead_minutes).map_err(|_| {
            Error::invalid_alarm(format!(
                "alarm {}: lead time {} minutes is out of range",
                id, lead_minutes
            ))
        })?;

        let trigger_instant = event_start
            .with_timezone(&Utc)
            .checked_sub_signed(Duration::minutes(i64::from(lead_minutes)))
            .ok_or_else(|| {
                Error::invalid_alarm(format!("alarm {}: trigger instant out of range", id))
            })?;

        let event_title = event_title.into();
        Ok(Self {
            id,
            event_id: event_id.into(),
            event_title: if event_title.trim().is_empty() {
                default_title()
            } else {
                event_title
            },
            event_start,
            lead_minutes,
            trigger_instant,
            owner: None,
            created_at: None,
        })
    }

    /// Create an alarm for `event`, capturing its current title and start
    pub fn for_event(
        id: impl Into<AlarmId>,
        event: &CalendarEvent,
        lead_minutes: i64,
    ) -> Result<Self> {
        Self::new(id, event.id.clone(), event.title.clone(), event.start, lead_minutes)
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn id(&self) -> &AlarmId {
        &self.id
    }

    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn event_title(&self) -> &str {
        &self.event_title
    }

    pub fn event_start(&self) -> DateTime<FixedOffset> {
        self.event_start
    }

    /// Event start normalized to UTC
    pub fn event_start_utc(&self) -> DateTime<Utc> {
        self.event_start.with_timezone(&Utc)
    }

    pub fn lead_minutes(&self) -> u32 {
        self.lead_minutes
    }

    /// `event_start - lead_minutes`; always strictly before the event start
    pub fn trigger_instant(&self) -> DateTime<Utc> {
        self.trigger_instant
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }
}

impl TryFrom<AlarmRecord> for Alarm {
    type Error = Error;

    fn try_from(record: AlarmRecord) -> Result<Self> {
        let start = record
            .event_start
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                Error::invalid_alarm(format!("alarm {}: missing event start", record.id))
            })?;
        let start = parse_event_start(start)
            .map_err(|e| Error::invalid_alarm(format!("alarm {}: {}", record.id, e)))?;

        let mut alarm = Alarm::new(
            record.id,
            record.event_id,
            record.event_title,
            start,
            record.alarm_minutes_before,
        )?;
        alarm.owner = record.owner;
        alarm.created_at = record.created_at;
        Ok(alarm)
    }
}

impl From<Alarm> for AlarmRecord {
    fn from(alarm: Alarm) -> Self {
        Self {
            id: alarm.id.0,
            owner: alarm.owner,
            event_id: alarm.event_id,
            event_title: alarm.event_title,
            event_start: Some(alarm.event_start.to_rfc3339()),
            alarm_minutes_before: i64::from(alarm.lead_minutes),
            created_at: alarm.created_at,
        }
    }
}

/// Parse an event start as reported by a calendar provider
///
/// Timed events carry an RFC 3339 timestamp. All-day events carry a bare
/// `YYYY-MM-DD` date and are treated as starting at 00:00 UTC.
pub fn parse_event_start(value: &str) -> Result<DateTime<FixedOffset>> {
    let value = value.trim();

    if let Ok(start) = DateTime::parse_from_rfc3339(value) {
        return Ok(start);
    }

    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
        Error::invalid_alarm(format!("unrecognized event start '{}'", value))
    })?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| Error::invalid_alarm(format!("unrecognized event start '{}'", value)))?;

    Ok(midnight.and_utc().fixed_offset())
}
