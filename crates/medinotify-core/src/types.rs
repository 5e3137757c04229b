//! Notification record: the durable data model managed by the engine.

use chrono::{DateTime, Months, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Recurrence unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrequencyUnit {
    Minute,
    Hour,
    Day,
    Week,
    Month,
}

impl FrequencyUnit {
    pub const ALL: [FrequencyUnit; 5] = [
        FrequencyUnit::Minute,
        FrequencyUnit::Hour,
        FrequencyUnit::Day,
        FrequencyUnit::Week,
        FrequencyUnit::Month,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FrequencyUnit::Minute => "minute",
            FrequencyUnit::Hour => "hour",
            FrequencyUnit::Day => "day",
            FrequencyUnit::Week => "week",
            FrequencyUnit::Month => "month",
        }
    }

    /// Move `from` forward by `count` units. Months use calendar arithmetic
    /// (Jan 31 + 1 month = last day of February).
    pub fn advance(&self, from: DateTime<Utc>, count: u32) -> Option<DateTime<Utc>> {
        let n = i64::from(count);
        match self {
            FrequencyUnit::Minute => from.checked_add_signed(chrono::Duration::minutes(n)),
            FrequencyUnit::Hour => from.checked_add_signed(chrono::Duration::hours(n)),
            FrequencyUnit::Day => from.checked_add_signed(chrono::Duration::days(n)),
            FrequencyUnit::Week => from.checked_add_signed(chrono::Duration::weeks(n)),
            FrequencyUnit::Month => from.checked_add_months(Months::new(count)),
        }
    }
}

impl fmt::Display for FrequencyUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FrequencyUnit {
    type Err = String;

    /// Case-insensitive, with or without a trailing "s".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let singular = lower.strip_suffix('s').unwrap_or(&lower);
        FrequencyUnit::ALL
            .into_iter()
            .find(|u| u.as_str() == singular)
            .ok_or_else(|| format!("unknown frequency unit '{s}'"))
    }
}

/// Canonical recurrence: every `count` `unit`s.
///
/// `label` keeps the unit exactly as the user typed it ("Days") for messages;
/// equality only looks at `count` and `unit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frequency {
    pub count: u32,
    pub unit: FrequencyUnit,
    #[serde(default)]
    pub label: String,
}

impl Frequency {
    pub fn new(count: u32, unit: FrequencyUnit) -> Self {
        Self {
            count,
            unit,
            label: unit.as_str().to_string(),
        }
    }

    /// Next occurrence after `from`.
    pub fn next_after(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.unit.advance(from, self.count)
    }

    /// Human-readable form using the user's spelling, e.g. "every 2 Days".
    pub fn describe(&self) -> String {
        let label = if self.label.is_empty() {
            self.unit.as_str()
        } else {
            self.label.as_str()
        };
        format!("every {} {}", self.count, label)
    }
}

impl PartialEq for Frequency {
    fn eq(&self, other: &Self) -> bool {
        self.count == other.count && self.unit == other.unit
    }
}

impl Eq for Frequency {}

/// Delivery priority carried in schedule entries and job payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "normal" | "" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            "urgent" => Ok(Priority::Urgent),
            other => Err(format!("unknown priority '{other}'")),
        }
    }
}

/// Outcome of one scheduled occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleStatus {
    Pending,
    Sent,
    Failed,
}

impl ScheduleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleStatus::Pending => "pending",
            ScheduleStatus::Sent => "sent",
            ScheduleStatus::Failed => "failed",
        }
    }
}

impl FromStr for ScheduleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ScheduleStatus::Pending),
            "sent" => Ok(ScheduleStatus::Sent),
            "failed" => Ok(ScheduleStatus::Failed),
            other => Err(format!("unknown schedule status '{other}'")),
        }
    }
}

/// One entry of a notification's schedule history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEntry {
    pub scheduled_instant: DateTime<Utc>,
    pub priority: Priority,
    pub status: ScheduleStatus,
}

impl ScheduleEntry {
    pub fn pending(scheduled_instant: DateTime<Utc>, priority: Priority) -> Self {
        Self {
            scheduled_instant,
            priority,
            status: ScheduleStatus::Pending,
        }
    }
}

/// How a notification is dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleKind {
    Immediate,
    Scheduled,
    Recurring,
}

/// Durable notification record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Assigned at creation, immutable.
    pub id: String,
    pub sender_identity: String,
    pub recipient_identity: String,
    pub content: String,
    pub is_future: bool,
    /// Present only when `is_future`.
    pub scheduled_date: Option<NaiveDate>,
    /// Present only when `is_future`.
    pub scheduled_time: Option<NaiveTime>,
    /// Date and time exactly as requested (`"2025-06-01 09:30"`), kept for every
    /// future record, including ones whose date does not exist on the calendar.
    #[serde(default)]
    pub requested_schedule: Option<String>,
    pub is_recurring: bool,
    /// Present iff `is_recurring`.
    pub frequency: Option<Frequency>,
    #[serde(default)]
    pub schedule_history: Vec<ScheduleEntry>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Fresh record identity.
    pub fn new_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    pub fn schedule_kind(&self) -> ScheduleKind {
        if self.is_recurring {
            ScheduleKind::Recurring
        } else if self.is_future {
            ScheduleKind::Scheduled
        } else {
            ScheduleKind::Immediate
        }
    }

    /// Most recently appended schedule entry.
    pub fn latest_entry(&self) -> Option<&ScheduleEntry> {
        self.schedule_history.last()
    }

    /// True when an occurrence of this notification should currently be in the queue:
    /// the newest entry is still pending, or it is an immediate send with no outcome yet.
    pub fn awaiting_dispatch(&self) -> bool {
        match self.latest_entry() {
            Some(entry) => entry.status == ScheduleStatus::Pending,
            None => !self.is_future,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_unit_from_str_accepts_plural_and_case() {
        assert_eq!("Days".parse::<FrequencyUnit>().unwrap(), FrequencyUnit::Day);
        assert_eq!("minute".parse::<FrequencyUnit>().unwrap(), FrequencyUnit::Minute);
        assert_eq!(" WEEKS ".parse::<FrequencyUnit>().unwrap(), FrequencyUnit::Week);
        assert!("fortnight".parse::<FrequencyUnit>().is_err());
    }

    #[test]
    fn test_month_advance_clamps_to_end_of_month() {
        let jan31 = Utc.with_ymd_and_hms(2025, 1, 31, 9, 0, 0).unwrap();
        let next = Frequency::new(1, FrequencyUnit::Month).next_after(jan31).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 2, 28, 9, 0, 0).unwrap());
    }

    #[test]
    fn test_frequency_equality_ignores_label() {
        let mut typed = Frequency::new(3, FrequencyUnit::Day);
        typed.label = "Days".into();
        assert_eq!(typed, Frequency::new(3, FrequencyUnit::Day));
        assert_eq!(typed.describe(), "every 3 Days");
    }

    #[test]
    fn test_awaiting_dispatch() {
        let mut n = Notification {
            id: Notification::new_id(),
            sender_identity: "doctor@clinic.org".into(),
            recipient_identity: "patient@mail.com".into(),
            content: "Your results are ready".into(),
            is_future: false,
            scheduled_date: None,
            scheduled_time: None,
            requested_schedule: None,
            is_recurring: false,
            frequency: None,
            schedule_history: vec![],
            created_at: Utc::now(),
        };
        assert!(n.awaiting_dispatch());
        assert_eq!(n.schedule_kind(), ScheduleKind::Immediate);

        n.schedule_history.push(ScheduleEntry {
            scheduled_instant: n.created_at,
            priority: Priority::Normal,
            status: ScheduleStatus::Sent,
        });
        assert!(!n.awaiting_dispatch());

        n.is_future = true;
        n.schedule_history.clear();
        assert!(!n.awaiting_dispatch());
        n.schedule_history.push(ScheduleEntry::pending(n.created_at, Priority::High));
        assert!(n.awaiting_dispatch());
    }

    #[test]
    fn test_notification_serializes_camel_case() {
        let n = Notification {
            id: "n-1".into(),
            sender_identity: "a@b.com".into(),
            recipient_identity: "c@d.com".into(),
            content: "hi".into(),
            is_future: false,
            scheduled_date: None,
            scheduled_time: None,
            requested_schedule: None,
            is_recurring: true,
            frequency: Some(Frequency::new(10, FrequencyUnit::Minute)),
            schedule_history: vec![],
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["recipientIdentity"], "c@d.com");
        assert_eq!(json["isRecurring"], true);
        assert_eq!(json["frequency"]["unit"], "minute");
        assert!(json["scheduledDate"].is_null());
    }
}
