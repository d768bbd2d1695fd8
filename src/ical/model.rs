use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sentinel minutes value meaning "no reminder in this slot".
pub const REMINDER_OFF: i64 = -1;

/// Maximum number of reminders a record carries.
pub const MAX_REMINDERS: usize = 3;

/// Which wrapper block a record is exchanged in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    #[default]
    Event,
    Task,
}

impl RecordKind {
    pub fn begin_marker(&self) -> &'static str {
        match self {
            RecordKind::Event => "BEGIN:VEVENT",
            RecordKind::Task => "BEGIN:VTODO",
        }
    }

    pub fn end_marker(&self) -> &'static str {
        match self {
            RecordKind::Event => "END:VEVENT",
            RecordKind::Task => "END:VTODO",
        }
    }

    /// Storage code (`0` event, `1` task).
    pub fn as_code(&self) -> i64 {
        match self {
            RecordKind::Event => 0,
            RecordKind::Task => 1,
        }
    }

    /// Parse a storage code. Unknown codes are treated as events.
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => RecordKind::Task,
            _ => RecordKind::Event,
        }
    }
}

/// Delivery channel of a reminder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderChannel {
    Notification,
    Email,
    /// A stored channel code this exporter has no alarm action for.
    Other(i64),
}

impl ReminderChannel {
    pub fn as_code(&self) -> i64 {
        match self {
            ReminderChannel::Notification => 0,
            ReminderChannel::Email => 1,
            ReminderChannel::Other(code) => *code,
        }
    }

    pub fn from_code(code: i64) -> Self {
        match code {
            0 => ReminderChannel::Notification,
            1 => ReminderChannel::Email,
            other => ReminderChannel::Other(other),
        }
    }
}

/// A reminder fired `minutes` before the start of the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    pub minutes: i64,
    pub channel: ReminderChannel,
}

impl Reminder {
    pub fn new(minutes: i64, channel: ReminderChannel) -> Self {
        Self { minutes, channel }
    }

    pub fn is_off(&self) -> bool {
        self.minutes == REMINDER_OFF
    }
}

/// The closed set of repetition frequencies with an interchange encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Frequency {
    pub const DAILY_SECONDS: i64 = 86_400;
    pub const WEEKLY_SECONDS: i64 = 604_800;
    /// Thirty days plus one second; not calendar-month aware.
    pub const MONTHLY_SECONDS: i64 = 2_592_001;
    pub const YEARLY_SECONDS: i64 = 31_536_000;

    pub fn from_interval(seconds: i64) -> Option<Self> {
        match seconds {
            Self::DAILY_SECONDS => Some(Frequency::Daily),
            Self::WEEKLY_SECONDS => Some(Frequency::Weekly),
            Self::MONTHLY_SECONDS => Some(Frequency::Monthly),
            Self::YEARLY_SECONDS => Some(Frequency::Yearly),
            _ => None,
        }
    }

    pub fn interval(&self) -> i64 {
        match self {
            Frequency::Daily => Self::DAILY_SECONDS,
            Frequency::Weekly => Self::WEEKLY_SECONDS,
            Frequency::Monthly => Self::MONTHLY_SECONDS,
            Frequency::Yearly => Self::YEARLY_SECONDS,
        }
    }

    pub fn rrule_token(&self) -> &'static str {
        match self {
            Frequency::Daily => "DAILY",
            Frequency::Weekly => "WEEKLY",
            Frequency::Monthly => "MONTHLY",
            Frequency::Yearly => "YEARLY",
        }
    }

    pub fn from_rrule_token(token: &str) -> Option<Self> {
        match token {
            "DAILY" => Some(Frequency::Daily),
            "WEEKLY" => Some(Frequency::Weekly),
            "MONTHLY" => Some(Frequency::Monthly),
            "YEARLY" => Some(Frequency::Yearly),
            _ => None,
        }
    }
}

/// A recurrence declaration. Occurrences are never expanded here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recurrence {
    pub interval_seconds: i64,
    pub rule_code: i64,
    /// `0` means unbounded.
    pub limit_ts: i64,
}

impl Recurrence {
    pub fn frequency(&self) -> Option<Frequency> {
        Frequency::from_interval(self.interval_seconds)
    }
}

/// The unit exchanged by the decoder and the encoder.
///
/// `start_ts` and `end_ts` are epoch seconds. Inverted ranges are passed
/// through untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarRecord {
    pub kind: RecordKind,
    pub external_id: Option<String>,
    /// Local storage identifier, used for the fallback UID on export.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_id: Option<String>,
    pub title: String,
    pub location: Option<String>,
    pub description: Option<String>,
    pub start_ts: i64,
    pub end_ts: i64,
    pub all_day: bool,
    pub reminders: Vec<Reminder>,
    pub recurrence: Option<Recurrence>,
    pub last_modified: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
}

impl CalendarRecord {
    /// Whether the record has every field a decoded record requires.
    pub fn is_complete(&self) -> bool {
        !self.title.is_empty() && self.start_ts != 0 && self.end_ts != 0
    }

    /// Reminders that should be exported: slots not switched off, capped at
    /// [`MAX_REMINDERS`].
    pub fn active_reminders(&self) -> impl Iterator<Item = &Reminder> {
        self.reminders
            .iter()
            .filter(|r| !r.is_off())
            .take(MAX_REMINDERS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_markers() {
        assert_eq!(RecordKind::Event.begin_marker(), "BEGIN:VEVENT");
        assert_eq!(RecordKind::Task.end_marker(), "END:VTODO");
    }

    #[test]
    fn test_kind_codes() {
        assert_eq!(RecordKind::from_code(RecordKind::Task.as_code()), RecordKind::Task);
        assert_eq!(RecordKind::from_code(7), RecordKind::Event);
    }

    #[test]
    fn test_channel_codes() {
        assert_eq!(ReminderChannel::from_code(0), ReminderChannel::Notification);
        assert_eq!(ReminderChannel::from_code(1), ReminderChannel::Email);
        assert_eq!(ReminderChannel::from_code(4), ReminderChannel::Other(4));
        assert_eq!(ReminderChannel::Other(4).as_code(), 4);
    }

    #[test]
    fn test_frequency_intervals() {
        assert_eq!(Frequency::from_interval(86_400), Some(Frequency::Daily));
        assert_eq!(Frequency::from_interval(2_592_001), Some(Frequency::Monthly));
        // A plain 30-day interval is not the monthly constant
        assert_eq!(Frequency::from_interval(2_592_000), None);
        assert_eq!(Frequency::from_interval(12_345), None);
        assert_eq!(Frequency::Yearly.interval(), 31_536_000);
    }

    #[test]
    fn test_frequency_tokens() {
        for freq in [
            Frequency::Daily,
            Frequency::Weekly,
            Frequency::Monthly,
            Frequency::Yearly,
        ] {
            assert_eq!(Frequency::from_rrule_token(freq.rrule_token()), Some(freq));
        }
        assert_eq!(Frequency::from_rrule_token("HOURLY"), None);
    }

    #[test]
    fn test_is_complete() {
        let mut record = CalendarRecord {
            title: "Night shift".to_string(),
            start_ts: 1_700_000_000,
            end_ts: 1_700_030_000,
            ..Default::default()
        };
        assert!(record.is_complete());
        record.end_ts = 0;
        assert!(!record.is_complete());
    }

    #[test]
    fn test_active_reminders_skip_off_and_cap() {
        let record = CalendarRecord {
            reminders: vec![
                Reminder::new(REMINDER_OFF, ReminderChannel::Notification),
                Reminder::new(5, ReminderChannel::Notification),
                Reminder::new(10, ReminderChannel::Email),
                Reminder::new(15, ReminderChannel::Notification),
                Reminder::new(20, ReminderChannel::Notification),
            ],
            ..Default::default()
        };
        let minutes: Vec<i64> = record.active_reminders().map(|r| r.minutes).collect();
        assert_eq!(minutes, vec![5, 10, 15]);
    }
}
