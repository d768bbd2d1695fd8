use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::ical::model::{
    CalendarRecord, MAX_REMINDERS, REMINDER_OFF, RecordKind, Recurrence, Reminder,
    ReminderChannel,
};

/// `flags` bit marking an all-day event.
pub const FLAG_ALL_DAY: i64 = 1;

/// Event type assigned to events that arrive without one.
pub const REGULAR_EVENT_TYPE_ID: i64 = 1;

/// `source` of rows created by a calendar file import.
pub const SOURCE_IMPORTED_ICS: &str = "imported-ics";

/// A registered user.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    pub password_hash: String,
    pub created_at: NaiveDateTime,
}

/// A stored event or task row.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EventRow {
    pub id: String,
    pub user_id: String,
    pub kind: i64,
    pub start_ts: i64,
    pub end_ts: i64,
    pub title: String,
    pub location: String,
    pub description: String,
    pub reminder_1_minutes: i64,
    pub reminder_2_minutes: i64,
    pub reminder_3_minutes: i64,
    pub reminder_1_type: i64,
    pub reminder_2_type: i64,
    pub reminder_3_type: i64,
    pub repeat_interval: i64,
    pub repeat_rule: i64,
    pub repeat_limit: i64,
    pub import_id: String,
    pub flags: i64,
    pub event_type: i64,
    pub source: String,
    pub last_updated: i64,
    pub created_at: NaiveDateTime,
}

impl EventRow {
    /// Convert a stored row into the codec model.
    pub fn into_record(self) -> CalendarRecord {
        let reminders = [
            (self.reminder_1_minutes, self.reminder_1_type),
            (self.reminder_2_minutes, self.reminder_2_type),
            (self.reminder_3_minutes, self.reminder_3_type),
        ]
        .into_iter()
        .filter(|(minutes, _)| *minutes != REMINDER_OFF)
        .map(|(minutes, channel)| Reminder::new(minutes, ReminderChannel::from_code(channel)))
        .collect();

        let recurrence = (self.repeat_interval > 0).then_some(Recurrence {
            interval_seconds: self.repeat_interval,
            rule_code: self.repeat_rule,
            limit_ts: self.repeat_limit,
        });

        CalendarRecord {
            kind: RecordKind::from_code(self.kind),
            external_id: non_empty(self.import_id),
            row_id: Some(self.id),
            title: self.title,
            location: non_empty(self.location),
            description: non_empty(self.description),
            start_ts: self.start_ts,
            end_ts: self.end_ts,
            all_day: self.flags & FLAG_ALL_DAY != 0,
            reminders,
            recurrence,
            last_modified: (self.last_updated > 0).then_some(self.last_updated),
            created_at: Some(self.created_at.and_utc()),
        }
    }
}

/// Column values for inserting a record, with reminders spread over the
/// three fixed slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    pub kind: i64,
    pub start_ts: i64,
    pub end_ts: i64,
    pub title: String,
    pub location: String,
    pub description: String,
    pub reminder_minutes: [i64; MAX_REMINDERS],
    pub reminder_types: [i64; MAX_REMINDERS],
    pub repeat_interval: i64,
    pub repeat_rule: i64,
    pub repeat_limit: i64,
    pub import_id: String,
    pub flags: i64,
    pub created_at: Option<NaiveDateTime>,
}

impl NewEvent {
    pub fn from_record(record: &CalendarRecord) -> Self {
        let mut reminder_minutes = [REMINDER_OFF; MAX_REMINDERS];
        let mut reminder_types = [ReminderChannel::Notification.as_code(); MAX_REMINDERS];
        for (slot, reminder) in record.reminders.iter().take(MAX_REMINDERS).enumerate() {
            reminder_minutes[slot] = reminder.minutes;
            reminder_types[slot] = reminder.channel.as_code();
        }

        let recurrence = record.recurrence.unwrap_or(Recurrence {
            interval_seconds: 0,
            rule_code: 0,
            limit_ts: 0,
        });

        Self {
            kind: record.kind.as_code(),
            start_ts: record.start_ts,
            end_ts: record.end_ts,
            title: record.title.clone(),
            location: record.location.clone().unwrap_or_default(),
            description: record.description.clone().unwrap_or_default(),
            reminder_minutes,
            reminder_types,
            repeat_interval: recurrence.interval_seconds,
            repeat_rule: recurrence.rule_code,
            repeat_limit: recurrence.limit_ts,
            import_id: record.external_id.clone().unwrap_or_default(),
            flags: if record.all_day { FLAG_ALL_DAY } else { 0 },
            created_at: record.created_at.map(|c| c.naive_utc()),
        }
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn row() -> EventRow {
        EventRow {
            id: "row-1".to_string(),
            user_id: "user-1".to_string(),
            kind: 1,
            start_ts: 1_700_000_000,
            end_ts: 1_700_003_600,
            title: "Meal prep".to_string(),
            location: String::new(),
            description: "Chili".to_string(),
            reminder_1_minutes: 10,
            reminder_2_minutes: REMINDER_OFF,
            reminder_3_minutes: 30,
            reminder_1_type: 0,
            reminder_2_type: 0,
            reminder_3_type: 1,
            repeat_interval: 604_800,
            repeat_rule: 1,
            repeat_limit: 0,
            import_id: String::new(),
            flags: FLAG_ALL_DAY | 8,
            event_type: REGULAR_EVENT_TYPE_ID,
            source: "shiftcal".to_string(),
            last_updated: 0,
            created_at: NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
        }
    }

    #[test]
    fn test_row_into_record() {
        let record = row().into_record();
        assert_eq!(record.kind, RecordKind::Task);
        assert_eq!(record.row_id.as_deref(), Some("row-1"));
        assert_eq!(record.external_id, None);
        assert_eq!(record.location, None);
        assert_eq!(record.description.as_deref(), Some("Chili"));
        assert!(record.all_day);
        assert_eq!(
            record.reminders,
            vec![
                Reminder::new(10, ReminderChannel::Notification),
                Reminder::new(30, ReminderChannel::Email),
            ]
        );
        assert_eq!(record.recurrence.map(|r| r.rule_code), Some(1));
        assert_eq!(record.last_modified, None);
        assert_eq!(record.created_at.map(|c| c.timestamp()), Some(1_704_067_200));
    }

    #[test]
    fn test_row_without_recurrence() {
        let mut r = row();
        r.repeat_interval = 0;
        assert!(r.into_record().recurrence.is_none());
    }

    #[test]
    fn test_new_event_from_record() {
        let record = CalendarRecord {
            title: "Nap".to_string(),
            external_id: Some("nap@x".to_string()),
            start_ts: 10,
            end_ts: 20,
            all_day: true,
            reminders: vec![
                Reminder::new(5, ReminderChannel::Email),
                Reminder::new(1, ReminderChannel::Other(7)),
            ],
            ..Default::default()
        };

        let new = NewEvent::from_record(&record);
        assert_eq!(new.reminder_minutes, [5, 1, REMINDER_OFF]);
        assert_eq!(new.reminder_types, [1, 7, 0]);
        assert_eq!(new.flags, FLAG_ALL_DAY);
        assert_eq!(new.import_id, "nap@x");
        assert_eq!(new.location, "");
        assert_eq!(new.repeat_interval, 0);
        assert_eq!(new.created_at, None);
    }
}
