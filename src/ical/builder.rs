use uuid::Uuid;

use super::escape::escape;
use super::model::{CalendarRecord, ReminderChannel};
use super::time;

/// Product identifier written into every export.
pub const PRODID: &str = "-//ShiftCal//Calendar Export//EN";

/// Domain suffix of generated UIDs.
const UID_DOMAIN: &str = "shiftcal";

/// Content lines longer than this many octets are folded.
const FOLD_OCTETS: usize = 75;

/// Encode records into a complete VCALENDAR.
///
/// Total: fields the format cannot carry (unknown recurrence intervals,
/// unknown reminder channels) are left out rather than failing the export.
pub fn encode(records: &[CalendarRecord]) -> String {
    let mut lines = vec![
        "BEGIN:VCALENDAR".to_string(),
        "VERSION:2.0".to_string(),
        format!("PRODID:{PRODID}"),
        "CALSCALE:GREGORIAN".to_string(),
        "METHOD:PUBLISH".to_string(),
    ];

    for record in records {
        push_record(&mut lines, record);
    }

    lines.push("END:VCALENDAR".to_string());

    let folded: Vec<String> = lines.iter().map(|l| fold_line(l)).collect();
    folded.join("\r\n") + "\r\n"
}

fn push_record(lines: &mut Vec<String>, record: &CalendarRecord) {
    lines.push(record.kind.begin_marker().to_string());
    lines.push(format!("UID:{}", record_uid(record)));

    if record.all_day {
        lines.push(format!(
            "DTSTART;VALUE=DATE:{}",
            time::format_date(record.start_ts)
        ));
        lines.push(format!("DTEND;VALUE=DATE:{}", time::format_date(record.end_ts)));
    } else {
        lines.push(format!("DTSTART:{}", time::format_local(record.start_ts)));
        lines.push(format!("DTEND:{}", time::format_local(record.end_ts)));
    }

    if !record.title.is_empty() {
        lines.push(format!("SUMMARY:{}", escape(&record.title)));
    }
    if let Some(location) = record.location.as_deref().filter(|l| !l.is_empty()) {
        lines.push(format!("LOCATION:{}", escape(location)));
    }
    if let Some(description) = record.description.as_deref().filter(|d| !d.is_empty()) {
        lines.push(format!("DESCRIPTION:{}", escape(description)));
    }

    for reminder in record.active_reminders() {
        lines.push("BEGIN:VALARM".to_string());
        lines.push(format!("TRIGGER:-PT{}M", reminder.minutes));
        match reminder.channel {
            ReminderChannel::Notification => {
                lines.push("ACTION:DISPLAY".to_string());
                lines.push("DESCRIPTION:Reminder".to_string());
            }
            ReminderChannel::Email => {
                lines.push("ACTION:EMAIL".to_string());
                lines.push("DESCRIPTION:Email reminder".to_string());
            }
            // The trigger alone is still worth exporting
            ReminderChannel::Other(_) => {}
        }
        lines.push("END:VALARM".to_string());
    }

    if let Some(recurrence) = &record.recurrence {
        if let Some(frequency) = recurrence.frequency() {
            let mut rrule = format!("RRULE:FREQ={}", frequency.rrule_token());
            if recurrence.limit_ts != 0 {
                rrule.push_str(&format!(";UNTIL={}", time::format_utc(recurrence.limit_ts)));
            }
            lines.push(rrule);
        }
    }

    if let Some(modified) = record.last_modified {
        lines.push(format!("LAST-MODIFIED:{}", time::format_utc(modified)));
    }
    if let Some(created) = record.created_at {
        lines.push(format!("CREATED:{}", created.format("%Y%m%dT%H%M%SZ")));
    }

    lines.push(record.kind.end_marker().to_string());
}

/// The record's own UID, else one derived from its storage id, else a fresh
/// one.
fn record_uid(record: &CalendarRecord) -> String {
    if let Some(uid) = record.external_id.as_deref().filter(|u| !u.is_empty()) {
        return uid.to_string();
    }
    match record.row_id.as_deref() {
        Some(row_id) => format!("event-{row_id}@{UID_DOMAIN}"),
        None => generate_uid(),
    }
}

/// Generate a new unique event UID.
pub fn generate_uid() -> String {
    format!("{}@{UID_DOMAIN}", Uuid::new_v4())
}

/// Fold a content line at 75 octets, never splitting a UTF-8 character.
/// Continuation lines start with a single space.
fn fold_line(line: &str) -> String {
    if line.len() <= FOLD_OCTETS {
        return line.to_string();
    }

    let mut out = String::with_capacity(line.len() + line.len() / FOLD_OCTETS * 3);
    let mut width = 0;

    for c in line.chars() {
        let len = c.len_utf8();
        if width + len > FOLD_OCTETS {
            // The leading space counts towards the continuation's octets
            out.push_str("\r\n ");
            width = 1;
        }
        out.push(c);
        width += len;
    }

    out
}
