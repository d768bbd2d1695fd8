use chrono::DateTime;
use serde::Serialize;

use super::escape::unescape;
use super::model::{
    CalendarRecord, Frequency, MAX_REMINDERS, RecordKind, Recurrence, Reminder, ReminderChannel,
};
use super::time::{self, Boundary};

/// Why a line, alarm or block was left out of the decoded output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// A content line inside a block had no `:` separator.
    MissingColon,
    /// A start, end or due value had no recognizable date shape.
    UnparsableDate,
    /// A folded continuation line with no line before it to continue.
    OrphanContinuation,
    /// A block closed without a title, start and end.
    IncompleteRecord,
    /// A block was never closed, or was reopened before closing.
    UnterminatedBlock,
    /// An alarm whose trigger is not a relative offset before the start.
    UnsupportedTrigger,
    /// An alarm beyond the reminder limit.
    TooManyReminders,
    /// A close marker for a block kind other than the open one.
    MismatchedEnd,
}

/// One diagnostic entry; `line` is the 1-based physical line the skipped
/// item started on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Skip {
    pub line: usize,
    pub reason: SkipReason,
}

/// Decoder output with the diagnostic side-channel.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Decoded {
    pub records: Vec<CalendarRecord>,
    pub skipped: Vec<Skip>,
}

/// Decode calendar text into records.
///
/// Never fails: malformed lines and incomplete blocks are dropped, so the
/// result can hold fewer records than there are blocks in the input.
pub fn decode(raw: &str) -> Vec<CalendarRecord> {
    decode_with_diagnostics(raw).records
}

/// Decode calendar text, also reporting everything that was dropped.
pub fn decode_with_diagnostics(raw: &str) -> Decoded {
    let mut skipped = Vec::new();
    let lines = unfold_lines(raw, &mut skipped);

    let mut decoder = BlockDecoder {
        skipped,
        ..Default::default()
    };
    for line in &lines {
        decoder.feed(line);
    }
    decoder.finish()
}

/// A content line after unfolding.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LogicalLine {
    number: usize,
    text: String,
}

enum Unfold {
    AwaitingLine,
    Accumulating(LogicalLine),
}

/// Unfold continuation lines (a leading space or tab) into logical lines.
fn unfold_lines(data: &str, skipped: &mut Vec<Skip>) -> Vec<LogicalLine> {
    let mut result = Vec::new();
    let mut state = Unfold::AwaitingLine;

    for (idx, raw_line) in data.lines().enumerate() {
        let number = idx + 1;
        let line = raw_line.trim_end_matches('\r');
        let continuation = line.strip_prefix(' ').or_else(|| line.strip_prefix('\t'));

        state = match (state, continuation) {
            (Unfold::Accumulating(mut current), Some(rest)) => {
                current.text.push_str(rest);
                Unfold::Accumulating(current)
            }
            (Unfold::AwaitingLine, Some(_)) => {
                skipped.push(Skip {
                    line: number,
                    reason: SkipReason::OrphanContinuation,
                });
                Unfold::AwaitingLine
            }
            (previous, None) => {
                if let Unfold::Accumulating(done) = previous {
                    result.push(done);
                }
                if line.is_empty() {
                    Unfold::AwaitingLine
                } else {
                    Unfold::Accumulating(LogicalLine {
                        number,
                        text: line.to_string(),
                    })
                }
            }
        };
    }

    if let Unfold::Accumulating(done) = state {
        result.push(done);
    }

    result
}

/// Split a content line into its name (parameters dropped, uppercased) and
/// value at the first colon outside a quoted parameter value.
fn split_property(line: &str) -> Option<(String, &str)> {
    let mut in_quotes = false;
    let colon = line.char_indices().find_map(|(i, c)| match c {
        '"' => {
            in_quotes = !in_quotes;
            None
        }
        ':' if !in_quotes => Some(i),
        _ => None,
    })?;

    let segment = &line[..colon];
    let name = segment.split(';').next().unwrap_or(segment);
    Some((name.trim().to_ascii_uppercase(), &line[colon + 1..]))
}

fn open_marker(line: &str) -> Option<RecordKind> {
    [RecordKind::Event, RecordKind::Task]
        .into_iter()
        .find(|kind| line.trim_end() == kind.begin_marker())
}

fn end_marker(line: &str) -> Option<RecordKind> {
    [RecordKind::Event, RecordKind::Task]
        .into_iter()
        .find(|kind| line.trim_end() == kind.end_marker())
}

#[derive(Debug, Default)]
struct PendingAlarm {
    opened_at: usize,
    minutes: Option<i64>,
    channel: Option<ReminderChannel>,
}

#[derive(Debug)]
struct OpenBlock {
    opened_at: usize,
    record: CalendarRecord,
    alarm: Option<PendingAlarm>,
    /// Names of unrecognized components nested inside the block.
    nested: Vec<String>,
    saw_end: bool,
}

impl OpenBlock {
    fn new(kind: RecordKind, opened_at: usize) -> Self {
        Self {
            opened_at,
            record: CalendarRecord {
                kind,
                ..Default::default()
            },
            alarm: None,
            nested: Vec::new(),
            saw_end: false,
        }
    }
}

#[derive(Debug, Default)]
struct BlockDecoder {
    records: Vec<CalendarRecord>,
    skipped: Vec<Skip>,
    current: Option<OpenBlock>,
}

impl BlockDecoder {
    fn skip(&mut self, line: usize, reason: SkipReason) {
        tracing::debug!(line, ?reason, "calendar decode skipped input");
        self.skipped.push(Skip { line, reason });
    }

    fn feed(&mut self, line: &LogicalLine) {
        let text = line.text.as_str();

        if let Some(kind) = open_marker(text) {
            if let Some(previous) = self.current.take() {
                self.skip(previous.opened_at, SkipReason::UnterminatedBlock);
            }
            self.current = Some(OpenBlock::new(kind, line.number));
            return;
        }

        let Some(open_kind) = self.current.as_ref().map(|b| b.record.kind) else {
            // Calendar-level lines outside any record block
            return;
        };

        if let Some(kind) = end_marker(text) {
            if kind == open_kind {
                self.close();
            } else {
                self.skip(line.number, SkipReason::MismatchedEnd);
            }
            return;
        }

        let Some((name, value)) = split_property(text) else {
            self.skip(line.number, SkipReason::MissingColon);
            return;
        };

        if let Some(skip) = self.apply(line.number, &name, value) {
            self.skip(skip.line, skip.reason);
        }
    }

    /// Apply one property to the open block. Returns the skip to record when
    /// the line, or the alarm it closes, is dropped.
    fn apply(&mut self, number: usize, name: &str, value: &str) -> Option<Skip> {
        let block = self.current.as_mut()?;
        let value_trimmed = value.trim();

        match name {
            "BEGIN" => {
                if block.nested.is_empty() && value_trimmed == "VALARM" {
                    block.alarm = Some(PendingAlarm {
                        opened_at: number,
                        ..Default::default()
                    });
                } else {
                    block.nested.push(value_trimmed.to_string());
                }
                return None;
            }
            "END" => {
                if block.nested.last().is_some_and(|n| n == value_trimmed) {
                    block.nested.pop();
                } else if value_trimmed == "VALARM" && block.nested.is_empty() {
                    if let Some(alarm) = block.alarm.take() {
                        return finish_alarm(&mut block.record, alarm);
                    }
                }
                return None;
            }
            _ => {}
        }

        if !block.nested.is_empty() {
            return None;
        }

        if let Some(alarm) = block.alarm.as_mut() {
            match name {
                "TRIGGER" => alarm.minutes = parse_trigger(value_trimmed),
                "ACTION" => {
                    alarm.channel = Some(match value_trimmed {
                        "EMAIL" => ReminderChannel::Email,
                        _ => ReminderChannel::Notification,
                    });
                }
                _ => {}
            }
            return None;
        }

        let unparsable = Skip {
            line: number,
            reason: SkipReason::UnparsableDate,
        };
        let record = &mut block.record;
        match name {
            "DTSTART" => {
                let Some(parsed) = time::parse_date_value(value, Boundary::Start) else {
                    return Some(unparsable);
                };
                record.start_ts = parsed.ts;
                record.all_day |= parsed.all_day;
            }
            "DTEND" => {
                let Some(parsed) = time::parse_date_value(value, Boundary::End) else {
                    return Some(unparsable);
                };
                record.end_ts = parsed.ts;
                record.all_day |= parsed.all_day;
                block.saw_end = true;
            }
            "DUE" => {
                let Some(parsed) = time::parse_date_value(value, Boundary::End) else {
                    return Some(unparsable);
                };
                if !block.saw_end {
                    record.end_ts = parsed.ts;
                    record.all_day |= parsed.all_day;
                }
            }
            "SUMMARY" => record.title = unescape(value),
            "LOCATION" => record.location = non_empty(unescape(value)),
            "DESCRIPTION" => record.description = non_empty(unescape(value)),
            "UID" => record.external_id = non_empty(value_trimmed.to_string()),
            "RRULE" => record.recurrence = parse_rrule(value_trimmed),
            "LAST-MODIFIED" => record.last_modified = time::parse_timestamp(value_trimmed),
            "CREATED" => {
                record.created_at = time::parse_timestamp(value_trimmed)
                    .and_then(|ts| DateTime::from_timestamp(ts, 0));
            }
            _ => {}
        }
        None
    }

    fn close(&mut self) {
        let Some(block) = self.current.take() else {
            return;
        };
        if block.record.is_complete() {
            self.records.push(block.record);
        } else {
            self.skip(block.opened_at, SkipReason::IncompleteRecord);
        }
    }

    fn finish(mut self) -> Decoded {
        if let Some(block) = self.current.take() {
            self.skip(block.opened_at, SkipReason::UnterminatedBlock);
        }
        Decoded {
            records: self.records,
            skipped: self.skipped,
        }
    }
}

fn finish_alarm(record: &mut CalendarRecord, alarm: PendingAlarm) -> Option<Skip> {
    let skip = |reason| {
        Some(Skip {
            line: alarm.opened_at,
            reason,
        })
    };
    let Some(minutes) = alarm.minutes else {
        return skip(SkipReason::UnsupportedTrigger);
    };
    if record.reminders.len() >= MAX_REMINDERS {
        return skip(SkipReason::TooManyReminders);
    }
    let channel = alarm.channel.unwrap_or(ReminderChannel::Notification);
    record.reminders.push(Reminder::new(minutes, channel));
    None
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}

/// Parse an `RRULE` value. Only the four supported frequencies produce a
/// recurrence; `UNTIL` becomes the limit.
fn parse_rrule(value: &str) -> Option<Recurrence> {
    let mut frequency = None;
    let mut limit_ts = 0;

    for part in value.split(';') {
        match part.split_once('=') {
            Some(("FREQ", token)) => frequency = Frequency::from_rrule_token(token.trim()),
            Some(("UNTIL", until)) => limit_ts = time::parse_timestamp(until).unwrap_or(0),
            _ => {}
        }
    }

    frequency.map(|f| Recurrence {
        interval_seconds: f.interval(),
        rule_code: 0,
        limit_ts,
    })
}

/// Parse a relative alarm trigger into minutes before the start.
///
/// Only triggers before the start (or exactly at it) map onto a reminder.
fn parse_trigger(value: &str) -> Option<i64> {
    let (before, rest) = match value.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, value.strip_prefix('+').unwrap_or(value)),
    };
    let minutes = parse_duration_minutes(rest.strip_prefix('P')?)?;
    (before || minutes == 0).then_some(minutes)
}

/// Parse the part of a duration after `P`, e.g. `T15M`, `1DT2H`, `2W`.
fn parse_duration_minutes(duration: &str) -> Option<i64> {
    let mut total: i64 = 0;
    let mut number = String::new();
    let mut saw_unit = false;

    for c in duration.chars() {
        if c.is_ascii_digit() {
            number.push(c);
            continue;
        }
        if c == 'T' {
            if !number.is_empty() {
                return None;
            }
            continue;
        }
        let n: i64 = number.parse().ok()?;
        number.clear();
        let minutes = match c {
            'W' => n.checked_mul(7 * 24 * 60)?,
            'D' => n.checked_mul(24 * 60)?,
            'H' => n.checked_mul(60)?,
            'M' => n,
            'S' => n / 60,
            _ => return None,
        };
        total = total.checked_add(minutes)?;
        saw_unit = true;
    }

    (saw_unit && number.is_empty()).then_some(total)
}
