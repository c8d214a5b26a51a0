//! Recurrence rules of event templates

use super::TemplateError;
use chrono::{Datelike, Duration, NaiveDate};

/// How a template repeats between its start and due date
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recurrence {
    /// Every week on the start weekday
    Weekly,
    /// Every month on the start day of month; months without that day are skipped
    DayOfMonth,
    /// Every n days
    EveryDays(u32),
    /// Every n weeks on the start weekday
    EveryWeeks(u32),
    /// The n-th (1-4) occurrence of the start weekday in each month
    NthWeekdayOfMonth(u8),
}

impl Recurrence {
    /// Parse a `Wiederholungsart` value; `interval` is only read by the
    /// "Abstand in ..." kinds
    pub fn parse(kind: &str, interval: Option<&str>) -> Result<Self, TemplateError> {
        let recurrence = match kind.trim() {
            "Jede Woche" => Recurrence::Weekly,
            "Tag im Monat" => Recurrence::DayOfMonth,
            "Abstand in Tagen" => Recurrence::EveryDays(parse_interval(interval)?),
            "Abstand in Wochen" => Recurrence::EveryWeeks(parse_interval(interval)?),
            "1. Wochentag im Monat" => Recurrence::NthWeekdayOfMonth(1),
            "2. Wochentag im Monat" => Recurrence::NthWeekdayOfMonth(2),
            "3. Wochentag im Monat" => Recurrence::NthWeekdayOfMonth(3),
            "4. Wochentag im Monat" => Recurrence::NthWeekdayOfMonth(4),
            other => return Err(TemplateError::UnknownRecurrence(other.to_string())),
        };
        Ok(recurrence)
    }

    /// All dates from `start` through `end`, inclusive
    pub fn occurrences(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        if end < start {
            return Vec::new();
        }

        match *self {
            Recurrence::Weekly => stepped(start, end, Duration::weeks(1)),
            Recurrence::EveryDays(n) => stepped(start, end, Duration::days(i64::from(n))),
            Recurrence::EveryWeeks(n) => stepped(start, end, Duration::weeks(i64::from(n))),
            Recurrence::DayOfMonth => monthly(start, end, |year, month| {
                NaiveDate::from_ymd_opt(year, month, start.day())
            }),
            Recurrence::NthWeekdayOfMonth(n) => monthly(start, end, |year, month| {
                NaiveDate::from_weekday_of_month_opt(year, month, start.weekday(), n)
            }),
        }
    }
}

fn parse_interval(raw: Option<&str>) -> Result<u32, TemplateError> {
    let raw = raw.map(str::trim).unwrap_or_default();
    match raw.parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(TemplateError::InvalidInterval(raw.to_string())),
    }
}

fn stepped(start: NaiveDate, end: NaiveDate, step: Duration) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    let mut current = Some(start);
    while let Some(date) = current.filter(|d| *d <= end) {
        dates.push(date);
        current = date.checked_add_signed(step);
    }
    dates
}

/// One candidate per month from `start`'s month through `end`'s month
fn monthly<F>(start: NaiveDate, end: NaiveDate, candidate: F) -> Vec<NaiveDate>
where
    F: Fn(i32, u32) -> Option<NaiveDate>,
{
    let mut dates = Vec::new();
    let (mut year, mut month) = (start.year(), start.month());

    while (year, month) <= (end.year(), end.month()) {
        if let Some(date) = candidate(year, month) {
            if date >= start && date <= end {
                dates.push(date);
            }
        }
        if month == 12 {
            year += 1;
            month = 1;
        } else {
            month += 1;
        }
    }
    dates
}
