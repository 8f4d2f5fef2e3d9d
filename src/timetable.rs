//! # Timetable source
//!
//! Fetches a student's timetable (EDT) from the university ICS export and turns
//! it into a list of [`Course`] values in local time.
//!
//! Only the handful of `VEVENT` properties the retrieval layer needs are read:
//! `SUMMARY`, `DTSTART`, `DTEND` and `DESCRIPTION`. Everything else in the feed
//! is ignored.
//!
//! ## Example
//! ```no_run
//! use edt_assistant::config::EdtConfig;
//! use edt_assistant::timetable::{fetch_timetable, group_by_week};
//!
//! # async fn demo(config: &EdtConfig) -> Result<(), Box<dyn std::error::Error>> {
//! let courses = fetch_timetable(config, "rcastelain").await?;
//! for week in group_by_week(&courses) {
//!     println!("{} courses", week.len());
//! }
//! # Ok(()) }
//! ```

use chrono::{DateTime, Datelike, Duration, FixedOffset, IsoWeek, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{error::Error, fmt};
use tracing::{debug, info, warn};

use crate::config::EdtConfig;

/// Display format used for course start/end times everywhere in the crate.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M";

static LOGIN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("valid login regex"));

static ICS_DATETIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{8})(?:T(\d{6})(Z)?)?$").expect("valid ICS date-time regex")
});

/// One course of a timetable, in local time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    /// Course name, cut before the first `(`.
    pub name: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    /// Description, cut before the first `(`.
    pub description: String,
}

impl Course {
    pub fn start_label(&self) -> String {
        self.start.format(DATETIME_FORMAT).to_string()
    }

    pub fn end_label(&self) -> String {
        self.end.format(DATETIME_FORMAT).to_string()
    }

    /// ISO week the course starts in; used to batch courses per week.
    pub fn week(&self) -> IsoWeek {
        self.start.date().iso_week()
    }

    /// Every calendar date the course covers, first to last.
    ///
    /// The end is exclusive: a course ending at 00:00 (or an all-day event,
    /// whose `DTEND` is the next day) does not cover the day it ends on.
    pub fn dates(&self) -> Vec<NaiveDate> {
        let first = self.start.date();
        let last = if self.end > self.start {
            (self.end - Duration::seconds(1)).date()
        } else {
            first
        };
        first.iter_days().take_while(|day| *day <= last).collect()
    }
}

/// Failure to obtain a timetable from the upstream feed.
///
/// These are surfaced to the user as-is and never retried.
#[derive(Debug)]
pub enum FetchError {
    /// Empty or malformed login, or the feed answered with a non-success status.
    InvalidIdentifier,
    /// The feed could not be reached at all.
    Unreachable(String),
    /// The feed answered, but not with a calendar document.
    NotACalendar,
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::InvalidIdentifier => write!(f, "Veuillez entrer un identifiant valide 🚫"),
            FetchError::Unreachable(e) => {
                write!(f, "Impossible de joindre le serveur d'emploi du temps : {e}")
            }
            FetchError::NotACalendar => {
                write!(f, "Le serveur n'a pas renvoyé d'emploi du temps valide")
            }
        }
    }
}

impl Error for FetchError {}

/// Substitute `{user_id}` in the configured feed URL template.
pub fn feed_url(template: &str, user_id: &str) -> String {
    template.replace("{user_id}", user_id)
}

/// Download and parse the timetable of `user_id`.
///
/// The body is always decoded as UTF-8 (lossily), whatever charset the server
/// announces.
///
/// # Errors
/// See [`FetchError`].
pub async fn fetch_timetable(config: &EdtConfig, user_id: &str) -> Result<Vec<Course>, FetchError> {
    if !LOGIN_RE.is_match(user_id) {
        return Err(FetchError::InvalidIdentifier);
    }

    let url = feed_url(&config.feed_url_template, user_id);
    info!("Fetching timetable for {user_id}");
    debug!("Feed URL: {url}");

    let response = reqwest::get(&url)
        .await
        .map_err(|e| FetchError::Unreachable(e.to_string()))?;

    if !response.status().is_success() {
        warn!("Feed answered {} for {user_id}", response.status());
        return Err(FetchError::InvalidIdentifier);
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| FetchError::Unreachable(e.to_string()))?;
    let body = String::from_utf8_lossy(&bytes);

    if !body.contains("BEGIN:VCALENDAR") {
        return Err(FetchError::NotACalendar);
    }

    let courses = parse_ics(&body, config.utc_offset());
    info!("{} courses parsed for {user_id}", courses.len());
    Ok(courses)
}

/// Parse the `VEVENT`s of an ICS document into courses sorted by start.
///
/// UTC times (`...Z`) are converted to `offset`; floating and `TZID=` times are
/// taken as already local. Events without a `DTSTART` are skipped; a missing
/// `DTEND` makes the course zero-length.
pub fn parse_ics(text: &str, offset: FixedOffset) -> Vec<Course> {
    let mut courses = Vec::new();
    let mut current: Option<EventFields> = None;

    for line in unfold_lines(text) {
        if line.eq_ignore_ascii_case("BEGIN:VEVENT") {
            current = Some(EventFields::default());
            continue;
        }
        if line.eq_ignore_ascii_case("END:VEVENT") {
            if let Some(fields) = current.take() {
                match fields.into_course() {
                    Some(course) => courses.push(course),
                    None => debug!("Skipping VEVENT without a usable DTSTART"),
                }
            }
            continue;
        }

        let Some(fields) = current.as_mut() else {
            continue;
        };
        let Some((head, value)) = line.split_once(':') else {
            continue;
        };
        let name = head.split(';').next().unwrap_or_default().to_ascii_uppercase();

        match name.as_str() {
            "SUMMARY" => fields.summary = Some(unescape_text(value)),
            "DESCRIPTION" => fields.description = Some(unescape_text(value)),
            "DTSTART" => fields.start = parse_ics_datetime(value, offset),
            "DTEND" => fields.end = parse_ics_datetime(value, offset),
            _ => {}
        }
    }

    courses.sort_by(|a, b| a.start.cmp(&b.start));
    courses
}

/// Split courses into contiguous ISO-week batches, in chronological order.
pub fn group_by_week(courses: &[Course]) -> Vec<Vec<Course>> {
    let mut sorted = courses.to_vec();
    sorted.sort_by(|a, b| a.start.cmp(&b.start));

    let mut weeks: Vec<Vec<Course>> = Vec::new();
    for course in sorted {
        match weeks.last_mut() {
            Some(week) if week.last().map(Course::week) == Some(course.week()) => {
                week.push(course)
            }
            _ => weeks.push(vec![course]),
        }
    }
    weeks
}

#[derive(Default)]
struct EventFields {
    summary: Option<String>,
    description: Option<String>,
    start: Option<NaiveDateTime>,
    end: Option<NaiveDateTime>,
}

impl EventFields {
    fn into_course(self) -> Option<Course> {
        let start = self.start?;
        let end = self.end.unwrap_or(start);
        Some(Course {
            name: cut_label(self.summary.as_deref().unwrap_or_default()),
            start,
            end,
            description: cut_label(self.description.as_deref().unwrap_or_default()),
        })
    }
}

/// The feed appends group codes in parentheses; keep what comes before.
fn cut_label(raw: &str) -> String {
    raw.split('(').next().unwrap_or_default().trim().to_string()
}

fn unfold_lines(text: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for raw in text.split('\n') {
        let raw = raw.strip_suffix('\r').unwrap_or(raw);
        if let Some(continuation) = raw.strip_prefix([' ', '\t']) {
            if let Some(last) = lines.last_mut() {
                last.push_str(continuation);
                continue;
            }
        }
        if !raw.is_empty() {
            lines.push(raw.to_string());
        }
    }
    lines
}

fn unescape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn parse_ics_datetime(value: &str, offset: FixedOffset) -> Option<NaiveDateTime> {
    let caps = ICS_DATETIME_RE.captures(value.trim())?;
    let date = NaiveDate::parse_from_str(caps.get(1)?.as_str(), "%Y%m%d").ok()?;

    let Some(time) = caps.get(2) else {
        return date.and_hms_opt(0, 0, 0);
    };
    let naive = NaiveDateTime::parse_from_str(
        &format!("{}{}", caps.get(1)?.as_str(), time.as_str()),
        "%Y%m%d%H%M%S",
    )
    .ok()?;

    if caps.get(3).is_some() {
        let utc: DateTime<Utc> = naive.and_utc();
        Some(utc.with_timezone(&offset).naive_local())
    } else {
        Some(naive)
    }
}
