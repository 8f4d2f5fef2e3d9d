//! # Event normalizer
//!
//! Turns a timetable ([`Course`] list) into retrievable [`Chunk`]s tagged with
//! their owner and provenance.
//!
//! Two granularities are supported:
//! - [`ChunkMode::PerEvent`]: one chunk per course, best for "when is my next
//!   networks class?" style questions.
//! - [`ChunkMode::Weekly`]: one chunk per ISO week, holding every course of the
//!   week, so a single hit can answer "what do I have this week?".
//!
//! Normalizing is pure: no network, no disk.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::timetable::{Course, group_by_week};

/// One unit of retrievable text plus owner/provenance metadata.
///
/// A chunk only ever describes courses of a single owner. Chunks are never
/// mutated once built; re-ingesting means removing and inserting again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    /// Login of the student the courses belong to.
    pub owner_id: String,
    /// Feed URL the courses were fetched from.
    pub source_uri: String,
    /// Dates covered by the chunk, used for date-range filtering.
    pub date_tags: BTreeSet<NaiveDate>,
}

impl Chunk {
    /// Does this chunk cover at least one of `dates`?
    pub fn covers_any(&self, dates: &BTreeSet<NaiveDate>) -> bool {
        self.date_tags.intersection(dates).next().is_some()
    }
}

/// Retrieval granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChunkMode {
    PerEvent,
    #[default]
    Weekly,
}

/// Render a single course the way it is embedded and shown to the model.
pub fn render_course(course: &Course) -> String {
    format!(
        "Nom du cours: {}\nDébut du cours: {}\nFin du cours: {}\nDescription du cours: {}\n\n",
        course.name,
        course.start_label(),
        course.end_label(),
        course.description
    )
}

/// Build chunks for one owner's courses.
///
/// In [`ChunkMode::PerEvent`] the output has exactly one chunk per course, in
/// input order. In [`ChunkMode::Weekly`] courses are sorted and batched per ISO
/// week, giving one chunk per batch.
///
/// # Examples
/// ```rust
/// use edt_assistant::chunk::{normalize, ChunkMode};
///
/// let chunks = normalize(&[], "rcastelain", "http://edt", ChunkMode::Weekly);
/// assert!(chunks.is_empty());
/// ```
pub fn normalize(courses: &[Course], owner_id: &str, source_uri: &str, mode: ChunkMode) -> Vec<Chunk> {
    let batches: Vec<Vec<Course>> = match mode {
        ChunkMode::PerEvent => courses.iter().map(|c| vec![c.clone()]).collect(),
        ChunkMode::Weekly => group_by_week(courses),
    };

    let chunks: Vec<Chunk> = batches
        .iter()
        .map(|batch| build_chunk(batch, owner_id, source_uri))
        .collect();

    tracing::info!(
        "Normalized {} courses into {} chunks for {owner_id} ({mode:?})",
        courses.len(),
        chunks.len()
    );
    chunks
}

fn build_chunk(batch: &[Course], owner_id: &str, source_uri: &str) -> Chunk {
    let text: String = batch.iter().map(render_course).collect();
    let date_tags = batch.iter().flat_map(Course::dates).collect();

    Chunk {
        text,
        owner_id: owner_id.to_string(),
        source_uri: source_uri.to_string(),
        date_tags,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn course(name: &str, start: &str, end: &str) -> Course {
        Course {
            name: name.to_string(),
            start: NaiveDateTime::parse_from_str(start, "%Y-%m-%d %H:%M").unwrap(),
            end: NaiveDateTime::parse_from_str(end, "%Y-%m-%d %H:%M").unwrap(),
            description: "Salle S104".to_string(),
        }
    }

    fn two_weeks() -> Vec<Course> {
        vec![
            course("Cm Réseaux", "2024-10-21 07:30", "2024-10-21 09:30"),
            course("Td Algorithmique", "2024-10-23 10:00", "2024-10-23 12:00"),
            course("Tp Systèmes", "2024-10-28 13:30", "2024-10-28 16:30"),
        ]
    }

    #[test]
    fn test_per_event_one_chunk_per_course() {
        let courses = two_weeks();
        let chunks = normalize(&courses, "rcastelain", "http://edt", ChunkMode::PerEvent);
        assert_eq!(chunks.len(), courses.len());
        assert_eq!(
            chunks[0].text,
            "Nom du cours: Cm Réseaux\nDébut du cours: 2024-10-21 07:30\n\
             Fin du cours: 2024-10-21 09:30\nDescription du cours: Salle S104\n\n"
        );
        assert!(chunks.iter().all(|c| c.owner_id == "rcastelain"));
        assert!(chunks.iter().all(|c| c.source_uri == "http://edt"));
    }

    #[test]
    fn test_weekly_one_chunk_per_week() {
        let chunks = normalize(&two_weeks(), "htiaiba", "http://edt", ChunkMode::Weekly);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].text.contains("Cm Réseaux"));
        assert!(chunks[0].text.contains("Td Algorithmique"));
        assert!(!chunks[0].text.contains("Tp Systèmes"));

        let first_week: Vec<String> = chunks[0].date_tags.iter().map(|d| d.to_string()).collect();
        assert_eq!(first_week, vec!["2024-10-21", "2024-10-23"]);
    }

    #[test]
    fn test_date_tags_cover_overnight_course() {
        let overnight = course("Garde", "2024-10-21 22:00", "2024-10-22 02:00");
        let chunks = normalize(&[overnight], "x", "s", ChunkMode::PerEvent);
        assert_eq!(chunks[0].date_tags.len(), 2);
    }

    #[test]
    fn test_multi_day_course_covers_the_days_in_between() {
        let seminar = course("Séminaire", "2024-10-21 08:00", "2024-10-23 17:00");
        let chunks = normalize(&[seminar], "x", "s", ChunkMode::Weekly);
        let tuesday: BTreeSet<NaiveDate> =
            [NaiveDate::from_ymd_opt(2024, 10, 22).unwrap()].into_iter().collect();
        assert!(chunks[0].covers_any(&tuesday));
        assert_eq!(chunks[0].date_tags.len(), 3);
    }

    #[test]
    fn test_covers_any() {
        let chunks = normalize(&two_weeks(), "x", "s", ChunkMode::Weekly);
        let filter: BTreeSet<NaiveDate> =
            [NaiveDate::from_ymd_opt(2024, 10, 28).unwrap()].into_iter().collect();
        assert!(!chunks[0].covers_any(&filter));
        assert!(chunks[1].covers_any(&filter));
        assert!(!chunks[1].covers_any(&BTreeSet::new()));
    }
}
