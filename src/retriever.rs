//! # Retriever
//!
//! Owner- and date-scoped similarity search over a [`VectorStore`].
//!
//! Retrieval never fails from the caller's point of view: no index, an
//! embedding error or a filter nobody matches all give an empty result, which
//! later becomes an empty context.

use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::error::Error;
use std::num::NonZeroUsize;
use tracing::{debug, info, warn};

use crate::chunk::Chunk;
use crate::embedding::Embedder;
use crate::vector_store::VectorStore;

/// Longest range accepted by [`date_range`] (the meeting finder's two weeks).
pub const MAX_RANGE_DAYS: i64 = 14;

/// A retrieval request.
#[derive(Debug, Clone)]
pub struct Query {
    pub owner_id: String,
    pub text: String,
    /// When set, only chunks covering one of these dates are eligible.
    pub dates: Option<BTreeSet<NaiveDate>>,
    /// Upper bound on the number of results, not a promise.
    pub top_k: NonZeroUsize,
}

impl Query {
    pub fn new(owner_id: impl Into<String>, text: impl Into<String>, top_k: NonZeroUsize) -> Self {
        Self {
            owner_id: owner_id.into(),
            text: text.into(),
            dates: None,
            top_k,
        }
    }

    pub fn with_dates(mut self, dates: BTreeSet<NaiveDate>) -> Self {
        self.dates = Some(dates);
        self
    }

    fn accepts(&self, chunk: &Chunk) -> bool {
        chunk.owner_id == self.owner_id
            && self.dates.as_ref().is_none_or(|dates| chunk.covers_any(dates))
    }
}

/// A retrieved chunk and its Euclidean distance to the query (lower is closer).
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub distance: f32,
}

/// Searches one store with one embedding provider.
pub struct Retriever<'a> {
    embedder: &'a dyn Embedder,
    store: Option<&'a VectorStore>,
}

impl<'a> Retriever<'a> {
    /// `store` is `None` when no index was created or loaded in this process.
    pub fn new(embedder: &'a dyn Embedder, store: Option<&'a VectorStore>) -> Self {
        Self { embedder, store }
    }

    /// Most similar chunks of `query.owner_id`, best first.
    pub fn search(&self, query: &Query) -> Vec<Chunk> {
        self.search_with_scores(query)
            .into_iter()
            .map(|scored| scored.chunk)
            .collect()
    }

    /// Same as [`search`](Self::search), keeping distances.
    pub fn search_with_scores(&self, query: &Query) -> Vec<ScoredChunk> {
        let Some(store) = self.store else {
            info!("No index loaded, nothing to retrieve for {}", query.owner_id);
            return Vec::new();
        };

        let vector = match self.embedder.embed(&query.text) {
            Ok(vector) => vector,
            Err(e) => {
                warn!("Could not embed query for {}: {e}", query.owner_id);
                return Vec::new();
            }
        };

        let results: Vec<ScoredChunk> = store
            .nearest(&vector, query.top_k.get(), |chunk| query.accepts(chunk))
            .into_iter()
            .map(|(chunk, distance)| ScoredChunk {
                chunk: chunk.clone(),
                distance,
            })
            .collect();

        info!("{} relevant chunks found for {}", results.len(), query.owner_id);
        for scored in &results {
            debug!("distance {:.4}:\n{}", scored.distance, scored.chunk.text);
        }
        results
    }
}

/// Every date from `from` to `to`, inclusive.
///
/// # Errors
/// When `to` is before `from` or the range is longer than [`MAX_RANGE_DAYS`].
pub fn date_range(from: NaiveDate, to: NaiveDate) -> Result<BTreeSet<NaiveDate>, Box<dyn Error>> {
    if to < from {
        return Err(format!("end date {to} is before start date {from}").into());
    }
    let span = (to - from).num_days();
    if span > MAX_RANGE_DAYS {
        return Err(format!("date range of {span} days exceeds {MAX_RANGE_DAYS} days").into());
    }
    Ok(from.iter_days().take(span as usize + 1).collect())
}
