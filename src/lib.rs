//! # EDT assistant (library root)
//!
//! A timetable assistant for students of the Université de la
//! Nouvelle-Calédonie. It reads a student's ICS export, indexes it as embedded
//! chunks and answers questions about it with an OpenAI compatible chat model.
//!
//! ## Pipeline
//!
//! ```text
//! ICS feed ─▶ timetable ─▶ chunk ─▶ vector_store ◀─ retriever ◀─ question
//!                                                      │
//!                                    context ─▶ api (chat completion) ─▶ answer
//! ```
//!
//! ## Modules
//! - [`timetable`]: feed URL, download and ICS parsing into [`timetable::Course`]s.
//! - [`chunk`]: per-event or weekly normalization into [`chunk::Chunk`]s.
//! - [`embedding`]: the [`embedding::Embedder`] trait, MiniLM (Candle) and hashing providers.
//! - [`vector_store`]: persisted flat index, owner removal, wipe.
//! - [`retriever`]: owner and date scoped similarity search.
//! - [`context`]: delimiter join with an optional token budget.
//! - [`api`]: chat completion, question answering, ingestion and meeting planning.
//! - [`config`], [`template`], [`commands`]: YAML configuration, prompt templates, CLI.
//!
//! ## Files
//! Everything lives under the per-platform configuration directory
//! ([`config_dir`]):
//!
//! - `config.yaml`
//! - `templates/assistant.yaml`, `templates/reunion.yaml`
//! - `index/` (unless `index_path` is set)

use directories::ProjectDirs;
use std::error::Error;

pub mod api;
pub mod chunk;
pub mod commands;
pub mod config;
pub mod context;
pub mod embedding;
pub mod retriever;
pub mod template;
pub mod timetable;
pub mod vector_store;

/// Return the per-platform configuration directory.
///
/// This uses [`directories::ProjectDirs`] with the application triple
/// `("nc", "univ-nc", "edt")`, e.g. `~/.config/edt` on Linux.
///
/// The directory is **not** created by this function.
///
/// # Errors
/// Returns an error if the platform configuration directory cannot be determined.
///
/// # Examples
/// ```no_run
/// let cfg = edt_assistant::config_dir().expect("has a config dir");
/// println!("config at {}", cfg.display());
/// ```
pub fn config_dir() -> Result<std::path::PathBuf, Box<dyn Error>> {
    let proj_dirs = ProjectDirs::from("nc", "univ-nc", "edt")
        .ok_or("Unable to determine config directory")?;
    Ok(proj_dirs.config_dir().to_path_buf())
}
