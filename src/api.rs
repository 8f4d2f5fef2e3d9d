//! # API Module
//!
//! Chat orchestration: everything that ends in a call to the chat-completion
//! model, plus the ingestion step that feeds the index from the timetable feed.
//!
//! - [`create_client`] builds the OpenAI-compatible client once per process.
//! - [`complete`] sends one system + user exchange built from a [`ChatTemplate`].
//! - [`ask`] runs retrieve → assemble → complete for one student.
//! - [`ingest_user`] fetches, normalizes and indexes a student's timetable;
//!   [`ensure_indexed`] does so only on first use.
//! - [`plan_meeting`] finds shared free slots for two students.
//!
//! An empty retrieval is not an error: the model is still called, with an empty
//! context.
//!
//! # Example
//!
//! ```no_run
//! use edt_assistant::{api, config::EdtConfig, template::ChatTemplate};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EdtConfig::example();
//! let client = api::create_client(&config)?;
//! let answer = api::complete(&client, &config, &ChatTemplate::assistant(), "", "Bonjour ?").await?;
//! println!("{answer}");
//! # Ok(()) }
//! ```

use crate::{
    chunk::{ChunkMode, normalize},
    config::EdtConfig,
    context::ContextAssembler,
    embedding::Embedder,
    retriever::{Query, Retriever, date_range},
    template::ChatTemplate,
    timetable::{FetchError, feed_url, fetch_timetable},
    vector_store::{IngestState, VectorStore},
};
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
        ChatCompletionRequestSystemMessageContent, ChatCompletionRequestUserMessage,
        ChatCompletionRequestUserMessageContent, CreateChatCompletionRequestArgs,
    },
};
use chrono::{Datelike, FixedOffset, NaiveDate, Utc};
use std::{error::Error, num::NonZeroUsize};

use tracing::{debug, info, warn};

/// Chunks retrieved per student when planning a meeting.
const MEETING_TOP_K: NonZeroUsize = NonZeroUsize::MIN.saturating_add(1);

/// Retrieval query used for both students of a meeting.
const MEETING_QUERY: &str = "Cours et horaires de la période";

const WEEKDAYS: [&str; 7] = ["lundi", "mardi", "mercredi", "jeudi", "vendredi", "samedi", "dimanche"];

const MONTHS: [&str; 12] = [
    "janvier", "février", "mars", "avril", "mai", "juin", "juillet", "août", "septembre", "octobre",
    "novembre", "décembre",
];

/// Creates a new OpenAI API client from configuration.
pub fn create_client(config: &EdtConfig) -> Result<Client<OpenAIConfig>, Box<dyn Error>> {
    let openai_config = OpenAIConfig::new()
        .with_api_key(config.api_key.clone())
        .with_api_base(config.api_base.clone());
    debug!("Client created for {}", config.api_base);
    Ok(Client::with_config(openai_config))
}

/// `2024-10-21 (lundi 21 octobre 2024)`
pub fn date_label(date: NaiveDate) -> String {
    format!(
        "{} ({} {} {} {})",
        date.format("%Y-%m-%d"),
        WEEKDAYS[date.weekday().num_days_from_monday() as usize],
        date.day(),
        MONTHS[date.month0() as usize],
        date.year()
    )
}

/// Today's date in the timetable's timezone.
pub fn today(offset: FixedOffset) -> NaiveDate {
    Utc::now().with_timezone(&offset).date_naive()
}

/// The two messages sent for one exchange.
fn build_messages(system_prompt: String, user_prompt: String) -> Vec<ChatCompletionRequestMessage> {
    vec![
        ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
            content: ChatCompletionRequestSystemMessageContent::Text(system_prompt),
            name: None,
        }),
        ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
            content: ChatCompletionRequestUserMessageContent::Text(user_prompt),
            name: None,
        }),
    ]
}

/// Send one exchange and concatenate the text of every returned choice.
async fn send(
    client: &Client<OpenAIConfig>,
    config: &EdtConfig,
    system_prompt: String,
    user_prompt: String,
) -> Result<String, Box<dyn Error>> {
    let request = CreateChatCompletionRequestArgs::default()
        .max_tokens(config.max_tokens)
        .model(config.model.clone())
        .messages(build_messages(system_prompt, user_prompt))
        .build()?;

    debug!("Sending request: {:?}", request);

    let response = client.chat().create(request).await?;

    let answer: String = response
        .choices
        .iter()
        .filter_map(|choice| choice.message.content.clone())
        .collect();

    if answer.is_empty() {
        warn!("Model {} returned an empty answer", config.model);
    }
    Ok(answer)
}

/// Ask the model `question` about `context` using `template`.
///
/// The system prompt receives today's date in the timetable's timezone.
pub async fn complete(
    client: &Client<OpenAIConfig>,
    config: &EdtConfig,
    template: &ChatTemplate,
    context: &str,
    question: &str,
) -> Result<String, Box<dyn Error>> {
    let system_prompt = template.system(&date_label(today(config.utc_offset())));
    let user_prompt = template.user(&[("context", context), ("question", question)]);
    send(client, config, system_prompt, user_prompt).await
}

/// Answer `query.text` from the chunks of `query.owner_id`.
pub async fn ask(
    client: &Client<OpenAIConfig>,
    config: &EdtConfig,
    template: &ChatTemplate,
    retriever: &Retriever<'_>,
    query: &Query,
) -> Result<String, Box<dyn Error>> {
    let chunks = retriever.search(query);
    if chunks.is_empty() {
        info!("No timetable context for {}, asking anyway", query.owner_id);
    }

    let context = ContextAssembler::from_budget(config.context_token_budget).assemble(&chunks);
    debug!("Context for {}:\n{context}", query.owner_id);

    complete(client, config, template, &context, &query.text).await
}

/// Fetch `user_id`'s timetable and index it.
///
/// Without `replace`, an owner already present in `store` is left untouched and
/// `Ok(None)` is returned. With `replace`, previous chunks of that owner are
/// removed once the new timetable has been downloaded.
///
/// # Errors
/// [`FetchError`](crate::timetable::FetchError) when the feed cannot be read,
/// [`IngestError`](crate::vector_store::IngestError) when indexing fails.
pub async fn ingest_user(
    config: &EdtConfig,
    embedder: &dyn Embedder,
    store: &mut VectorStore,
    user_id: &str,
    mode: ChunkMode,
    replace: bool,
) -> Result<Option<usize>, Box<dyn Error>> {
    let indexed = store.owner_state(user_id) == IngestState::Ingested;
    if indexed && !replace {
        info!("{user_id} is already indexed, skipping");
        return Ok(None);
    }

    let courses = fetch_timetable(config, user_id).await?;

    if indexed {
        let removed = store.remove_owner(user_id)?;
        info!("Removed {removed} previous chunks of {user_id}");
    }
    let source = feed_url(&config.feed_url_template, user_id);
    let chunks = normalize(&courses, user_id, &source, mode);
    let added = store.add(embedder, chunks)?;

    info!("Indexed {added} chunks for {user_id}");
    Ok(Some(added))
}

/// Index `user_id` with weekly chunks unless already present.
///
/// A feed error (unknown login, unreachable server) is returned so the command
/// stops. An indexing failure only warns: the question is still answered,
/// without context.
pub async fn ensure_indexed(
    config: &EdtConfig,
    embedder: &dyn Embedder,
    store: &mut VectorStore,
    user_id: &str,
) -> Result<(), Box<dyn Error>> {
    if store.owner_state(user_id) == IngestState::Ingested {
        return Ok(());
    }
    info!("{user_id} is not indexed yet, fetching the timetable");
    match ingest_user(config, embedder, store, user_id, ChunkMode::Weekly, false).await {
        Ok(_) => Ok(()),
        Err(e) if e.is::<FetchError>() => Err(e),
        Err(e) => {
            warn!("Could not index {user_id}: {e}");
            Ok(())
        }
    }
}

/// Two students and the period to search for shared free slots.
#[derive(Debug, Clone)]
pub struct Meeting {
    pub main_user: String,
    pub second_user: String,
    pub from: NaiveDate,
    pub to: NaiveDate,
}

/// Propose meeting slots for two students.
///
/// The second student's timetable is always re-fetched and re-indexed (weekly
/// chunks); the main student is expected to be indexed already. Each side
/// contributes its two best chunks within the period.
///
/// # Errors
/// Invalid period (see [`date_range`]), feed or indexing failures for the second
/// student, chat API errors.
pub async fn plan_meeting(
    client: &Client<OpenAIConfig>,
    config: &EdtConfig,
    template: &ChatTemplate,
    embedder: &dyn Embedder,
    store: &mut VectorStore,
    meeting: &Meeting,
) -> Result<String, Box<dyn Error>> {
    let dates = date_range(meeting.from, meeting.to)?;

    ingest_user(config, embedder, store, &meeting.second_user, ChunkMode::Weekly, true).await?;

    let retriever = Retriever::new(embedder, Some(&*store));
    let assembler = ContextAssembler::from_budget(config.context_token_budget);

    let mut contexts = Vec::with_capacity(2);
    for user in [&meeting.main_user, &meeting.second_user] {
        let query = Query::new(user.as_str(), MEETING_QUERY, MEETING_TOP_K).with_dates(dates.clone());
        let context = assembler.assemble(&retriever.search(&query));
        info!("Timetable retrieved for {user}:\n{context}");
        contexts.push(context);
    }

    let system_prompt = template.system(&date_label(today(config.utc_offset())));
    let user_prompt = template.user(&[("edt1", contexts[0].as_str()), ("edt2", contexts[1].as_str())]);
    send(client, config, system_prompt, user_prompt).await
}
