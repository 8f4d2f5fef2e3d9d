//! Main module for the EDT assistant CLI application (edt).
//!
//! Parses the command line, loads the configuration, installs logging and runs
//! the requested subcommand.
//!
//! # Examples
//!
//! ```sh
//! edt init
//! edt ingest rcastelain
//! edt ask rcastelain "Quand ai-je cours de réseaux cette semaine ?"
//! edt reunion rcastelain htiaiba --from 2024-10-21 --to 2024-10-25
//! ```

use clap::Parser;
use edt_assistant::{
    api,
    chunk::ChunkMode,
    commands::{Cli, Commands},
    config::{EdtConfig, load_config},
    config_dir,
    embedding::{Embedder, create_embedder},
    retriever::{Query, Retriever, date_range},
    template::{self, ChatTemplate},
    timetable::fetch_timetable,
    vector_store::{self, VectorStore},
};
use once_cell::sync::OnceCell;
use std::{
    error::Error,
    fs::{self, File, OpenOptions},
    num::NonZeroUsize,
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Mutex,
};
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

static TRACING: OnceCell<()> = OnceCell::new();

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = tokio::runtime::Runtime::new()
        .map_err(Box::<dyn Error>::from)
        .and_then(|runtime| runtime.block_on(run(cli)));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

/// Console logs go to stderr; with a `log_dir`, logs are also appended to
/// `<log_dir>/edt.log`. `RUST_LOG` overrides the default `info` level.
fn init_tracing(log_dir: Option<&Path>) {
    TRACING.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let file_layer = log_dir.and_then(|dir| match open_log_file(dir) {
            Ok(file) => Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file))),
            Err(e) => {
                eprintln!("Cannot open log file in {}: {e}", dir.display());
                None
            }
        });

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(file_layer)
            .init();
    });
}

fn open_log_file(dir: &Path) -> std::io::Result<File> {
    fs::create_dir_all(dir)?;
    OpenOptions::new().create(true).append(true).open(dir.join("edt.log"))
}

async fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    match cli.command {
        Commands::Init => {
            init_tracing(None);
            init(cli.config)
        }
        command => {
            let config_path = match cli.config {
                Some(path) => path,
                None => config_dir()?.join("config.yaml"),
            };
            let config = load_config(&config_path.to_string_lossy())
                .map_err(|e| format!("Cannot load {}: {e} (run `edt init`)", config_path.display()))?;
            init_tracing(config.log_dir.as_deref());
            debug!("Config loaded from {}", config_path.display());

            dispatch(&config, command).await
        }
    }
}

async fn dispatch(config: &EdtConfig, command: Commands) -> Result<(), Box<dyn Error>> {
    match command {
        Commands::Init => init(None),

        Commands::Schedule { login } => {
            let courses = fetch_timetable(config, &login).await?;
            let mut table = String::from("| Cours | Début | Fin | Description |\n|:-|:-|:-|:-|\n");
            for course in &courses {
                table.push_str(&format!(
                    "| {} | {} | {} | {} |\n",
                    course.name,
                    course.start_label(),
                    course.end_label(),
                    course.description
                ));
            }
            termimad::print_text(&table);
            Ok(())
        }

        Commands::Ingest {
            login,
            per_event,
            replace,
        } => {
            let embedder = create_embedder(config)?;
            let mut store = open_store(config, embedder.as_ref())?;
            let mode = if per_event { ChunkMode::PerEvent } else { ChunkMode::Weekly };

            match api::ingest_user(config, embedder.as_ref(), &mut store, &login, mode, replace).await? {
                Some(added) => println!("{added} chunks indexed for {login}"),
                None => println!("{login} is already indexed, use --replace to refresh"),
            }
            Ok(())
        }

        Commands::Ask {
            login,
            question,
            from,
            to,
            top_k,
        } => {
            let embedder = create_embedder(config)?;
            let mut store = open_store(config, embedder.as_ref())?;
            api::ensure_indexed(config, embedder.as_ref(), &mut store, &login).await?;

            let top_k = top_k.and_then(NonZeroUsize::new).unwrap_or_else(|| config.top_k());
            let mut query = Query::new(login.as_str(), question.as_str(), top_k);
            if let (Some(from), Some(to)) = (from, to) {
                query = query.with_dates(date_range(from, to)?);
            }

            let client = api::create_client(config)?;
            let template = template::load_template(template::ASSISTANT).await?;
            let retriever = Retriever::new(embedder.as_ref(), Some(&store));
            let answer = api::ask(&client, config, &template, &retriever, &query).await?;
            termimad::print_text(&answer);
            Ok(())
        }

        Commands::Reunion {
            login,
            other_login,
            from,
            to,
        } => {
            let embedder = create_embedder(config)?;
            let mut store = open_store(config, embedder.as_ref())?;
            api::ensure_indexed(config, embedder.as_ref(), &mut store, &login).await?;

            let client = api::create_client(config)?;
            let template: ChatTemplate = template::load_template(template::REUNION).await?;
            let meeting = api::Meeting {
                main_user: login,
                second_user: other_login,
                from,
                to,
            };
            let answer = api::plan_meeting(&client, config, &template, embedder.as_ref(), &mut store, &meeting).await?;
            termimad::print_text(&answer);
            Ok(())
        }

        Commands::Wipe => {
            let path = config.index_dir()?;
            vector_store::wipe(&path)?;
            println!("Index {} removed", path.display());
            Ok(())
        }
    }
}

fn open_store(config: &EdtConfig, embedder: &dyn Embedder) -> Result<VectorStore, Box<dyn Error>> {
    if embedder.dimension() != config.embedding_dimension {
        debug!(
            "Embedder dimension {} overrides configured {}",
            embedder.dimension(),
            config.embedding_dimension
        );
    }
    Ok(VectorStore::open_or_create(config.index_dir()?, embedder.dimension()))
}

/// Write the default configuration and templates.
///
/// An existing configuration file is left untouched; templates are rewritten.
fn init(config_path: Option<PathBuf>) -> Result<(), Box<dyn Error>> {
    let dir = config_dir()?;
    template::write_default_templates(&dir)?;

    let config_path = match config_path {
        Some(path) => path,
        None => dir.join("config.yaml"),
    };
    if config_path.exists() {
        info!("Keeping existing config file: {}", config_path.display());
        return Ok(());
    }

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }
    info!("Creating config file: {}", config_path.display());
    fs::write(&config_path, serde_yaml::to_string(&EdtConfig::example())?)?;
    println!("Configuration written to {}, set api_key before asking questions", config_path.display());
    Ok(())
}
