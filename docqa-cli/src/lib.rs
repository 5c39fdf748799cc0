//! Command-line launcher for docqa.
//!
//! ```bash
//! # Index every Markdown file under ./documents
//! docqa ingest
//!
//! # Ingest (or re-ingest) a single file
//! docqa -i documents/schedule.md
//!
//! # Ask a question
//! docqa query When is the dentist appointment?
//!
//! # Move a line to the end of a file and re-index it
//! docqa update documents/schedule.md --move-to-end Dentist
//! ```
//!
//! Exit codes: `0` success, `2` usage or configuration error, `1` load or
//! storage failure, `3` embedding or completion service failure.

pub mod telemetry;

use std::collections::BTreeSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::error::ErrorKind;
use clap::{ArgAction, Args, CommandFactory, Parser, Subcommand};
use docqa_rag::config::DEFAULT_API_BASE;
use docqa_rag::document::source_id_for;
use docqa_rag::{
    AnswerComposer, Chunk, DocumentTransform, FileVectorStore, FixedSizeChunker, MoveLineToEnd,
    OpenAICompletionProvider, OpenAIConfig, OpenAIEmbeddingProvider, RagConfig, RagConfigBuilder,
    RagError, RagPipeline, Result,
};
use tracing::debug;

/// Config file read from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "docqa.toml";

/// Exit code for usage errors, help requests and configuration errors.
pub const EXIT_USAGE: u8 = 2;

#[derive(Debug, Parser)]
#[command(
    name = "docqa",
    version,
    about = "Answer questions about a directory of Markdown notes",
    arg_required_else_help = true
)]
pub struct Cli {
    /// Ingest or update a single document
    #[arg(short, long, value_name = "PATH")]
    pub input: Option<PathBuf>,

    #[command(flatten)]
    pub options: ConfigArgs,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Settings that override the config file.
#[derive(Debug, Default, Args)]
pub struct ConfigArgs {
    /// Config file (default: ./docqa.toml if present)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory documents are loaded from
    #[arg(long, global = true, value_name = "DIR")]
    pub documents_dir: Option<PathBuf>,

    /// Directory the vector store lives in
    #[arg(long, global = true, value_name = "DIR")]
    pub store_dir: Option<PathBuf>,

    /// Vector store collection name
    #[arg(long, global = true)]
    pub collection: Option<String>,

    /// Maximum characters per chunk
    #[arg(long, global = true)]
    pub chunk_size: Option<usize>,

    /// Characters shared by consecutive chunks
    #[arg(long, global = true)]
    pub chunk_overlap: Option<usize>,

    /// Number of chunks retrieved per question
    #[arg(long, global = true)]
    pub top_k: Option<usize>,

    /// Completion model
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Embedding model
    #[arg(long, global = true)]
    pub embedding_model: Option<String>,

    /// More logging (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Ingest every matching document under the documents directory
    Ingest {
        /// Glob pattern relative to the documents directory
        #[arg(long)]
        glob: Option<String>,
    },

    /// Ask a question about the ingested documents
    Query {
        /// Question text
        #[arg(required = true, num_args = 1.., trailing_var_arg = true)]
        question: Vec<String>,
    },

    /// Edit a document on disk, then re-ingest it
    Update {
        /// Document to update
        path: PathBuf,
        /// Move every line containing TEXT to the end of the document
        #[arg(long, value_name = "TEXT")]
        move_to_end: Option<String>,
    },

    /// Remove a document's chunks from the store
    Delete {
        /// Document path as it was ingested
        path: PathBuf,
    },

    /// List the documents present in the store
    Sources,
}

impl Command {
    /// Whether the command calls the embedding or completion API.
    fn needs_network(&self) -> bool {
        !matches!(self, Command::Delete { .. } | Command::Sources)
    }
}

/// Exit code for a pipeline error.
pub fn exit_code_for(err: &RagError) -> u8 {
    match err {
        RagError::ConfigError(_) => EXIT_USAGE,
        RagError::LoadError { .. } | RagError::VectorStoreError { .. } => 1,
        RagError::EmbeddingError { .. } | RagError::CompletionError { .. } => 3,
    }
}

/// Exit code for an argument parsing outcome. `--version` is a success;
/// help and every usage error exit with [`EXIT_USAGE`].
pub fn exit_code_for_usage(err: &clap::Error) -> u8 {
    match err.kind() {
        ErrorKind::DisplayVersion => 0,
        _ => EXIT_USAGE,
    }
}

/// Parse `args`, run the requested command and return the process exit code.
///
/// Output goes to stdout; logs and errors go to stderr.
pub async fn run<I, T>(args: I) -> u8
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return exit_code_for_usage(&err);
        }
    };

    if let Err(e) = telemetry::init(cli.options.verbose) {
        debug!(error = %e, "logging already initialised");
    }

    let invocation = match (cli.input, cli.command) {
        (Some(path), None) => Invocation::Input(path),
        (None, Some(command)) => Invocation::Command(command),
        (Some(_), Some(_)) => {
            let err = Cli::command()
                .error(ErrorKind::ArgumentConflict, "--input cannot be combined with a subcommand");
            let _ = err.print();
            return EXIT_USAGE;
        }
        (None, None) => {
            let _ = Cli::command().print_help();
            return EXIT_USAGE;
        }
    };

    match execute(&cli.options, invocation).await {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("error: {err}");
            exit_code_for(&err)
        }
    }
}

/// What the user asked for, after parsing.
#[derive(Debug)]
pub enum Invocation {
    /// `-i <PATH>`
    Input(PathBuf),
    /// A subcommand.
    Command(Command),
}

impl Invocation {
    fn needs_network(&self) -> bool {
        match self {
            Invocation::Input(_) => true,
            Invocation::Command(command) => command.needs_network(),
        }
    }
}

/// Resolve configuration: defaults, then the config file, then flags.
///
/// # Errors
///
/// Returns [`RagError::ConfigError`] if the file is unreadable or the merged
/// values are invalid.
pub fn resolve_config(options: &ConfigArgs) -> Result<RagConfig> {
    let base = match &options.config {
        Some(path) => RagConfig::from_toml_file(path)?,
        None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
            RagConfig::from_toml_file(Path::new(DEFAULT_CONFIG_FILE))?
        }
        None => RagConfig::default(),
    };

    let mut builder = RagConfigBuilder::from_config(base);
    if let Some(dir) = &options.documents_dir {
        builder = builder.documents_dir(dir);
    }
    if let Some(dir) = &options.store_dir {
        builder = builder.store_dir(dir);
    }
    if let Some(collection) = &options.collection {
        builder = builder.collection(collection);
    }
    if let Some(size) = options.chunk_size {
        builder = builder.chunk_size(size);
    }
    if let Some(overlap) = options.chunk_overlap {
        builder = builder.chunk_overlap(overlap);
    }
    if let Some(k) = options.top_k {
        builder = builder.top_k(k);
    }
    if let Some(model) = &options.model {
        builder = builder.model_name(model);
    }
    if let Some(model) = &options.embedding_model {
        builder = builder.embedding_model(model);
    }
    builder.build()
}

/// Connection settings for the OpenAI providers.
///
/// An `api_base` set in the config wins over `OPENAI_BASE_URL`.
fn openai_config(config: &RagConfig) -> Result<OpenAIConfig> {
    let openai = OpenAIConfig::from_env()?
        .with_timeout(std::time::Duration::from_secs(config.request_timeout_secs));
    Ok(if config.api_base != DEFAULT_API_BASE {
        openai.with_api_base(&config.api_base)
    } else {
        openai
    })
}

/// Wire the pipeline. Offline commands get an embedder that is never called,
/// so they work without a credential.
fn build_pipeline(config: RagConfig, online: bool) -> Result<RagPipeline> {
    // Credentials are checked before anything touches the disk.
    let openai = if online { Some(openai_config(&config)?) } else { None };

    let store = FileVectorStore::open(&config.store_dir)?;
    let chunker = FixedSizeChunker::new(config.chunk_size, config.chunk_overlap)?;
    let mut builder = RagPipeline::builder()
        .vector_store(Arc::new(store))
        .chunker(Arc::new(chunker));

    builder = match openai {
        Some(openai) => {
            let embedder = OpenAIEmbeddingProvider::new(openai.clone())?
                .with_model(&config.embedding_model)
                .with_batch_size(config.embedding_batch_size);
            let completion =
                OpenAICompletionProvider::new(openai)?.with_model(&config.model_name);
            builder.embedding_provider(Arc::new(embedder)).answer_composer(
                AnswerComposer::new(Arc::new(completion)).with_max_tokens(config.max_tokens),
            )
        }
        None => builder.embedding_provider(Arc::new(offline::Unavailable)),
    };

    builder.config(config).build()
}

/// Run an invocation to completion.
///
/// # Errors
///
/// Returns the first error raised by configuration, loading, the services or
/// the store.
pub async fn execute(options: &ConfigArgs, invocation: Invocation) -> Result<()> {
    let mut config = resolve_config(options)?;
    if let Invocation::Command(Command::Ingest { glob: Some(glob) }) = &invocation {
        config.glob = glob.clone();
    }
    debug!(?config, "resolved configuration");

    let pipeline = build_pipeline(config, invocation.needs_network())?;

    match invocation {
        Invocation::Input(path) => {
            let records = pipeline.ingest_path(&path).await?;
            println!("Ingested {} ({} chunks)", source_id_for(&path), records.len());
        }
        Invocation::Command(Command::Ingest { .. }) => {
            let report = pipeline.ingest_directory().await?;
            println!("Ingested {} documents ({} chunks)", report.documents, report.chunks);
        }
        Invocation::Command(Command::Query { question }) => {
            let question = question.join(" ");
            let answer = pipeline.ask(&question).await?;
            println!("{}", answer.answer_text);
            for source in distinct_sources(&answer.context_chunks) {
                println!("source: {source}");
            }
        }
        Invocation::Command(Command::Update { path, move_to_end }) => {
            let transforms: Vec<Box<dyn DocumentTransform>> = match move_to_end {
                Some(needle) => vec![Box::new(MoveLineToEnd::new(needle)?)],
                None => Vec::new(),
            };
            let transforms: Vec<&dyn DocumentTransform> =
                transforms.iter().map(|t| t.as_ref()).collect();
            let records = pipeline.update_document(&path, &transforms).await?;
            println!("Updated {} ({} chunks)", source_id_for(&path), records.len());
        }
        Invocation::Command(Command::Delete { path }) => {
            let source = source_id_for(&path);
            let removed = pipeline.delete_source(&source).await?;
            println!("Deleted {source} ({removed} chunks)");
        }
        Invocation::Command(Command::Sources) => {
            for source in pipeline.sources().await? {
                println!("{source}");
            }
        }
    }
    Ok(())
}

/// Sources of `chunks` in first-seen order, each once.
pub fn distinct_sources(chunks: &[Chunk]) -> Vec<&str> {
    let mut seen = BTreeSet::new();
    chunks
        .iter()
        .map(|chunk| chunk.source_id.as_str())
        .filter(|source| seen.insert(*source))
        .collect()
}

mod offline {
    use async_trait::async_trait;
    use docqa_rag::{EmbeddingProvider, RagError, Result};

    /// Placeholder for commands that never embed.
    pub(crate) struct Unavailable;

    #[async_trait]
    impl EmbeddingProvider for Unavailable {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(RagError::ConfigError("embedding is not available for this command".into()))
        }

        fn dimensions(&self) -> usize {
            0
        }
    }
}
