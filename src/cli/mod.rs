//! CLI command implementations.
//!
//! Thin operator surface over the indexing pipeline and query service. The
//! HTTP layer, when deployed, wires the same services; this module exists so
//! a deployment can be driven end-to-end from a shell.

// CLI output goes to stdout/stderr by design.
#![allow(clippy::print_stdout)]
#![allow(clippy::print_stderr)]

use crate::config::GraphloreConfig;
use crate::embedding::{Embedder, HashEmbedder, OpenAiEmbedder};
use crate::indexing::IndexingPipeline;
use crate::llm::{AnthropicClient, LlmProvider, OpenAiClient, ResilientLlm};
use crate::models::{ClaimStatus, EntityId, PruningMethod, TogConfig};
use crate::query::QueryService;
use crate::storage::{
    ClaimFilter, DocumentStore, GraphStore, SqliteDocumentStore, SqliteGraphStore,
    SqliteVectorStore, VectorStore,
};
use crate::{Error, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Knowledge-graph construction and question answering over Markdown corpora.
#[derive(Debug, Parser)]
#[command(name = "graphlore", version, about)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Index a Markdown document into the graph.
    Index {
        /// Path to the document.
        file: PathBuf,
        /// Document id (defaults to the file stem).
        #[arg(long)]
        id: Option<String>,
    },
    /// Re-upload a document (content-hash short-circuit applies).
    Update {
        /// Document id.
        id: String,
        /// Path to the new content.
        file: PathBuf,
    },
    /// Reprocess a document from its stored file path.
    Reprocess {
        /// Document id.
        id: String,
        /// Skip the content-hash short-circuit.
        #[arg(long)]
        force_full: bool,
    },
    /// Delete a document and its graph footprint.
    Delete {
        /// Document id.
        id: String,
    },
    /// List documents.
    Docs,
    /// Ask a question.
    Query {
        #[command(subcommand)]
        engine: QueryCommand,
    },
    /// Community maintenance.
    Communities {
        #[command(subcommand)]
        action: CommunitiesCommand,
    },
    /// Entity maintenance.
    Entity {
        #[command(subcommand)]
        action: EntityCommand,
    },
    /// Graph statistics.
    Stats,
    /// Recent query history.
    History {
        /// Maximum records.
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(Debug, Subcommand)]
enum QueryCommand {
    /// Entity-anchored neighborhood query.
    Local {
        /// The question.
        question: String,
        /// Neighborhood hops (1 or 2).
        #[arg(long, default_value_t = 2)]
        hops: usize,
        /// Restrict to these document ids (comma separated).
        #[arg(long, value_delimiter = ',')]
        documents: Option<Vec<String>>,
    },
    /// Map-reduce over community summaries.
    Global {
        /// The question.
        question: String,
        /// Force map-reduce on or off.
        #[arg(long)]
        mapreduce: Option<bool>,
        /// Communities per map batch.
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Multi-hop ToG traversal.
    Tog {
        /// The question.
        question: String,
        /// Relations retained per depth.
        #[arg(long)]
        width: Option<usize>,
        /// Maximum hops.
        #[arg(long)]
        depth: Option<usize>,
        /// Entities carried to the next depth.
        #[arg(long)]
        retain: Option<usize>,
        /// Pruning backend: llm, bm25, or sentence_bert.
        #[arg(long)]
        pruning: Option<String>,
        /// Disable the sufficiency gate.
        #[arg(long)]
        no_sufficiency: bool,
        /// Restrict to these document ids (comma separated).
        #[arg(long, value_delimiter = ',')]
        documents: Option<Vec<String>>,
    },
    /// Filter recorded claims.
    Claims {
        /// Optional question to answer over the matching claims.
        #[arg(long)]
        question: Option<String>,
        /// Subject entity name.
        #[arg(long)]
        subject: Option<String>,
        /// Claim category.
        #[arg(long)]
        claim_type: Option<String>,
        /// Status tag: TRUE, FALSE, or SUSPECTED.
        #[arg(long)]
        status: Option<String>,
        /// Maximum claims returned.
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
}

#[derive(Debug, Subcommand)]
enum CommunitiesCommand {
    /// Run full community detection and summarize new communities.
    Detect,
    /// Summarize communities without a report.
    Summarize,
}

#[derive(Debug, Subcommand)]
enum EntityCommand {
    /// Fuzzy-search entities by name similarity.
    Search {
        /// Name to match.
        name: String,
        /// Similarity floor.
        #[arg(long, default_value_t = 0.5)]
        threshold: f64,
        /// Maximum results.
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Merge duplicate entities into a primary entity.
    Merge {
        /// Primary entity id.
        primary: String,
        /// Duplicate entity ids.
        duplicates: Vec<String>,
        /// Replacement canonical name.
        #[arg(long)]
        canonical_name: Option<String>,
    },
    /// Add an alias to an entity (idempotent).
    AliasAdd {
        /// Entity id.
        id: String,
        /// Alias to add.
        alias: String,
    },
    /// List an entity's aliases.
    AliasList {
        /// Entity id.
        id: String,
    },
}

/// Shared backends for one CLI invocation.
struct Runtime {
    pipeline: IndexingPipeline,
    queries: QueryService,
    documents: Arc<dyn DocumentStore>,
    graph: Arc<dyn GraphStore>,
}

impl Runtime {
    fn build(config: &GraphloreConfig) -> Result<Self> {
        let graph: Arc<dyn GraphStore> =
            Arc::new(SqliteGraphStore::new(config.storage.graph_db_path())?);
        let vectors: Arc<dyn VectorStore> = Arc::new(SqliteVectorStore::new(
            config.storage.vector_db_path(),
            config.embedding.dimensions,
        )?);
        let documents: Arc<dyn DocumentStore> =
            Arc::new(SqliteDocumentStore::new(config.storage.document_db_path())?);

        let llm = build_llm(config);
        let embedder = build_embedder(config);

        let pipeline = IndexingPipeline::new(
            config.clone(),
            Arc::clone(&graph),
            Arc::clone(&vectors),
            Arc::clone(&documents),
            Arc::clone(&llm),
            Arc::clone(&embedder),
        );
        let queries = QueryService::new(
            config,
            Arc::clone(&graph),
            Arc::clone(&documents),
            llm,
            embedder,
        );
        Ok(Self {
            pipeline,
            queries,
            documents,
            graph,
        })
    }
}

/// Picks the provider for the configured model and wraps it with the shared
/// rate limiter and retry policy. Claude-family models route to Anthropic,
/// everything else to the `OpenAI`-compatible endpoint.
fn build_llm(config: &GraphloreConfig) -> Arc<dyn LlmProvider> {
    let base: Arc<dyn LlmProvider> = if config.llm.model.starts_with("claude") {
        Arc::new(AnthropicClient::new(&config.llm.model))
    } else {
        Arc::new(OpenAiClient::new(&config.llm.model))
    };
    Arc::new(ResilientLlm::from_config(base, &config.llm))
}

fn build_embedder(config: &GraphloreConfig) -> Arc<dyn Embedder> {
    if std::env::var("OPENAI_API_KEY").is_ok() {
        Arc::new(OpenAiEmbedder::new(&config.embedding))
    } else {
        tracing::warn!("OPENAI_API_KEY not set; using deterministic hash embeddings");
        Arc::new(HashEmbedder::new(config.embedding.dimensions))
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|e| Error::failed("render_output", e.to_string()))?;
    println!("{rendered}");
    Ok(())
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .map_err(|e| Error::InvalidInput(format!("cannot read {}: {e}", path.display())))
}

fn document_id_for(path: &Path, id: Option<String>) -> String {
    id.unwrap_or_else(|| {
        path.file_stem()
            .map_or_else(|| uuid::Uuid::new_v4().to_string(), |stem| {
                stem.to_string_lossy().to_string()
            })
    })
}

/// Runs the CLI.
///
/// # Errors
///
/// Returns an error for invalid input or backend failures; `main` maps it to
/// a nonzero exit.
pub fn run(cli: Cli) -> Result<()> {
    let config = GraphloreConfig::from_env();
    let runtime = Runtime::build(&config)?;

    match cli.command {
        Command::Index { file, id } => {
            let text = read_file(&file)?;
            let id = document_id_for(&file, id);
            let name = file
                .file_name()
                .map_or_else(|| id.clone(), |n| n.to_string_lossy().to_string());
            let report =
                runtime
                    .pipeline
                    .index_document(&id, &name, &file.to_string_lossy(), &text)?;
            print_json(&report)
        },
        Command::Update { id, file } => {
            let text = read_file(&file)?;
            let outcome = runtime.pipeline.update_document(&id, &text)?;
            print_json(&outcome)
        },
        Command::Reprocess { id, force_full } => {
            let outcome = runtime.pipeline.reprocess_document(&id, force_full)?;
            print_json(&outcome)
        },
        Command::Delete { id } => {
            let stats = runtime.pipeline.delete_document(&id)?;
            print_json(&stats)
        },
        Command::Docs => {
            let docs = runtime.documents.list_documents()?;
            print_json(&docs)
        },
        Command::Query { engine } => run_query(&runtime, engine),
        Command::Entity { action } => run_entity(&runtime, action),
        Command::Communities { action } => match action {
            CommunitiesCommand::Detect => {
                let communities = runtime.pipeline.detect_and_summarize()?;
                println!("{communities} communities detected");
                Ok(())
            },
            CommunitiesCommand::Summarize => {
                let summarized = runtime.pipeline.summarize_unsummarized()?;
                println!("{summarized} communities summarized");
                Ok(())
            },
        },
        Command::Stats => {
            let stats = runtime.queries.stats()?;
            print_json(&stats)
        },
        Command::History { limit } => {
            let history = runtime.queries.history(limit)?;
            print_json(&history)
        },
    }
}

fn run_entity(runtime: &Runtime, action: EntityCommand) -> Result<()> {
    match action {
        EntityCommand::Search {
            name,
            threshold,
            limit,
        } => {
            let mut scored: Vec<(f64, crate::models::Entity)> = runtime
                .graph
                .list_entities(100_000, None)?
                .into_iter()
                .map(|entity| {
                    (
                        crate::indexing::name_similarity(&name, &entity.name),
                        entity,
                    )
                })
                .filter(|(score, _)| *score >= threshold)
                .collect();
            scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
            scored.truncate(limit);
            let rows: Vec<serde_json::Value> = scored
                .into_iter()
                .map(|(score, entity)| {
                    serde_json::json!({
                        "id": entity.id,
                        "name": entity.name,
                        "type": entity.entity_type,
                        "similarity": score,
                        "mention_count": entity.mention_count,
                    })
                })
                .collect();
            print_json(&rows)
        },
        EntityCommand::Merge {
            primary,
            duplicates,
            canonical_name,
        } => {
            if duplicates.is_empty() {
                return Err(Error::InvalidInput("no duplicate ids given".to_string()));
            }
            let duplicate_ids: Vec<EntityId> = duplicates
                .iter()
                .map(|id| EntityId::new(id.clone()))
                .collect();
            let merged = runtime.graph.merge_entities(
                &EntityId::new(primary),
                &duplicate_ids,
                canonical_name.as_deref(),
            )?;
            print_json(&merged)
        },
        EntityCommand::AliasAdd { id, alias } => {
            let id = EntityId::new(id);
            let mut entity = runtime
                .graph
                .get_entity(&id)?
                .ok_or_else(|| Error::NotFound {
                    resource: "entity".to_string(),
                    id: id.to_string(),
                })?;
            let added = entity.add_alias(alias);
            if added {
                runtime.graph.put_entity(&entity)?;
            }
            println!("{}", if added { "added" } else { "already present" });
            Ok(())
        },
        EntityCommand::AliasList { id } => {
            let id = EntityId::new(id);
            let entity = runtime
                .graph
                .get_entity(&id)?
                .ok_or_else(|| Error::NotFound {
                    resource: "entity".to_string(),
                    id: id.to_string(),
                })?;
            print_json(&entity.aliases)
        },
    }
}

fn run_query(runtime: &Runtime, engine: QueryCommand) -> Result<()> {
    match engine {
        QueryCommand::Local {
            question,
            hops,
            documents,
        } => {
            let result = runtime
                .queries
                .local_query(&question, hops, documents.as_deref())?;
            print_json(&result)
        },
        QueryCommand::Global {
            question,
            mapreduce,
            batch_size,
        } => {
            let result = runtime.queries.global_query(&question, mapreduce, batch_size)?;
            print_json(&result)
        },
        QueryCommand::Tog {
            question,
            width,
            depth,
            retain,
            pruning,
            no_sufficiency,
            documents,
        } => {
            let mut config = TogConfig::default();
            if let Some(width) = width {
                config.search_width = width;
            }
            if let Some(depth) = depth {
                config.search_depth = depth;
            }
            if let Some(retain) = retain {
                config.num_retain_entity = retain;
            }
            if let Some(pruning) = pruning {
                config.pruning_method = match pruning.to_lowercase().as_str() {
                    "llm" => PruningMethod::Llm,
                    "bm25" => PruningMethod::Bm25,
                    "sentence_bert" | "sbert" => PruningMethod::SentenceBert,
                    other => {
                        return Err(Error::InvalidInput(format!(
                            "unknown pruning method: {other}"
                        )));
                    },
                };
            }
            config.enable_sufficiency_check = !no_sufficiency;
            let result = runtime
                .queries
                .tog_query(&question, &config, documents.as_deref());
            print_json(&result)
        },
        QueryCommand::Claims {
            question,
            subject,
            claim_type,
            status,
            limit,
        } => {
            let status = match status {
                Some(raw) => Some(ClaimStatus::parse(&raw).ok_or_else(|| {
                    Error::InvalidInput(format!("unknown claim status: {raw}"))
                })?),
                None => None,
            };
            let filter = ClaimFilter {
                subject,
                claim_type,
                status,
                limit,
            };
            let result = runtime.queries.claims_query(question.as_deref(), &filter)?;
            print_json(&result)
        },
    }
}
