use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rustyrag::{
    config, logging,
    processing::{ManagerSettings, SearchIndexManager},
};

#[derive(Parser)]
#[command(
    name = "rustyrag",
    about = "Build, upload, and query a vector + semantic search index"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Chunk markdown documents and write the embeddings corpus.
    Build {
        #[arg(long)]
        input_dir: PathBuf,
        #[arg(long)]
        output: PathBuf,
        #[arg(long)]
        sentences_per_embedding: Option<usize>,
    },
    /// Create the index, reusing it when it already exists.
    CreateIndex {
        #[arg(long)]
        dimensions: Option<usize>,
        /// Fail instead of reusing an existing index.
        #[arg(long)]
        strict: bool,
    },
    /// Bind the index, creating it only when absent.
    EnsureIndex {
        #[arg(long)]
        dimensions: Option<usize>,
    },
    /// Upload an embeddings corpus into the index.
    Upload {
        #[arg(long)]
        corpus: PathBuf,
    },
    /// Query the index and print the formatted context.
    Search {
        /// Use semantic ranking instead of a vector query.
        #[arg(long)]
        semantic: bool,
        query: String,
    },
    /// Print the document count and metrics of the index.
    Status,
    /// Delete the index.
    DeleteIndex,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_tracing();
    let config = config::init_config().context("Failed to load configuration")?;
    let cli = Cli::parse();
    let mut manager =
        SearchIndexManager::from_config(config).context("Failed to build index manager")?;

    match cli.command {
        Command::Build {
            input_dir,
            output,
            sentences_per_embedding,
        } => {
            let sentences = sentences_per_embedding.unwrap_or(config.sentences_per_embedding);
            let rows = manager
                .build_embeddings_file(&input_dir, &output, sentences)
                .await
                .with_context(|| format!("Failed to build corpus from {}", input_dir.display()))?;
            println!("{rows} rows written to {}", output.display());
        }
        Command::CreateIndex { dimensions, strict } => {
            let created = manager.create_index(dimensions, strict).await?;
            print_binding(&manager, created);
        }
        Command::EnsureIndex { dimensions } => {
            let created = manager.ensure_index_created(dimensions).await?;
            print_binding(&manager, created);
        }
        Command::Upload { corpus } => {
            manager.bind_existing_index().await?;
            let summary = manager
                .upload_documents(&corpus)
                .await
                .with_context(|| format!("Failed to upload {}", corpus.display()))?;
            println!(
                "{} documents uploaded, {} rejected",
                summary.succeeded,
                summary.failed.len()
            );
            for failed in &summary.failed {
                println!(
                    "  {} ({}): {}",
                    failed.key,
                    failed.status_code,
                    failed.message.as_deref().unwrap_or("no message")
                );
            }
        }
        Command::Search { semantic, query } => {
            manager.bind_existing_index().await?;
            let context = if semantic {
                manager.semantic_search(&query).await?
            } else {
                manager.search(&query).await?
            };
            println!("{context}");
        }
        Command::Status => {
            manager.bind_existing_index().await?;
            let count = manager.document_count().await?;
            println!("{}: {count} documents", manager.settings().index_name);
            println!("{}", serde_json::to_string_pretty(&manager.metrics_snapshot())?);
        }
        Command::DeleteIndex => {
            manager.bind_existing_index().await?;
            manager.delete_index().await?;
            println!("Deleted index {}", manager.settings().index_name);
        }
    }
    Ok(())
}

fn print_binding(manager: &SearchIndexManager, created: bool) {
    let name = &manager.settings().index_name;
    if created {
        println!("Created index {name}");
    } else {
        println!("Reusing index {name}");
    }
}
