use anyhow::{Context, Result};
use clap::Parser;
use pdf_rag::{
    config::Config,
    embedding::get_embedding_client,
    error::PipelineError,
    generation::get_generation_client,
    loader::FileDocumentLoader,
    logging,
    processing::{AnswerOutcome, IngestOutcome, RagService},
};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

const DEFAULT_QUESTION: &str = "What is the purpose of the document?";

#[derive(Parser)]
#[command(
    name = "pdf-rag",
    about = "Answer questions about a document using multi-query retrieval"
)]
struct Cli {
    /// Question to ask; defaults to asking for the document's purpose.
    question: Option<String>,
    /// Document to ingest (overrides DOC_PATH).
    #[arg(long)]
    document: Option<PathBuf>,
    /// Collection name (overrides COLLECTION_NAME).
    #[arg(long)]
    collection: Option<String>,
    /// Directory holding persisted collections (overrides PERSIST_DIRECTORY).
    #[arg(long)]
    persist_dir: Option<PathBuf>,
    /// Delete the persisted collection and embed the document again.
    #[arg(long)]
    rebuild: bool,
    /// Keep reading questions from stdin until EOF or `exit`.
    #[arg(long, short)]
    interactive: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_tracing();

    if let Err(err) = run(cli).await {
        report(&err);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load().context("failed to load configuration")?;
    if let Some(document) = cli.document {
        config.doc_path = document;
    }
    if let Some(collection) = cli.collection {
        config.collection_name = collection;
    }
    if let Some(persist_dir) = cli.persist_dir {
        config.persist_directory = persist_dir;
    }
    config.validate().context("invalid command-line override")?;

    let embedder =
        get_embedding_client(&config).context("failed to initialize embedding client")?;
    let generator =
        get_generation_client(&config).context("failed to initialize generation client")?;
    let service = RagService::new(
        &config,
        embedder,
        generator,
        Arc::new(FileDocumentLoader::new()),
    )?;

    tracing::info!(document = %config.doc_path.display(), "Starting");
    service.ensure_models().await?;
    let ingest = if cli.rebuild {
        service.rebuild().await?
    } else {
        service.ingest().await?
    };

    if cli.interactive {
        return interactive(&service, &ingest).await;
    }

    let question = cli.question.unwrap_or_else(|| DEFAULT_QUESTION.to_string());
    let outcome = service.ask(&ingest.collection, &question).await?;
    print_answer(&outcome);
    tracing::debug!(metrics = ?service.metrics_snapshot(), "Run finished");
    Ok(())
}

async fn interactive(service: &RagService, ingest: &IngestOutcome) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("Question: ");
        std::io::stdout().flush().context("failed to flush stdout")?;

        let Some(line) = lines.next_line().await.context("failed to read stdin")? else {
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            println!("please enter a question");
            continue;
        }
        if matches!(question, "exit" | "quit") {
            break;
        }

        match service.ask(&ingest.collection, question).await {
            Ok(outcome) => print_answer(&outcome),
            Err(err) => report_pipeline(&err),
        }
    }
    tracing::debug!(metrics = ?service.metrics_snapshot(), "Session finished");
    Ok(())
}

fn print_answer(outcome: &AnswerOutcome) {
    if outcome.context_empty {
        eprintln!("note: no relevant passages were retrieved; the answer is not grounded in the document");
    }
    println!("Response:\n{}", outcome.answer);
}

fn report(err: &anyhow::Error) {
    match err.downcast_ref::<PipelineError>() {
        Some(pipeline) => report_pipeline(pipeline),
        None => eprintln!("error: {err:#}"),
    }
}

fn report_pipeline(err: &PipelineError) {
    eprintln!("error: {} stage failed: {err}", err.stage());
    if err.is_transient() {
        eprintln!("the service was unreachable or too slow; retrying later may succeed");
    }
}
