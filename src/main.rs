use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use log::{error, info, warn};
use std::io::{self, Write};
use std::path::Path;

use docs_rag::config::Settings;
use docs_rag::context::ChatHistory;
use docs_rag::database::QdrantClient;
use docs_rag::document::{Element, FileKind, LocalPartitioner, Partitioner};
use docs_rag::openai::OpenAiClient;
use docs_rag::pipeline::{self, AskOutcome, BuildReport};
use docs_rag::rag::Answer;
use docs_rag::unstructured::UnstructuredClient;

/// Ask questions about a folder of PDFs and slide decks
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rebuild the index from every file in the data directory
    Build,
    /// Answer a single question from the index
    Ask {
        /// The question to answer
        question: String,
    },
    /// Interactive session (default)
    Shell,
}

/// The remote partition service when configured, local PDF extraction otherwise
enum SourcePartitioner {
    Remote(UnstructuredClient),
    Local(LocalPartitioner),
}

impl Partitioner for SourcePartitioner {
    async fn partition(&self, path: &Path, kind: FileKind) -> Result<Vec<Element>> {
        match self {
            SourcePartitioner::Remote(client) => client.partition(path, kind).await,
            SourcePartitioner::Local(local) => local.partition(path, kind).await,
        }
    }
}

struct App {
    settings: Settings,
    partitioner: SourcePartitioner,
    openai: OpenAiClient,
    qdrant: QdrantClient,
}

impl App {
    fn new(settings: Settings) -> Result<Self> {
        let partitioner = match &settings.unstructured {
            Some(config) => SourcePartitioner::Remote(UnstructuredClient::new(config.clone())),
            None => {
                warn!("UNSTRUCTURED_API_KEY not set, partitioning PDFs locally");
                SourcePartitioner::Local(LocalPartitioner)
            }
        };
        let openai = OpenAiClient::new(settings.openai.clone());
        let qdrant = QdrantClient::new(settings.qdrant.clone())
            .context("Failed to initialize Qdrant client")?;

        Ok(App {
            settings,
            partitioner,
            openai,
            qdrant,
        })
    }

    async fn build(&self) -> Result<BuildReport> {
        pipeline::build_index(&self.settings, &self.partitioner, &self.openai, &self.qdrant).await
    }

    async fn ask(&self, question: &str, history: &ChatHistory) -> Result<AskOutcome> {
        pipeline::ask(
            &self.settings,
            &self.openai,
            &self.openai,
            &self.qdrant,
            question,
            history,
        )
        .await
    }

    /// Run the interactive question loop
    async fn run_shell(&self) -> Result<()> {
        println!(
            "Ask questions about the documents in {}. Type ':build' to rebuild the index, 'exit' to quit.",
            self.settings.data_dir.display()
        );

        let stdin = io::stdin();
        let mut stdout = io::stdout();
        let mut buffer = String::new();
        let mut history = ChatHistory::default();

        loop {
            print!("\nYour question: ");
            stdout.flush()?;

            buffer.clear();
            if stdin.read_line(&mut buffer)? == 0 {
                break;
            }

            let question = buffer.trim();

            if question.is_empty() {
                continue;
            }

            if question.eq_ignore_ascii_case("exit") {
                info!("Goodbye!");
                break;
            }

            if question == ":build" {
                match self.build().await {
                    Ok(report) => {
                        print_build_report(&report);
                        history.clear();
                    }
                    Err(e) => error!("Failed to build index: {:#}", e),
                }
                continue;
            }

            match self.ask(question, &history).await {
                Ok(AskOutcome::IndexMissing) => print_index_missing(),
                Ok(AskOutcome::Answered(answer)) => {
                    print_answer(&answer);
                    history.push(question, answer.text);
                }
                Err(e) => error!("Failed to answer: {:#}", e),
            }
        }

        Ok(())
    }
}

fn print_build_report(report: &BuildReport) {
    println!(
        "Index built! {} documents, {} chunks.",
        report.documents, report.chunks
    );
    if !report.failures.is_empty() {
        println!("Skipped {} files:", report.failures.len());
        for failure in &report.failures {
            println!("  {}: {}", failure.path.display(), failure.error);
        }
    }
}

fn print_index_missing() {
    println!("Build the index first (run `docs-rag build` or type ':build').");
}

fn print_answer(answer: &Answer) {
    println!("\n{}", answer.text);
    if !answer.sources.is_empty() {
        println!("\nSources:");
        for source in &answer.sources {
            println!("  - {}", source);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize environment
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();

    let settings = Settings::from_env().context("Invalid configuration")?;
    let app = App::new(settings)?;

    match args.command.unwrap_or(Command::Shell) {
        Command::Build => {
            let report = app.build().await.context("Failed to build index")?;
            print_build_report(&report);
        }
        Command::Ask { question } => {
            match app
                .ask(&question, &ChatHistory::default())
                .await
                .context("Failed to answer question")?
            {
                AskOutcome::IndexMissing => print_index_missing(),
                AskOutcome::Answered(answer) => print_answer(&answer),
            }
        }
        Command::Shell => app.run_shell().await.context("Error in query loop")?,
    }

    Ok(())
}
