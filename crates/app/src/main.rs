use std::fs::OpenOptions;
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use pdf_qa_core::{
    Assistant, ChatRole, Ingestor, LopdfExtractor, PipelineError, RecursiveSplitter, Session,
    Settings,
};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const NO_PDF_NOTICE: &str = "Please upload and process a PDF first.";

#[derive(Parser)]
#[command(name = "pdf-qa", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Chat model served by Ollama (overrides OLLAMA_MODEL_ID).
    #[arg(long, global = true)]
    model: Option<String>,

    /// Directory holding the vector store (overrides CHROMA_PERSIST_DIR).
    #[arg(long, global = true)]
    persist_dir: Option<PathBuf>,

    /// Number of passages retrieved per question (overrides RETRIEVAL_TOP_K).
    #[arg(long, global = true)]
    top_k: Option<usize>,
}

#[derive(Subcommand)]
enum Command {
    /// Split and index a PDF into the vector store.
    Ingest {
        #[arg(long)]
        pdf: PathBuf,
    },
    /// Print the chunks a PDF splits into, with page numbers.
    Chunks {
        #[arg(long)]
        pdf: PathBuf,
    },
    /// Index a PDF and answer one question about it.
    Ask {
        #[arg(long)]
        pdf: PathBuf,
        #[arg(long)]
        question: String,
    },
    /// Interactive chat; load a PDF with --pdf or /load <file>.
    Chat {
        #[arg(long)]
        pdf: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let mut settings = Settings::from_env()?;
    if let Some(model) = cli.model {
        settings.model_id = model;
    }
    if let Some(persist_dir) = cli.persist_dir {
        settings.persist_dir = persist_dir;
    }
    if let Some(top_k) = cli.top_k {
        settings.top_k = top_k;
    }
    settings.validate()?;

    init_logging(&settings.log_file)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        model = %settings.model_id,
        host = %settings.ollama_host,
        "pdf-qa boot"
    );

    match cli.command {
        Command::Chunks { pdf } => {
            let splitter = RecursiveSplitter::new(settings.splitter_config())?;
            let ingestor = Ingestor::new(LopdfExtractor, splitter);
            let bytes = read_pdf(&pdf).await?;
            let chunks = ingestor.split(&bytes)?;
            for chunk in &chunks {
                println!(
                    "[{}] page={} chars={}",
                    chunk.chunk_index,
                    chunk.source_page,
                    chunk.text.chars().count()
                );
                println!("{}\n", chunk.text);
            }
            println!("{} chunks", chunks.len());
        }
        Command::Ingest { pdf } => {
            let assistant = Assistant::from_settings(&settings)?;
            let mut session = Session::new();
            let bytes = read_pdf(&pdf).await?;
            let summary = assistant
                .upload(&mut session, &bytes, &CancellationToken::new())
                .await?;
            println!(
                "{} chunks from {} pages indexed into {}",
                summary.chunk_count,
                summary.page_count,
                settings.persist_dir.display()
            );
        }
        Command::Ask { pdf, question } => {
            let assistant = Assistant::from_settings(&settings)?;
            let mut session = Session::new();
            let bytes = read_pdf(&pdf).await?;
            assistant
                .upload(&mut session, &bytes, &CancellationToken::new())
                .await?;
            answer_turn(&assistant, &mut session, &question).await?;
        }
        Command::Chat { pdf } => {
            let assistant = Assistant::from_settings(&settings)?;
            run_chat(&assistant, &settings, pdf).await?;
        }
    }

    Ok(())
}

fn init_logging(path: &Path) -> anyhow::Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening log file {}", path.display()))?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,reqwest=warn,hyper=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .init();
    Ok(())
}

async fn read_pdf(path: &Path) -> anyhow::Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))
}

async fn run_chat(
    assistant: &Assistant,
    settings: &Settings,
    pdf: Option<PathBuf>,
) -> anyhow::Result<()> {
    println!("{}", settings.page_title);
    println!("Commands: /load <file>, /history, /quit. Ctrl-C stops an answer, or exits at the prompt.\n");

    let mut session = Session::new();
    if let Some(pdf) = pdf {
        load(assistant, &mut session, &pdf).await;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = next_input(&mut lines, ctrl_c_pressed()).await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if line == "/quit" {
            break;
        } else if line == "/history" {
            for message in session.history() {
                let speaker = match message.role {
                    ChatRole::User => "you",
                    ChatRole::Assistant => "assistant",
                    ChatRole::System => "system",
                };
                println!("{speaker}: {}", message.content);
            }
        } else if let Some(file) = line.strip_prefix("/load") {
            let file = file.trim();
            if file.is_empty() {
                println!("usage: /load <file>");
            } else {
                load(assistant, &mut session, Path::new(file)).await;
            }
        } else if !session.has_index() {
            println!("{NO_PDF_NOTICE}");
        } else {
            answer_turn(assistant, &mut session, line).await?;
        }
    }

    info!(turns = session.turns(), "chat ended");
    Ok(())
}

/// Next input line, or `None` at end of input or once `interrupt` resolves.
async fn next_input<R, I>(lines: &mut Lines<R>, interrupt: I) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
    I: Future<Output = ()>,
{
    tokio::select! {
        line = lines.next_line() => line,
        _ = interrupt => Ok(None),
    }
}

async fn ctrl_c_pressed() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

async fn load(assistant: &Assistant, session: &mut Session, path: &Path) {
    let bytes = match read_pdf(path).await {
        Ok(bytes) => bytes,
        Err(error) => {
            warn!(error = %error, "pdf could not be read");
            println!("Failed to process PDF: {error:#}");
            return;
        }
    };

    println!("Processing PDF...");
    match assistant
        .upload(session, &bytes, &CancellationToken::new())
        .await
    {
        Ok(summary) => println!(
            "PDF processed successfully! {} chunks from {} pages.",
            summary.chunk_count, summary.page_count
        ),
        Err(error) => println!("Failed to process PDF: {error}"),
    }
}

/// Streams one answer to stdout. Ctrl-C cancels this answer only.
async fn answer_turn(
    assistant: &Assistant,
    session: &mut Session,
    question: &str,
) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            ctrl_c_pressed().await;
            cancel.cancel();
        })
    };

    let mut stdout = std::io::stdout();
    let result = assistant
        .answer(session, question, cancel.clone(), |text| {
            let _ = write!(stdout, "{text}");
            let _ = stdout.flush();
        })
        .await;
    interrupt.abort();
    println!();

    match result {
        Ok(answer) => {
            if cancel.is_cancelled() {
                println!("(answer stopped)");
            } else if let Some(failure) = answer.failure {
                warn!(failure = %failure, "answer incomplete");
            }
            Ok(())
        }
        Err(PipelineError::NoIndex) => {
            println!("{NO_PDF_NOTICE}");
            Ok(())
        }
        Err(PipelineError::Retrieval(error)) => {
            println!("Retrieval failed: {error}");
            Ok(())
        }
        Err(error) => Err(error.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn interrupt_at_the_prompt_ends_input() {
        let (_writer, reader) = tokio::io::duplex(64);
        let mut lines = BufReader::new(reader).lines();
        let line = next_input(&mut lines, async {}).await.expect("input reads");
        assert_eq!(line, None);
    }

    #[tokio::test]
    async fn typed_line_is_returned_while_no_interrupt_arrives() {
        let mut lines = BufReader::new(&b"/history\n"[..]).lines();
        let line = next_input(&mut lines, std::future::pending())
            .await
            .expect("input reads");
        assert_eq!(line.as_deref(), Some("/history"));
    }

    #[tokio::test]
    async fn end_of_input_ends_the_loop() {
        let mut lines = BufReader::new(&b""[..]).lines();
        let line = next_input(&mut lines, std::future::pending())
            .await
            .expect("input reads");
        assert_eq!(line, None);
    }
}
