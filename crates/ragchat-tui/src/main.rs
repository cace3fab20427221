use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use colored::*;
use ragchat_core::{
    Attachment, AttachmentContext, AttachmentSet, Config, Endpoints, RagClient, SessionIdentity,
    Source, StreamEvent, StreamProtocol, FALLBACK_REPLY,
};
use tokio::sync::mpsc;

mod app;
mod handler;
mod logging;
mod preview;
mod tui;
mod ui;

use app::App;
use tui::EventHandler;

#[derive(Parser)]
#[command(name = "ragchat")]
#[command(version, about = "Terminal chat client for a document question-answering backend")]
struct Cli {
    /// Backend base URL (overrides config and RAGCHAT_API_BASE_URL)
    #[arg(long, global = true)]
    api_base: Option<String>,

    /// Decode replies with the older brace-wrapped stream format
    #[arg(long, global = true)]
    legacy_stream: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask one question and stream the answer to stdout
    Ask {
        /// Your question
        question: String,
        /// Spreadsheet to send with the question (repeatable, up to 3)
        #[arg(short, long)]
        attach: Vec<PathBuf>,
    },
    /// Upload documents to the knowledge base
    Ingest {
        /// Documents to upload
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;

    let endpoints = cli
        .api_base
        .as_deref()
        .map(Endpoints::new)
        .unwrap_or_else(|| config.endpoints());
    let protocol = if cli.legacy_stream {
        StreamProtocol::Legacy
    } else {
        config.stream_protocol()
    };
    let client = RagClient::with_endpoints(endpoints, protocol, SessionIdentity::new());

    match cli.command {
        None => run_tui(client).await,
        Some(Commands::Ask { question, attach }) => {
            logging::init_stderr_logging();
            ask(&client, &question, &attach).await
        }
        Some(Commands::Ingest { files }) => {
            logging::init_stderr_logging();
            ingest(&client, &files).await
        }
    }
}

async fn run_tui(client: RagClient) -> Result<()> {
    logging::init_file_logging(&Config::config_dir()?)?;
    tui::install_panic_hook();
    let mut terminal = tui::init()?;

    let mut events = EventHandler::new();
    let (turn_tx, mut turn_rx) = mpsc::unbounded_channel();
    let mut app = App::new(client, turn_tx, events.sender());

    let result = loop {
        if let Err(e) = terminal.draw(|frame| ui::render(&mut app, frame)) {
            break Err(e.into());
        }

        tokio::select! {
            Some(event) = events.next() => {
                if let Err(e) = handler::handle_event(&mut app, event).await {
                    break Err(e);
                }
            }
            Some(update) = turn_rx.recv() => app.apply_turn_update(update),
        }

        if app.should_quit {
            app.abort();
            break Ok(());
        }
    };

    tui::restore()?;
    result
}

/// Read files from disk into a selection for `context`, reporting what was dropped.
async fn select_files(context: AttachmentContext, paths: &[PathBuf]) -> Result<AttachmentSet> {
    let mut loaded = Vec::new();
    for path in paths {
        loaded.push(Attachment::load(path).await?);
    }

    let mut set = AttachmentSet::new(context);
    let rejected = set.add(loaded);
    if rejected > 0 {
        eprintln!("{}", context.rejection_notice(rejected).yellow());
    }
    Ok(set)
}

async fn ask(client: &RagClient, question: &str, attach: &[PathBuf]) -> Result<()> {
    let attachments = select_files(AttachmentContext::Chat, attach).await?;
    let files = attachments.files().unwrap_or_default();
    if question.trim().is_empty() && files.is_empty() {
        bail!("Nothing to send: give a question or at least one CSV/XLS/XLSX file");
    }

    let mut sources: Vec<Source> = Vec::new();
    let mut stdout = std::io::stdout();
    let result = client
        .chat(question, files, |event| match event {
            StreamEvent::Content(delta) => {
                print!("{}", delta);
                let _ = stdout.flush();
            }
            StreamEvent::Sources(list) => sources = list,
            StreamEvent::Done => {}
        })
        .await;
    println!();

    if let Err(e) = result {
        eprintln!("{}", FALLBACK_REPLY.red());
        return Err(e.into());
    }

    if !sources.is_empty() {
        println!("\n{}", "Sources".bold().blue());
        for (i, source) in sources.iter().enumerate() {
            let title = source
                .title
                .as_deref()
                .filter(|t| !t.is_empty())
                .unwrap_or(&source.doc_id);
            println!(
                "  {} {} {}",
                format!("[{}]", i + 1).bold().magenta(),
                title,
                format!("(p. {})", source.page_label).dimmed()
            );
        }
    }
    Ok(())
}

async fn ingest(client: &RagClient, paths: &[PathBuf]) -> Result<()> {
    let documents = select_files(AttachmentContext::Ingest, paths).await?;
    let Some(files) = documents.files() else {
        bail!("No supported documents to upload");
    };

    match client.ingest(files).await {
        Ok(message) => {
            println!("{}", message.green());
            Ok(())
        }
        Err(e) => {
            eprintln!("{}", ragchat_core::chat::INGEST_FAILED.red());
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_ask_with_attachments() {
        let cli = Cli::parse_from([
            "ragchat",
            "--api-base",
            "http://rag:9000",
            "ask",
            "totals?",
            "-a",
            "a.csv",
            "--attach",
            "b.xlsx",
        ]);
        assert_eq!(cli.api_base.as_deref(), Some("http://rag:9000"));
        match cli.command {
            Some(Commands::Ask { question, attach }) => {
                assert_eq!(question, "totals?");
                assert_eq!(attach, vec![PathBuf::from("a.csv"), PathBuf::from("b.xlsx")]);
            }
            _ => panic!("expected ask"),
        }
    }

    #[test]
    fn test_no_subcommand_runs_tui() {
        let cli = Cli::parse_from(["ragchat", "--legacy-stream"]);
        assert!(cli.legacy_stream);
        assert!(cli.command.is_none());
    }

    #[tokio::test]
    async fn test_select_files_drops_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("a.csv");
        let exe = dir.path().join("b.exe");
        std::fs::write(&csv, "x,y\n1,2\n").unwrap();
        std::fs::write(&exe, "MZ").unwrap();

        let set = select_files(AttachmentContext::Chat, &[csv, exe]).await.unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.files().unwrap()[0].name, "a.csv");
    }
}
