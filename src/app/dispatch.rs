use crate::app::status::render_config;
use crate::cli::commands::{Cli, Commands};
use anyhow::{Context, Result, bail};
use reverie::Config;
use reverie::analysis::{
    AnalysisOutcome, AnalysisPipeline, EntryStore, JournalEntry, MemoryEntryStore,
    RestEntryStore,
};
use reverie::autosave::{AutoSave, Draft, EntryDraftSaver, JournalDraft, SaveStatus};
use reverie::backend::FunctionsClient;
use reverie::conversation::{ChatSession, ConversationalAi, SendOutcome};
use reverie::notify::TracingNotifier;
use reverie::stream::{ChatStreamClient, StreamHandler};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

/// Prints deltas to stdout as they arrive.
struct StdoutPrinter;

impl StreamHandler for StdoutPrinter {
    fn on_delta(&mut self, text: &str) {
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(text.as_bytes());
        let _ = stdout.flush();
    }

    fn on_done(&mut self) {
        println!();
    }
}

/// Token cancelled on Ctrl-C.
fn interrupt_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });
    token
}

fn orchestrator(config: &Config, client: &FunctionsClient, streaming: bool) -> ConversationalAi {
    let user_id = config.backend.user_id.as_deref().unwrap_or("anonymous");
    let ai = ConversationalAi::new(Arc::new(client.clone()), Arc::new(TracingNotifier), user_id)
        .with_intent_window(config.chat.intent_history_window);
    if streaming {
        ai.with_streaming(ChatStreamClient::new(client.clone()))
    } else {
        ai
    }
}

async fn run_chat(
    config: &Config,
    message: &str,
    stream: bool,
    journal: bool,
    coaching: bool,
) -> Result<()> {
    let client = FunctionsClient::from_config(config);
    let ai = Arc::new(orchestrator(config, &client, stream));
    let mut session = ChatSession::new(ai)
        .journal_entry(journal)
        .coaching(coaching || config.chat.coaching_mode);

    let outcome = if stream {
        session
            .send_streaming(message, &mut StdoutPrinter, &interrupt_token())
            .await
    } else {
        session.send(message).await
    };

    match outcome {
        SendOutcome::Replied(reply) => {
            if !stream {
                println!("{reply}");
            }
            Ok(())
        }
        SendOutcome::Failed { draft } => bail!("{} ({draft})", t!("cli.no_reply")),
        SendOutcome::Cancelled { .. } => {
            eprintln!("{}", t!("cli.cancelled"));
            Ok(())
        }
        SendOutcome::Ignored => bail!("message is empty"),
    }
}

async fn run_intent(config: &Config, message: &str, activity: &str) -> Result<()> {
    let client = FunctionsClient::from_config(config);
    let ai = orchestrator(config, &client, false);
    match ai.detect_intent(message, activity, &[]).await {
        Some(intent) => {
            println!("{} ({:.2})", intent.intent, intent.confidence);
            Ok(())
        }
        None => bail!("{}", t!("cli.no_intent")),
    }
}

async fn run_analyze(
    config: &Config,
    file: &Path,
    id: Option<String>,
    mood: Option<u8>,
    dry_run: bool,
) -> Result<()> {
    let content = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let id = id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let mut entry = JournalEntry::new(id, content);
    if let Some(mood) = mood {
        entry = entry.with_user_mood(f64::from(mood));
    }

    let client = FunctionsClient::from_config(config);
    let store: Arc<dyn EntryStore> = if dry_run {
        Arc::new(MemoryEntryStore::new())
    } else {
        Arc::new(RestEntryStore::new(client.clone()))
    };
    let pipeline = AnalysisPipeline::from_config(
        Arc::new(client),
        store,
        Arc::new(TracingNotifier),
        &config.analysis,
    );

    match pipeline.analyze_with_retries(&entry).await? {
        AnalysisOutcome::Completed(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        AnalysisOutcome::Skipped { words } => {
            println!(
                "{}",
                t!("cli.skipped", words = words, min = config.analysis.min_words)
            );
        }
        AnalysisOutcome::InFlight => println!("{}", t!("cli.in_flight")),
    }
    Ok(())
}

async fn run_write(
    config: &Config,
    id: Option<String>,
    title: String,
    mood: Option<u8>,
) -> Result<()> {
    let id = id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let store = RestEntryStore::new(FunctionsClient::from_config(config));
    let autosave = AutoSave::from_config(
        Arc::new(EntryDraftSaver::new(store, id.clone())),
        Arc::new(TracingNotifier),
        &config.autosave,
    );

    let mut status = autosave.subscribe();
    let reporter = tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let current = status.borrow_and_update().status.clone();
            match current {
                SaveStatus::Saved { at } => {
                    eprintln!("{}", t!("cli.draft_saved", at = at.format("%H:%M:%S").to_string()));
                }
                SaveStatus::Error { cause } => {
                    eprintln!("{}", t!("cli.draft_not_saved", cause = cause));
                }
                SaveStatus::Idle | SaveStatus::Saving => {}
            }
        }
    });

    let mut draft = JournalDraft {
        title,
        content: String::new(),
        mood,
    };
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        if !draft.content.is_empty() {
            draft.content.push('\n');
        }
        draft.content.push_str(&line);
        autosave.update(draft.clone());
    }

    if draft.is_blank() {
        reporter.abort();
        bail!("{}", t!("cli.empty_draft"));
    }
    let saved = autosave.save_now().await;
    reporter.abort();
    if saved {
        println!("{id}");
        Ok(())
    } else {
        bail!("{}", t!("notice.autosave_failed"))
    }
}

pub async fn dispatch(cli: Cli, config: Config) -> Result<()> {
    match cli.command {
        Commands::Chat {
            message,
            stream,
            journal,
            coaching,
        } => run_chat(&config, &message, stream, journal, coaching).await,
        Commands::Intent { message, activity } => run_intent(&config, &message, &activity).await,
        Commands::Analyze {
            file,
            id,
            mood,
            dry_run,
        } => run_analyze(&config, &file, id, mood, dry_run).await,
        Commands::Write { id, title, mood } => run_write(&config, id, title, mood).await,
        Commands::Config => {
            println!("{}", render_config(&config));
            println!();
            print!("{}", toml::to_string_pretty(&config.redacted())?);
            Ok(())
        }
    }
}
