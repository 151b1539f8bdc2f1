//! `autocoder` command-line client for project feeds and the assistant.

use anyhow::Context;
use autocoder_rs::config::SyncConfig;
use autocoder_rs::features::fetch_features;
use autocoder_rs::protocol::{AgentStatus, AnswerValue, Answers, ConversationId, ProgressSnapshot};
use autocoder_rs::sync::{
    AttachmentPolicy, Channel, EffectKind, Endpoint, LogRecord, PendingAttachments, Role,
    SyncClient, SyncEvent, SyncSnapshot,
};
use clap::{Parser, Subcommand};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

const FEATURE_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Command-line options.
#[derive(Parser)]
#[command(name = "autocoder", version)]
struct Cli {
    /// Optional path to an autocoder.json5 config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Server host, overriding config
    #[arg(long, global = true)]
    host: Option<String>,
    /// Use wss:// and https://
    #[arg(long, global = true)]
    secure: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Follow a project's progress, agent status and logs
    Watch { project: String },
    /// Chat with the project assistant
    Chat {
        project: String,
        /// Resume an existing conversation
        #[arg(long)]
        resume: Option<ConversationId>,
    },
}

/// Lines typed into the chat prompt.
enum ChatInput {
    Exit,
    Clear,
    Attach(PathBuf),
    Answer(usize, AnswerValue),
    Message(String),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    autocoder_rs::init_logging();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    info!(
        "starting autocoder (host={}, secure={})",
        config.server.host, config.server.secure
    );
    let mut client = SyncClient::new(config).context("failed to create sync client")?;

    let result = match &cli.command {
        Command::Watch { project } => watch(&mut client, project).await,
        Command::Chat { project, resume } => chat(&mut client, project, *resume).await,
    };
    client.shutdown().await;
    result
}

fn load_config(cli: &Cli) -> anyhow::Result<SyncConfig> {
    let mut config = if let Some(path) = cli.config.as_ref() {
        SyncConfig::load_from_path(path).context("failed to load config")?
    } else {
        let cwd = std::env::current_dir().context("failed to resolve current directory")?;
        let layered = SyncConfig::load_layered(&cwd).context("failed to load layered config")?;
        debug!("config layers loaded (count={})", layered.layers.len());
        layered.config
    };
    if let Some(host) = cli.host.as_ref() {
        config.server.host = host.clone();
    }
    if cli.secure {
        config.server.secure = true;
    }
    config.validate().context("invalid config")?;
    Ok(config)
}

async fn watch(client: &mut SyncClient, project: &str) -> anyhow::Result<()> {
    let http = reqwest::Client::new();
    let endpoint = client.endpoint().clone();
    let mut events = client.events();
    let feed = client.subscribe(Channel::Project, project);
    feed.connect()?;

    let mut snapshots = feed.watch();
    let mut printer = FeedPrinter::default();
    let mut poll = tokio::time::interval(FEATURE_POLL_INTERVAL);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = poll.tick() => refresh_features(client, &http, &endpoint, project).await,
            event = events.recv() => match event {
                Ok(SyncEvent::FeatureUpdated { .. }) => {
                    refresh_features(client, &http, &endpoint, project).await;
                }
                Ok(SyncEvent::StatusChanged { status, .. }) => println!("[{status}]"),
                Ok(SyncEvent::TransportError { message, .. }) => {
                    eprintln!("connection error: {message}");
                }
                Ok(SyncEvent::ServerError { message, .. }) => eprintln!("server error: {message}"),
                Err(RecvError::Lagged(skipped)) => debug!("event stream lagged (skipped={skipped})"),
                Err(RecvError::Closed) => break,
            },
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                printer.render(&snapshot);
            }
        }
    }
    Ok(())
}

async fn refresh_features(
    client: &mut SyncClient,
    http: &reqwest::Client,
    endpoint: &Endpoint,
    project: &str,
) {
    match fetch_features(http, endpoint, project).await {
        Ok(listing) => {
            for effect in client.observe_features(project, listing.to_snapshot()) {
                let note = match effect.kind {
                    EffectKind::FeatureStarted => "~ feature started",
                    EffectKind::FeatureCompleted => "~ feature completed",
                    EffectKind::AllComplete => "*** all features complete ***",
                };
                println!("{note}");
            }
        }
        Err(err) => warn!("feature refresh failed (project={}): {}", project, err),
    }
}

async fn chat(
    client: &mut SyncClient,
    project: &str,
    resume: Option<ConversationId>,
) -> anyhow::Result<()> {
    let mut events = client.events();
    let policy = AttachmentPolicy::from_config(&client.config().attachments);
    let session = client.subscribe(Channel::Assistant, project);
    session
        .start(resume)
        .await
        .context("failed to start assistant session")?;
    println!("connected; /attach <image>, /answer <n> <choice[,choice]>, /clear, /exit");

    let mut pending = PendingAttachments::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut snapshots = session.watch();
    let mut printer = TranscriptPrinter::default();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break;
                };
                match parse_chat_input(&line) {
                    Ok(ChatInput::Exit) => break,
                    Ok(ChatInput::Clear) => session.clear_messages()?,
                    Ok(ChatInput::Attach(path)) => attach(&policy, &mut pending, &path).await,
                    Ok(ChatInput::Answer(index, value)) => {
                        let mut answers = Answers::new();
                        answers.insert(index, value);
                        if let Err(err) = session.send_answer(answers).await {
                            eprintln!("answer not sent: {err}");
                        }
                    }
                    Ok(ChatInput::Message(text)) => {
                        if let Err(err) = session.send_message(text, pending.take()).await {
                            eprintln!("message not sent: {err}");
                        }
                    }
                    Err(usage) => eprintln!("{usage}"),
                }
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                printer.render(&snapshot);
            }
            event = events.recv() => {
                if let Ok(SyncEvent::TransportError { message, .. }) = event {
                    eprintln!("connection error: {message}");
                }
            }
        }
    }
    session.disconnect().await?;
    Ok(())
}

async fn attach(policy: &AttachmentPolicy, pending: &mut PendingAttachments, path: &Path) {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) => {
            eprintln!("cannot read {}: {err}", path.display());
            return;
        }
    };
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    match pending.add(policy, &filename, &bytes) {
        Ok(attachment) => println!(
            "attached {} ({} bytes, {})",
            attachment.filename, attachment.size, attachment.mime_type
        ),
        Err(err) => eprintln!("{err}"),
    }
}

fn parse_chat_input(input: &str) -> Result<ChatInput, String> {
    let trimmed = input.trim();
    let Some(command) = trimmed.strip_prefix('/') else {
        return Ok(ChatInput::Message(trimmed.to_string()));
    };
    let mut parts = command.splitn(2, char::is_whitespace);
    let name = parts.next().unwrap_or_default();
    let rest = parts.next().map(str::trim).unwrap_or_default();
    match name {
        "exit" | "quit" => Ok(ChatInput::Exit),
        "clear" => Ok(ChatInput::Clear),
        "attach" if !rest.is_empty() => Ok(ChatInput::Attach(PathBuf::from(rest))),
        "attach" => Err("usage: /attach <path>".to_string()),
        "answer" => parse_answer(rest),
        other => Err(format!("unknown command: /{other}")),
    }
}

fn parse_answer(rest: &str) -> Result<ChatInput, String> {
    const USAGE: &str = "usage: /answer <question> <choice>[,<choice>...]";
    let Some((index, choices)) = rest.split_once(char::is_whitespace) else {
        return Err(USAGE.to_string());
    };
    let index: usize = index.parse().map_err(|_| USAGE.to_string())?;
    let mut choices: Vec<String> = choices
        .split(',')
        .map(|choice| choice.trim().to_string())
        .filter(|choice| !choice.is_empty())
        .collect();
    let value = match choices.len() {
        0 => return Err(USAGE.to_string()),
        1 => AnswerValue::One(choices.remove(0)),
        _ => AnswerValue::Many(choices),
    };
    Ok(ChatInput::Answer(index, value))
}

/// Prints project feed changes once each.
#[derive(Default)]
struct FeedPrinter {
    last_log: Option<LogRecord>,
    progress: Option<ProgressSnapshot>,
    agent_status: Option<AgentStatus>,
}

impl FeedPrinter {
    fn render(&mut self, snapshot: &SyncSnapshot) {
        if self.agent_status != Some(snapshot.agent_status) {
            self.agent_status = Some(snapshot.agent_status);
            println!("agent: {:?}", snapshot.agent_status);
        }
        if self.progress != Some(snapshot.progress) {
            self.progress = Some(snapshot.progress);
            let progress = snapshot.progress;
            println!(
                "progress: {}/{} passing, {} in progress ({:.1}%)",
                progress.passing, progress.total, progress.in_progress, progress.percentage
            );
        }

        let start = self
            .last_log
            .as_ref()
            .and_then(|last| snapshot.logs.iter().rposition(|record| record == last))
            .map_or(0, |index| index + 1);
        for record in &snapshot.logs[start..] {
            println!("{} {}", record.timestamp, record.line);
        }
        if let Some(last) = snapshot.logs.last() {
            self.last_log = Some(last.clone());
        }
    }
}

/// Streams transcript growth to stdout.
#[derive(Default)]
struct TranscriptPrinter {
    printed: HashMap<String, usize>,
    open: Option<String>,
    questions_shown: bool,
}

impl TranscriptPrinter {
    fn render(&mut self, snapshot: &SyncSnapshot) {
        if snapshot.messages.is_empty() {
            self.printed.clear();
        }
        let mut stdout = std::io::stdout();
        for message in &snapshot.messages {
            match self.printed.get(&message.id).copied() {
                None if message.role == Role::User => {}
                None => {
                    self.close_open();
                    let label = match message.role {
                        Role::Assistant => "assistant",
                        _ => "system",
                    };
                    print!("{label}: {}", message.content);
                    if message.streaming {
                        self.open = Some(message.id.clone());
                    } else {
                        println!();
                    }
                }
                Some(printed) if message.content.len() > printed => {
                    print!("{}", &message.content[printed..]);
                }
                Some(_) => {}
            }
            self.printed
                .insert(message.id.clone(), message.content.len());
            if !message.streaming && self.open.as_deref() == Some(message.id.as_str()) {
                println!();
                self.open = None;
            }
        }

        match &snapshot.questions {
            Some(questions) if !self.questions_shown => {
                self.close_open();
                for (index, question) in questions.iter().enumerate() {
                    println!("[{index}] {}", question.question);
                    for option in &question.options {
                        match &option.description {
                            Some(description) => println!("    - {}: {description}", option.label),
                            None => println!("    - {}", option.label),
                        }
                    }
                }
                self.questions_shown = true;
            }
            Some(_) => {}
            None => self.questions_shown = false,
        }
        let _ = stdout.flush();
    }

    fn close_open(&mut self) {
        if self.open.take().is_some() {
            println!();
        }
    }
}

