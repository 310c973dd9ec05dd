//! DebateArena CLI - watch two AI debaters argue a topic
//!
//! Runs, pauses, resumes and inspects debates. Sessions are kept in a JSON
//! snapshot file between invocations.

use std::env;
use std::error::Error;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::Colorize;
use debatearena_core::llm::TextGenerator;
use debatearena_core::{
    Config, DebateEvent, DebateService, Language, MemoryStore, MockGenerator, OpenAiGenerator,
    Side, SessionRequest, Speed, StreamOutcome, debate_format,
};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(
    name = "debatearena",
    version,
    about = "DebateArena - Watch two AIs debate a topic",
    long_about = "A CLI tool for running judged, multi-round debates between AI debaters using OpenAI-compatible APIs."
)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Where sessions are saved between runs
    #[arg(long, global = true, default_value = "debate-session.json", value_name = "FILE")]
    snapshot: PathBuf,

    /// Use the built-in offline generator instead of an API
    #[arg(long, global = true)]
    offline: bool,

    /// Skip the pacing delays between debate steps
    #[arg(long, global = true)]
    no_delay: bool,

    /// Print events as JSON lines instead of formatted text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start a new debate on TOPIC
    Run {
        #[arg(value_name = "TOPIC")]
        topic: String,

        /// Optional topic description
        #[arg(short, long, default_value = "")]
        description: String,

        /// Number of debate rounds
        #[arg(short, long, value_name = "ROUNDS")]
        rounds: Option<u32>,

        /// Pacing: fast, normal or slow
        #[arg(short, long, value_name = "SPEED")]
        speed: Option<String>,

        /// Debate language: en or zh
        #[arg(short, long, value_name = "LANG")]
        language: Option<String>,
    },
    /// Continue a paused debate (defaults to the latest session)
    Resume { session: Option<Uuid> },
    /// Finish a debate immediately from the rounds scored so far
    Skip { session: Option<Uuid> },
    /// Show cumulative and per-round scores
    Scores { session: Option<Uuid> },
    /// Score every argument of a session on logic, persuasiveness and fluency
    Weigh {
        session: Option<Uuid>,

        /// Only weigh arguments from this round
        #[arg(short, long)]
        round: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if debate_format::get_format(&config.debate.format, config.debate.rounds).is_none() {
        return Err(format!(
            "Unknown debate format: '{}'. Available formats: {}",
            config.debate.format,
            debate_format::available_formats().join(", ")
        )
        .into());
    }

    let generator = build_generator(cli.offline, &config)?;
    let store = Arc::new(MemoryStore::open(&cli.snapshot).await?);
    let service = Arc::new(
        DebateService::new(config, store.clone(), generator).with_pacing(!cli.no_delay),
    );

    let result = run_command(&cli, &service).await;
    store.save(&cli.snapshot).await?;
    tracing::debug!(path = %cli.snapshot.display(), "snapshot saved");
    result
}

fn build_generator(offline: bool, config: &Config) -> Result<Arc<dyn TextGenerator>, Box<dyn Error>> {
    if offline {
        return Ok(Arc::new(MockGenerator::new()));
    }

    // Get API configuration from environment
    let api_base = env::var("OPENAI_API_BASE")
        .or_else(|_| env::var("OPENAI_BASE_URL"))
        .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());

    let api_key = env::var("OPENAI_API_KEY").unwrap_or_else(|_| {
        eprintln!(
            "{}",
            "Warning: OPENAI_API_KEY not set. API calls may fail.".yellow()
        );
        String::new()
    });

    Ok(Arc::new(OpenAiGenerator::new(&api_base, &api_key, &config.generation)?))
}

async fn run_command(cli: &Cli, service: &Arc<DebateService>) -> Result<(), Box<dyn Error>> {
    match &cli.command {
        Command::Run {
            topic,
            description,
            rounds,
            speed,
            language,
        } => {
            let topic = service.create_topic(topic, description).await?;
            let mut request = SessionRequest::new(topic.id);
            request.rounds = *rounds;
            request.speed = speed.as_deref().map(str::parse::<Speed>).transpose()?;
            request.language = language.as_deref().map(str::parse::<Language>).transpose()?;
            let session = service.create_session(request).await?;

            print_header(&topic.title, session.rounds, service.config().debate.format.as_str());
            println!("{} {}", "Session:".bold(), session.id.to_string().dimmed());
            stream(service, session.id, cli.json).await
        }
        Command::Resume { session } => {
            let id = resolve_session(service, *session).await?;
            stream(service, id, cli.json).await
        }
        Command::Skip { session } => {
            let id = resolve_session(service, *session).await?;
            let result = service.skip_to_end(id).await?;
            print_final_scores(
                result.scores.affirmative,
                result.scores.negative,
                result.scores.max_possible,
            );
            println!("{} {}", "Winner:".bold(), result.winner.to_string().bright_green().bold());
            Ok(())
        }
        Command::Scores { session } => {
            let id = resolve_session(service, *session).await?;
            print_scores(service, id).await
        }
        Command::Weigh { session, round } => {
            let id = resolve_session(service, *session).await?;
            weigh(service, id, *round).await
        }
    }
}

async fn resolve_session(
    service: &DebateService,
    session: Option<Uuid>,
) -> Result<Uuid, Box<dyn Error>> {
    match session {
        Some(id) => Ok(id),
        None => service
            .latest_session()
            .await?
            .map(|s| s.id)
            .ok_or_else(|| "No saved sessions. Start one with `debatearena run <TOPIC>`.".into()),
    }
}

/// What a Ctrl-C press does while a debate is streaming.
#[derive(Debug, PartialEq, Eq)]
enum Interrupt {
    Pause,
    Abort,
}

/// The first press asks for a pause; any later press stops waiting.
fn next_interrupt(pause_sent: bool) -> Interrupt {
    if pause_sent {
        Interrupt::Abort
    } else {
        Interrupt::Pause
    }
}

/// Stream a session to the console. Ctrl-C requests a pause at the next step
/// boundary, a second Ctrl-C abandons the stream.
async fn stream(service: &Arc<DebateService>, session_id: Uuid, json: bool) -> Result<(), Box<dyn Error>> {
    let (handle, mut rx) = service.spawn_stream(session_id);
    let mut printer = ConsolePrinter::new(json);
    let mut pause_sent = false;

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => printer.print(&event)?,
                None => break,
            },
            _ = tokio::signal::ctrl_c() => match next_interrupt(pause_sent) {
                Interrupt::Pause => {
                    pause_sent = true;
                    eprintln!(
                        "{}",
                        "Pause requested; stopping at the next step (Ctrl-C again to quit)...".yellow()
                    );
                    if let Err(e) = service.pause(session_id).await {
                        eprintln!("{} {}", "Error:".red().bold(), e);
                    }
                }
                Interrupt::Abort => {
                    eprintln!("{}", "Interrupted.".red().bold());
                    handle.abort();
                    break;
                }
            },
        }
    }
    // Drain anything left after the channel closed
    while let Ok(event) = rx.try_recv() {
        printer.print(&event)?;
    }

    let outcome = match handle.await {
        Ok(outcome) => outcome,
        Err(e) if e.is_cancelled() => {
            return Err(format!(
                "debate interrupted; continue with: debatearena resume {}",
                session_id
            )
            .into());
        }
        Err(e) => return Err(e.into()),
    };
    match outcome {
        StreamOutcome::Completed(_) => {
            println!();
            println!("{}", "═".repeat(70).bright_blue());
            println!("{}", "  Debate concluded.".bright_green().bold());
            println!("{}", "═".repeat(70).bright_blue());
            println!();
        }
        StreamOutcome::Paused => {
            println!(
                "{} debatearena resume {}",
                "Resume with:".bold(),
                session_id
            );
        }
        StreamOutcome::Failed => return Err("debate stream failed".into()),
    }
    Ok(())
}

async fn print_scores(service: &DebateService, session_id: Uuid) -> Result<(), Box<dyn Error>> {
    let session = service.session(session_id).await?;
    let totals = service.cumulative_scores(session_id).await?;
    println!(
        "{} {} ({})",
        "Session:".bold(),
        session.id.to_string().dimmed(),
        session.status.to_string().yellow()
    );
    for round in 1..=totals.rounds_scored {
        let breakdown = service.round_breakdown(session_id, round).await?;
        println!(
            "  Round {}: {} {:>6.2}  {} {:>6.2}",
            round,
            "AFF".bright_cyan(),
            breakdown.affirmative_average,
            "NEG".bright_red(),
            breakdown.negative_average
        );
        for record in breakdown.affirmative.iter().chain(&breakdown.negative) {
            println!(
                "    {}",
                format!(
                    "Judge {} / {}: {:.1} - {}",
                    record.judge,
                    record.side.display_name(),
                    record.score,
                    record.feedback
                )
                .dimmed()
            );
        }
    }
    print_final_scores(totals.affirmative_total, totals.negative_total, totals.max_possible);
    if let Some(winner) = session.winner {
        println!("{} {}", "Winner:".bold(), winner.to_string().bright_green().bold());
    }
    Ok(())
}

async fn weigh(service: &DebateService, session_id: Uuid, round: Option<u32>) -> Result<(), Box<dyn Error>> {
    let arguments = service.arguments(session_id).await?;
    let mut weighed = 0;
    for argument in arguments.iter().filter(|a| round.is_none_or(|r| a.round == r)) {
        service.score_argument(argument.id).await?;
        let breakdown = service.argument_breakdown(argument.id).await?;
        println!(
            "{} {} {}: {:.2}",
            format!("Round {}", argument.round).bold(),
            side_label(argument.side),
            argument.id.to_string().dimmed(),
            breakdown.total_score
        );
        weighed += 1;
    }
    if weighed == 0 {
        println!("{}", "No arguments to weigh.".yellow());
    }
    Ok(())
}

fn side_label(side: Side) -> colored::ColoredString {
    match side {
        Side::Affirmative => side.display_name().bright_cyan().bold(),
        Side::Negative => side.display_name().bright_red().bold(),
    }
}

fn print_header(topic: &str, rounds: u32, format: &str) {
    println!();
    println!("{}", "═".repeat(70).bright_blue());
    println!(
        "{}",
        format!("  {} - {} format, {} rounds", "DebateArena".bold(), format, rounds)
            .bright_blue()
            .bold()
    );
    println!("{}", "═".repeat(70).bright_blue());
    println!();
    println!("{} {}", "Topic:".bold(), topic.bright_white());
}

fn print_final_scores(affirmative: f64, negative: f64, max_possible: f64) {
    println!();
    println!("{}", "Final scores:".bold());
    println!("  {} {:.2} / {:.0}", side_label(Side::Affirmative), affirmative, max_possible);
    println!("  {} {:.2} / {:.0}", side_label(Side::Negative), negative, max_possible);
}

/// Prints debate events, buffering streamed text until its step completes.
struct ConsolePrinter {
    json: bool,
    buffer: String,
}

impl ConsolePrinter {
    fn new(json: bool) -> Self {
        Self {
            json,
            buffer: String::new(),
        }
    }

    fn print(&mut self, event: &DebateEvent) -> Result<(), Box<dyn Error>> {
        if self.json {
            let mut stdout = std::io::stdout().lock();
            serde_json::to_writer(&mut stdout, event)?;
            writeln!(stdout)?;
            return Ok(());
        }

        match event {
            DebateEvent::DebateStart { rounds, .. } => {
                println!("{}", format!("  {} rounds ahead", rounds).dimmed());
            }
            DebateEvent::OrganizerRules { chunk, complete } => {
                self.speech("ORGANIZER".bright_magenta().bold(), chunk, *complete)
            }
            DebateEvent::ModeratorIntroduction { chunk, complete } => {
                self.speech("MODERATOR".bright_magenta().bold(), chunk, *complete)
            }
            DebateEvent::RoundStart { round } => {
                println!();
                println!("{}", "═".repeat(70).bright_magenta());
                println!("{}", format!("  📢 ROUND {}", round).bright_magenta().bold());
                println!("{}", "═".repeat(70).bright_magenta());
                println!();
            }
            DebateEvent::AiArgument {
                side,
                chunk,
                complete,
                ..
            } => self.speech(side_label(*side), chunk, *complete),
            DebateEvent::ModeratorSummary {
                side,
                chunk,
                complete,
                ..
            } => self.speech(
                format!("MODERATOR (summary, {})", side.display_name()).magenta(),
                chunk,
                *complete,
            ),
            DebateEvent::ModeratorEvaluation {
                side,
                chunk,
                complete,
                ..
            } => self.speech(
                format!("MODERATOR (evaluation, {})", side.display_name()).magenta(),
                chunk,
                *complete,
            ),
            DebateEvent::RoundScoresUpdate {
                round,
                affirmative_score,
                negative_score,
            } => {
                println!(
                    "{} {} {:.2}  {} {:.2}",
                    format!("Round {} scores:", round).bold(),
                    "AFF".bright_cyan(),
                    affirmative_score,
                    "NEG".bright_red(),
                    negative_score
                );
            }
            DebateEvent::CumulativeScoresUpdate {
                affirmative_total,
                negative_total,
                max_possible,
            } => {
                println!(
                    "{}",
                    format!(
                        "Running totals: AFF {:.2} / NEG {:.2} (of {:.0})",
                        affirmative_total, negative_total, max_possible
                    )
                    .dimmed()
                );
            }
            DebateEvent::RoundComplete { .. } => {
                println!("{}", "─".repeat(70).dimmed());
            }
            DebateEvent::JudgingStart => {
                println!();
                println!("{}", "═".repeat(70).bright_yellow());
                println!("{}", "  ⚖ JUDGING".bright_yellow().bold());
                println!("{}", "═".repeat(70).bright_yellow());
                println!();
            }
            DebateEvent::JudgeFeedback {
                judge_number,
                chunk,
                complete,
            } => self.speech(
                format!("JUDGE {}", judge_number).yellow().bold(),
                chunk,
                *complete,
            ),
            DebateEvent::FinalScores {
                affirmative_score,
                negative_score,
                max_possible,
                ..
            } => print_final_scores(*affirmative_score, *negative_score, *max_possible),
            DebateEvent::WinnerAnnouncement {
                chunk, complete, ..
            } => self.speech("WINNER".bright_green().bold(), chunk, *complete),
            DebateEvent::DebateComplete { .. } => {
                // Handled once the stream ends
            }
            DebateEvent::DebatePaused {
                round,
                position,
                speaker,
            } => {
                println!();
                println!(
                    "{}",
                    format!(
                        "⏸ Debate paused in round {} at {} (next: {})",
                        round, position, speaker
                    )
                    .yellow()
                    .bold()
                );
            }
            DebateEvent::Error { message } => {
                eprintln!("{} {}", "Error:".red().bold(), message);
            }
        }
        Ok(())
    }

    fn speech(&mut self, speaker: colored::ColoredString, chunk: &str, complete: bool) {
        if !complete {
            self.buffer.push_str(chunk);
            return;
        }
        println!("{} {}", "▶".bright_cyan(), speaker);
        // Word wrap and indent the content
        let wrapped = textwrap(&self.buffer, 66);
        for line in wrapped.lines() {
            println!("  {}", line);
        }
        println!();
        self.buffer.clear();
    }
}

/// Simple text wrapping function.
fn textwrap(text: &str, width: usize) -> String {
    let mut result = String::new();
    let mut current_line_len = 0;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        if current_line_len + word_len + 1 > width && current_line_len > 0 {
            result.push('\n');
            current_line_len = 0;
        }
        if current_line_len > 0 {
            result.push(' ');
            current_line_len += 1;
        }
        result.push_str(word);
        current_line_len += word_len;
    }

    result
}
