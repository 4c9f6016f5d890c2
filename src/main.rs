use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use lingua_live::{
    BackendClient, Config, RealtimeSession, SdpNegotiator, SessionConfig, SessionMode,
    WebRtcTransport,
};

#[derive(Parser)]
#[command(
    name = "lingua-live",
    about = "Realtime voice practice for expression learning"
)]
struct Cli {
    /// Configuration file (without extension)
    #[arg(long, default_value = "config/lingua-live")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Free conversation; extracts useful expressions when it ends
    Talk {
        /// Save every extracted expression instead of only printing them
        #[arg(long)]
        save: bool,
    },
    /// Practice the expressions that are due for review
    Review,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("{} starting", cfg.service.name);

    let backend = BackendClient::new(cfg.backend.base_url.clone());

    match cli.command {
        Command::Talk { save } => run_talk(&cfg, &backend, save).await,
        Command::Review => run_review(&cfg, &backend).await,
    }
}

async fn run_talk(cfg: &Config, backend: &BackendClient, save: bool) -> Result<()> {
    let session_config = SessionConfig {
        model: cfg.realtime.model.clone(),
        instructions: cfg.realtime.instructions.clone(),
        negotiation_timeout: Duration::from_secs(cfg.realtime.negotiation_timeout_secs),
        speech_threshold: cfg.audio.speech_threshold,
        speech_hold: Duration::from_millis(cfg.audio.speech_hold_ms),
        ..SessionConfig::default()
    };
    let session = build_session(cfg, session_config);

    let credential = backend.conversation_credential().await?;
    session.connect(&credential).await?;

    info!("connected, talk away; Ctrl-C ends the conversation");
    tokio::signal::ctrl_c()
        .await
        .context("failed to wait for Ctrl-C")?;

    session.disconnect().await;

    let transcript = session.transcript();
    if transcript.is_empty() {
        info!("nothing was said, skipping finalization");
        return Ok(());
    }

    let outcome = backend
        .finalize_conversation(&cfg.backend.user_id, &transcript)
        .await?;

    println!(
        "Conversation saved as {} ({} expressions extracted)",
        outcome.doc_id, outcome.extracted_count
    );
    for extracted in &outcome.extracted_expressions {
        println!(
            "  {} — {} (e.g. {})",
            extracted.expression, extracted.meaning, extracted.example
        );
    }

    if save && !outcome.extracted_expressions.is_empty() {
        backend
            .save_selected_expressions(&outcome.extracted_expressions)
            .await?;
        println!("Saved {} expressions", outcome.extracted_expressions.len());
    }

    Ok(())
}

async fn run_review(cfg: &Config, backend: &BackendClient) -> Result<()> {
    let targets = backend.expressions_for_review().await?;
    if targets.is_empty() {
        println!("No expressions are due for review.");
        return Ok(());
    }

    println!("Practicing {} expressions:", targets.len());
    for target in &targets {
        match &target.meaning {
            Some(meaning) => println!("  {} — {}", target.expression, meaning),
            None => println!("  {}", target.expression),
        }
    }

    let session_config = SessionConfig {
        model: cfg.realtime.review_model.clone(),
        instructions: SessionConfig::review_instructions(&targets),
        mode: SessionMode::Review(targets.clone()),
        negotiation_timeout: Duration::from_secs(cfg.realtime.negotiation_timeout_secs),
        speech_threshold: cfg.audio.speech_threshold,
        speech_hold: Duration::from_millis(cfg.audio.speech_hold_ms),
        ..SessionConfig::default()
    };
    let session = build_session(cfg, session_config);

    let credential = backend.review_credential(&targets).await?;
    session.connect(&credential).await?;

    info!("connected, practice the expressions; Ctrl-C ends the session");
    tokio::signal::ctrl_c()
        .await
        .context("failed to wait for Ctrl-C")?;

    session.disconnect().await;

    let transcript = session.transcript();
    if transcript.is_empty() {
        info!("nothing was said, skipping evaluation");
        return Ok(());
    }

    let evaluation = backend.evaluate_review(&transcript, &targets).await?;

    println!("Review results:");
    for target in &targets {
        let Some(result) = evaluation.get(&target.id) else {
            println!("  {}: not evaluated", target.expression);
            continue;
        };

        if result.success {
            println!("  {}: used successfully", target.expression);
            if let Some(context) = &result.usage_context {
                println!("    used as: {}", context);
            }
            if let Err(e) = backend.record_expression_review(&target.id).await {
                warn!("failed to record review progress for {}: {:#}", target.id, e);
            }
        } else {
            println!("  {}: needs more practice", target.expression);
            if let Some(feedback) = &result.feedback {
                println!("    {}", feedback);
            }
        }
    }

    Ok(())
}

fn build_session(cfg: &Config, session_config: SessionConfig) -> RealtimeSession {
    let negotiator = SdpNegotiator::new(
        cfg.realtime.endpoint.clone(),
        session_config.model.clone(),
        session_config.negotiation_timeout,
    );
    RealtimeSession::new(session_config, Box::new(WebRtcTransport::new(negotiator)))
}
