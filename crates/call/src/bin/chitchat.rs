//! chitchat binary entry point
//!
//! # Usage
//!
//! ```bash
//! # Run a relay on port 8080
//! cargo run --bin chitchat -- relay --listen 0.0.0.0:8080
//!
//! # Join a room as a call participant (interactive)
//! cargo run --bin chitchat -- call \
//!   --signaling-url ws://localhost:8080 \
//!   --room room1
//!
//! # Start from a YAML config and add a TURN server
//! cargo run --bin chitchat -- call \
//!   --config ./chitchat.yaml \
//!   --turn-servers turn:turn.example.com:3478:user:pass
//! ```
//!
//! In call mode, type `connect`, `call`, `answer`, `end`, `status` or `quit`.

use anyhow::Context;
use chitchat_call::audio_session::LoggingAudioSession;
use chitchat_call::{
    configure_audio_session, CallConfig, CallHandle, CallOrchestrator, RelayServer,
    TurnServerConfig,
};
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// chitchat voice calls
///
/// Peer-to-peer audio calls negotiated through a WebSocket rendezvous relay.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Join a room and place or answer calls interactively
    Call(CallArgs),
    /// Run the rendezvous relay
    Relay(RelayArgs),
}

#[derive(ClapArgs, Debug)]
struct CallArgs {
    /// YAML configuration file; CLI options override its values
    #[arg(long, env = "CHITCHAT_CONFIG")]
    config: Option<PathBuf>,

    /// Relay URL
    #[arg(long, env = "CHITCHAT_SIGNALING_URL")]
    signaling_url: Option<String>,

    /// Rendezvous room
    #[arg(long, env = "CHITCHAT_ROOM")]
    room: Option<String>,

    /// STUN servers (comma-separated)
    #[arg(long, value_delimiter = ',', env = "CHITCHAT_STUN_SERVERS")]
    stun_servers: Vec<String>,

    /// TURN servers (format: turn:host:port:username:password, comma-separated)
    #[arg(long, value_delimiter = ',', env = "CHITCHAT_TURN_SERVERS")]
    turn_servers: Vec<String>,

    /// Connect to the relay immediately instead of waiting for `connect`
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set, env = "CHITCHAT_AUTO_CONNECT")]
    auto_connect: bool,
}

#[derive(ClapArgs, Debug)]
struct RelayArgs {
    /// Listen address
    #[arg(long, default_value = "0.0.0.0:8080", env = "CHITCHAT_RELAY_ADDRESS")]
    listen: String,
}

/// Parse TURN server string (format: turn:host:port:username:password or turns:host:port:username:password)
fn parse_turn_server(s: &str) -> Result<TurnServerConfig, String> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() < 5 {
        return Err(format!(
            "Invalid TURN server format: '{}'. Expected: turn:host:port:username:password",
            s
        ));
    }

    let protocol = parts[0];
    if protocol != "turn" && protocol != "turns" {
        return Err(format!(
            "Invalid TURN protocol: '{}'. Expected 'turn' or 'turns'",
            protocol
        ));
    }

    // Password may contain colons
    Ok(TurnServerConfig {
        url: format!("{}:{}:{}", protocol, parts[1], parts[2]),
        username: parts[3].to_string(),
        credential: parts[4..].join(":"),
    })
}

/// Build CallConfig from CLI arguments
///
/// Starts from the YAML file when one is given, then applies explicit options.
fn build_config_from_args(args: &CallArgs) -> anyhow::Result<CallConfig> {
    let mut config = match &args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            CallConfig::from_file(path)
                .with_context(|| format!("Failed to load config {:?}", path))?
        }
        None => CallConfig::default(),
    };

    if let Some(url) = &args.signaling_url {
        config = config.with_signaling_url(url);
    }
    if let Some(room) = &args.room {
        config = config.with_room(room);
    }
    if !args.stun_servers.is_empty() {
        config = config.with_stun_servers(args.stun_servers.clone());
    }

    let mut turn_servers = Vec::new();
    for turn_str in &args.turn_servers {
        let turn_config = parse_turn_server(turn_str).map_err(anyhow::Error::msg)?;
        info!(
            "Adding TURN server: {} (user: {})",
            turn_config.url, turn_config.username
        );
        turn_servers.push(turn_config);
    }
    if !turn_servers.is_empty() {
        config = config.with_turn_servers(turn_servers);
    }

    config.validate()?;
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let shutdown_flag = Arc::new(AtomicBool::new(false));
    let shutdown_flag_handler = Arc::clone(&shutdown_flag);

    ctrlc::set_handler(move || {
        let was_already_set = shutdown_flag_handler.swap(true, Ordering::SeqCst);
        if was_already_set {
            eprintln!("\nShutdown already in progress, forcing immediate exit");
            std::process::exit(0);
        }
        eprintln!("\nCtrl+C received, shutting down...");
    })
    .context("Failed to set Ctrl+C handler")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get())
        .thread_name("chitchat-worker")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(args, shutdown_flag))
}

async fn async_main(args: Args, shutdown_flag: Arc<AtomicBool>) -> anyhow::Result<()> {
    init_tracing();

    info!(version = chitchat_call::version(), "chitchat starting");

    match args.mode {
        Mode::Call(call_args) => run_call(call_args, shutdown_flag).await,
        Mode::Relay(relay_args) => run_relay(relay_args, shutdown_flag).await,
    }
}

async fn run_relay(args: RelayArgs, shutdown_flag: Arc<AtomicBool>) -> anyhow::Result<()> {
    let relay = RelayServer::bind(args.listen.as_str())
        .await
        .with_context(|| format!("Failed to bind relay to {}", args.listen))?;
    let handle = relay.start()?;

    info!("Relay running on {}. Press Ctrl+C to shutdown.", handle.url());

    wait_for_shutdown(&shutdown_flag).await;

    info!("Shutdown signal received, stopping relay...");
    handle.shutdown().await;
    Ok(())
}

async fn run_call(args: CallArgs, shutdown_flag: Arc<AtomicBool>) -> anyhow::Result<()> {
    let config = build_config_from_args(&args)?;

    info!(
        signaling_url = %config.signaling_url,
        room = %config.room,
        stun_servers = config.stun_servers.len(),
        turn_servers = config.turn_servers.len(),
        "Configuration loaded"
    );

    configure_audio_session(&LoggingAudioSession);

    let (call, task) = CallOrchestrator::launch(config).await?;
    let mut updates = call.updates();
    println!("Status: {}", call.status());

    if args.auto_connect {
        call.connect()?;
    }
    print_help();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ticker = tokio::time::interval(Duration::from_millis(100));

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) => {
                        if !dispatch(line.trim(), &call)? {
                            break;
                        }
                    }
                    None => break,
                }
            }
            update = updates.recv() => {
                match update {
                    Ok(status) => println!("Status: {}", status),
                    Err(RecvError::Lagged(skipped)) => warn!(skipped, "Status updates lagged"),
                    Err(RecvError::Closed) => break,
                }
            }
            _ = ticker.tick() => {
                if shutdown_flag.load(Ordering::SeqCst) {
                    break;
                }
            }
        }
    }

    info!("Hanging up and shutting down...");
    let _ = call.end_call();
    drop(call);
    if let Err(e) = task.await {
        warn!("Orchestrator task join error: {}", e);
    }

    Ok(())
}

/// Run one interactive command; returns false when the user quits
fn dispatch(command: &str, call: &CallHandle) -> anyhow::Result<bool> {
    match command {
        "" => {}
        "connect" => call.connect()?,
        "call" => call.start_call()?,
        "answer" => call.answer_call()?,
        "end" | "hangup" => call.end_call()?,
        "status" => println!("Status: {}", call.status()),
        "help" => print_help(),
        "quit" | "exit" => return Ok(false),
        other => println!("Unknown command '{}'. Type 'help' for commands.", other),
    }
    Ok(true)
}

fn print_help() {
    println!("Commands: connect, call, answer, end, status, help, quit");
}

async fn wait_for_shutdown(shutdown_flag: &AtomicBool) {
    while !shutdown_flag.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

fn init_tracing() {
    // RUST_LOG overrides the default level
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
