mod client;
mod timeouts;

use anyhow::Result;
use clap::{Parser, Subcommand};
use client::DaemonClient;
use shared::ipc::{Command, Response};
use shared::{CycleReport, StatusInfo};
use timeouts::DaemonTimeouts;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "osgpt")]
#[command(about = "Turn spoken or typed commands into AppleScript for the frontmost app")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start listening for spoken commands
    Listen,
    /// Stop listening
    Stop,
    /// Run a typed command
    Run {
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    /// Show whether the daemon is listening or running a command
    Status,
    /// Show the result of the last command
    Last,
}

impl From<Commands> for Command {
    fn from(command: Commands) -> Self {
        match command {
            Commands::Listen => Command::Listen,
            Commands::Stop => Command::StopListening,
            Commands::Run { text } => Command::Run(text.join(" ")),
            Commands::Status => Command::Status,
            Commands::Last => Command::LastResult,
        }
    }
}

fn print_status(info: &StatusInfo) {
    println!("Status:");
    println!("  Listening: {}", info.is_listening);
    println!("  Running: {}", info.is_running);
    println!(
        "  Frontmost app: {}",
        info.foreground_app.as_deref().unwrap_or("unknown")
    );
    if !info.partial_utterance.is_empty() {
        println!("  Hearing: {}", info.partial_utterance);
    }
}

fn print_report(report: &CycleReport) {
    println!("> {}", report.utterance);
    println!("{}", report.snippet);
    println!("Result:{}", report.outcome.display());
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into())
                .from_env_lossy(),
        )
        .init();

    let cli = Cli::parse();
    let client = DaemonClient::new(&DaemonTimeouts::load());

    match client.send_command(cli.command.into()).await {
        Ok(Response::Ok) => {
            println!("Success");
        }
        Ok(Response::Status(info)) => print_status(&info),
        Ok(Response::Cycle(report)) => {
            print_report(&report);
            if !report.outcome.is_success() {
                std::process::exit(1);
            }
        }
        Ok(Response::Busy) => {
            eprintln!("Busy: another command is still running");
            std::process::exit(1);
        }
        Ok(Response::Error(msg)) => {
            eprintln!("Error: {}", msg);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Failed to reach osgptd: {}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}
