//! Interactive chat application for a local Ollama-backed gateway.
//!
//! This binary provides a REPL interface over the palaver library: streamed
//! replies are echoed token by token, blocking replies are played back with
//! the typewriter reveal.
//!
//! # Usage
//!
//! ```bash
//! # Basic usage against the default local gateway
//! palaver-chat
//!
//! # Specify a model and gateway
//! palaver-chat --model llama3.2:3b --base-url http://127.0.0.1:9000/api
//!
//! # Fetch whole replies and animate them instead of streaming
//! palaver-chat --no-stream
//! ```
//!
//! # Commands
//!
//! While chatting, you can use slash commands:
//! - `/help` - Show available commands
//! - `/clear` - Clear conversation history
//! - `/model <name>` - Change the model
//! - `/models` - List models the backend advertises
//! - `/stream on|off` - Toggle the streaming transport
//! - `/quit` - Exit the application

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use arrrg::CommandLine;
use futures::StreamExt;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use palaver::{
    ChatArgs, ChatConfig, ChatSession, Error, Gateway, Notifier, Phase, RevealStep, Typewriter,
};

/// Prints notifications to stderr so they never mix with reply text.
struct StderrNotifier;

impl Notifier for StderrNotifier {
    fn notify_error(&self, message: &str) {
        eprintln!("! {message}");
    }

    fn stream_event_skipped(&self, error: &Error) {
        eprintln!("! skipped malformed stream event: {error}");
    }
}

/// A parsed slash command.
enum Command {
    Help,
    Clear,
    Model(String),
    Models,
    Stream(bool),
    Quit,
    Invalid(String),
}

fn parse_command(line: &str) -> Option<Command> {
    let rest = line.strip_prefix('/')?;
    let mut parts = rest.splitn(2, char::is_whitespace);
    let name = parts.next().unwrap_or_default();
    let arg = parts.next().map(str::trim).unwrap_or_default();
    Some(match name {
        "help" => Command::Help,
        "clear" => Command::Clear,
        "model" if !arg.is_empty() => Command::Model(arg.to_string()),
        "model" => Command::Invalid("usage: /model <name>".to_string()),
        "models" => Command::Models,
        "stream" => match arg {
            "on" => Command::Stream(true),
            "off" => Command::Stream(false),
            _ => Command::Invalid("usage: /stream on|off".to_string()),
        },
        "quit" | "exit" => Command::Quit,
        _ => Command::Invalid(format!("unknown command: /{name}")),
    })
}

fn help_text() -> &'static str {
    "/help            Show this help\n\
     /clear           Clear conversation history\n\
     /model <name>    Change the model\n\
     /models          List models the backend advertises\n\
     /stream on|off   Toggle the streaming transport\n\
     /quit            Exit"
}

/// Main entry point for the palaver-chat application.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (args, _) = ChatArgs::from_command_line_relaxed("palaver-chat [OPTIONS]");
    let config = ChatConfig::from(args);
    let reveal_delay = Duration::from_millis(config.reveal_delay_ms);

    let timeout = config.timeout_secs.map(Duration::from_secs);
    let client = Gateway::with_options(config.base_url.clone(), timeout)?;
    let mut session = ChatSession::new(client, config).with_notifier(Arc::new(StderrNotifier));
    let mut typewriter = Typewriter::with_delay(reveal_delay);
    let mut rl = DefaultEditor::new()?;

    // Flag for interrupt handling during streaming
    let interrupted = Arc::new(AtomicBool::new(false));

    // Set up Ctrl+C handler
    let interrupted_clone = interrupted.clone();
    ctrlc::set_handler(move || {
        interrupted_clone.store(true, Ordering::Relaxed);
    })?;

    if session.check_connection().await {
        println!("Connected to backend (model: {})", session.model());
    } else {
        println!("Backend not reachable yet; messages will retry the probe.");
    }
    println!("Type /help for commands, /quit to exit\n");

    loop {
        // Reset interrupt flag before each input
        interrupted.store(false, Ordering::Relaxed);

        let readline = rl.readline("You: ");

        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                if let Some(cmd) = parse_command(line) {
                    match cmd {
                        Command::Quit => {
                            println!("Goodbye!");
                            break;
                        }
                        Command::Clear => {
                            session.clear();
                            typewriter.reset();
                            println!("Conversation cleared.");
                        }
                        Command::Help => {
                            for line in help_text().lines() {
                                println!("    {line}");
                            }
                        }
                        Command::Model(name) => {
                            session.set_model(name.clone());
                            println!("Model changed to: {name}");
                        }
                        Command::Models => match session.list_models().await {
                            Ok(names) if names.is_empty() => {
                                println!("The backend advertises no models.")
                            }
                            Ok(names) => {
                                for name in names {
                                    println!("    {name}");
                                }
                            }
                            Err(err) => eprintln!("! {err}"),
                        },
                        Command::Stream(enabled) => {
                            session.set_streaming_transport(enabled);
                            println!(
                                "Transport: {}",
                                if enabled { "streaming" } else { "blocking" }
                            );
                        }
                        Command::Invalid(message) => {
                            eprintln!("! {message}");
                        }
                    }
                    continue;
                }

                // Regular message - send to the gateway.
                print!("Assistant: ");
                std::io::stdout().flush()?;

                if session.is_streaming_transport() {
                    let outcome = session
                        .submit_with(line, Some(interrupted.clone()), |fragment| {
                            print!("{fragment}");
                            let _ = std::io::stdout().flush();
                        })
                        .await;
                    println!();
                    if let Err(e) = outcome {
                        eprintln!("! {e}");
                        continue;
                    }
                    if session.phase() == Phase::Failed {
                        if let Some(last) = session.conversation().last() {
                            println!("{}", last.content);
                        }
                    } else if let Some(last) = session.conversation().last() {
                        // Streamed content was already echoed live.
                        typewriter.mark_revealed(&last.content);
                    }
                } else {
                    if let Err(e) = session.submit(line).await {
                        println!();
                        eprintln!("! {e}");
                        continue;
                    }
                    let reveal_text = typewriter
                        .candidate(session.conversation())
                        .map(|m| m.content.clone());
                    match reveal_text {
                        Some(text) => {
                            let mut reveal = typewriter.begin(&text);
                            let mut shown = 0;
                            while let Some(step) = reveal.next().await {
                                match step {
                                    RevealStep::Prefix(prefix) => {
                                        print!("{}", &prefix[shown..]);
                                        let _ = std::io::stdout().flush();
                                        shown = prefix.len();
                                    }
                                    RevealStep::Complete => break,
                                }
                            }
                            println!();
                        }
                        None => {
                            if let Some(last) = session.conversation().last() {
                                println!("{}", last.content);
                            }
                        }
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl+C at prompt - soft interrupt
                println!();
                continue;
            }
            Err(ReadlineError::Eof) => {
                // Ctrl+D - exit
                println!("\nGoodbye!");
                break;
            }
            Err(err) => {
                eprintln!("! input error: {err}");
                break;
            }
        }
    }

    Ok(())
}
