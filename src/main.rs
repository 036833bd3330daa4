//! Talkback - hands-free voice conversation from the terminal
//!
//! This is the main entry point for the talkback binary.

mod cli;

use anyhow::{anyhow, Context};
use clap::Parser;
use log::info;
use std::io::BufRead;
use std::sync::mpsc::{self, Sender};
use std::thread;

use cli::Input;
use talkback::audio::{AudioOutput, Microphone, WavFileMicrophone};
use talkback::conversation::{ConversationController, ConversationSnapshot, ConversationState};
use talkback::exchange::HttpExchange;
use talkback::models::{ChatMessage, Role};
use talkback::session::{Command, SessionEvent, SessionObserver, VoiceSession};
use talkback::tokio_runtime;

fn main() -> anyhow::Result<()> {
    // Parse command-line arguments and initialize logging
    let args = cli::Args::parse();
    cli::init_logging(&args);

    info!("Starting Talkback");

    let config = args.load_config().map_err(|e| anyhow!(e))?;
    tokio_runtime::init().map_err(|e| anyhow!(e))?;

    let (microphone, output) = open_devices(&args)?;
    let (events, receiver) = mpsc::channel();
    let exchange = HttpExchange::new(&config.endpoint, config.exchange_timeout(), events.clone())
        .map_err(|e| anyhow!(e))
        .context("Failed to set up the exchange client")?;

    info!("Exchange endpoint: {}", config.endpoint);
    let controller = ConversationController::new(config, microphone, output, Box::new(exchange));

    spawn_stdin_reader(events.clone())?;
    events
        .send(SessionEvent::Command(Command::EnableVoiceMode))
        .context("Session channel closed")?;
    drop(events);

    println!("Press enter to talk. Commands: t (toggle), on, off, mute, unmute, q");
    let mut session = VoiceSession::new(controller, receiver, TerminalObserver::default());
    session.run();
    Ok(())
}

/// Pick the microphone and speaker backends
fn open_devices(args: &cli::Args) -> anyhow::Result<(Box<dyn Microphone>, Box<dyn AudioOutput>)> {
    if let Some(path) = &args.input_wav {
        info!("Replaying {} as microphone input", path.display());
        return Ok((Box::new(WavFileMicrophone::new(path)), default_output()));
    }

    #[cfg(feature = "pipewire")]
    {
        return Ok((
            Box::new(talkback::audio::PipewireMicrophone),
            default_output(),
        ));
    }

    #[cfg(not(feature = "pipewire"))]
    {
        return Err(anyhow!(
            "No microphone available: pass --input-wav or build with the pipewire feature"
        ));
    }
}

#[cfg(feature = "pipewire")]
fn default_output() -> Box<dyn AudioOutput> {
    Box::new(talkback::audio::PipewireOutput)
}

#[cfg(not(feature = "pipewire"))]
fn default_output() -> Box<dyn AudioOutput> {
    log::warn!("Built without an audio output; replies will be silent");
    Box::new(talkback::audio::SilentOutput)
}

/// Forward stdin lines to the session as commands
fn spawn_stdin_reader(events: Sender<SessionEvent>) -> anyhow::Result<()> {
    thread::Builder::new()
        .name("talkback-stdin".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else {
                    break;
                };
                let event = match cli::parse_input(&line) {
                    Some(Input::Command(command)) => SessionEvent::Command(command),
                    Some(Input::Quit) => break,
                    None => {
                        println!("Unknown command: {}", line.trim());
                        continue;
                    }
                };
                if events.send(event).is_err() {
                    return;
                }
            }
            let _ = events.send(SessionEvent::Shutdown);
        })
        .context("Failed to spawn stdin reader")?;
    Ok(())
}

/// Prints state changes and chat messages
#[derive(Default)]
struct TerminalObserver {
    last: Option<(ConversationState, String)>,
}

impl SessionObserver for TerminalObserver {
    fn on_snapshot(&mut self, snapshot: &ConversationSnapshot) {
        let current = (snapshot.state, snapshot.status.clone());
        if self.last.as_ref() != Some(&current) {
            println!("[{}] {}", snapshot.state, snapshot.status);
            self.last = Some(current);
        }
    }

    fn on_message(&mut self, message: &ChatMessage) {
        let who = match message.role {
            Role::User => "you",
            Role::Assistant => "assistant",
            Role::System => "system",
        };
        println!("{:>9}: {}", who, message.text);
    }
}
