//! Command-line interface for Talkback
//!
//! Handles argument parsing, logging configuration and the stdin command
//! grammar.

use clap::Parser;
use log::LevelFilter;
use std::path::PathBuf;

use talkback::config::VoiceConfig;
use talkback::session::Command;

/// Talkback - hands-free voice conversation from the terminal
#[derive(Parser, Debug)]
#[command(name = "talkback")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Increase logging verbosity
    /// -v = info, -vv = debug, -vvv = trace, -vvvv = all deps
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    pub quiet: bool,

    /// Config file (default: ~/.config/talkback/config.json)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Exchange service URL
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Language sent with each utterance
    #[arg(long)]
    pub language: Option<String>,

    /// Voice profile for the spoken reply
    #[arg(long)]
    pub voice: Option<String>,

    /// Play replies at zero volume
    #[arg(long)]
    pub mute: bool,

    /// Replay a WAV file as the microphone instead of a live device
    #[arg(long, value_name = "FILE")]
    pub input_wav: Option<PathBuf>,
}

impl Args {
    /// Get the log level filter based on verbosity flags
    pub fn log_level(&self) -> LevelFilter {
        if self.quiet {
            LevelFilter::Error
        } else {
            match self.verbose {
                0 => LevelFilter::Warn,
                1 => LevelFilter::Info,
                2 => LevelFilter::Debug,
                _ => LevelFilter::Trace,
            }
        }
    }

    /// Load the config file and apply flag overrides on top
    pub fn load_config(&self) -> Result<VoiceConfig, String> {
        let path = self.config.clone().unwrap_or_else(VoiceConfig::default_path);
        let mut config = VoiceConfig::load(&path)?;

        if let Some(endpoint) = &self.endpoint {
            config.endpoint = endpoint.clone();
        }
        if let Some(language) = &self.language {
            config.language = language.clone();
        }
        if let Some(voice) = &self.voice {
            config.voice_profile = voice.clone();
        }
        if self.mute {
            config.muted = true;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Initialize the logging system based on CLI arguments
pub fn init_logging(args: &Args) {
    let mut builder = env_logger::Builder::new();

    // Base level for all modules - keep at warn to suppress noisy deps
    builder.filter_level(LevelFilter::Warn);

    builder.filter_module("talkback", args.log_level());

    // HTTP and runtime internals only at -vvvv
    if args.verbose >= 4 {
        builder.filter_module("reqwest", args.log_level());
        builder.filter_module("hyper_util", args.log_level());
        builder.filter_module("pipewire", args.log_level());
    }

    builder.format_timestamp_millis().init();
}

/// What a line typed on stdin asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    Command(Command),
    Quit,
}

/// Parse one stdin line. Empty lines toggle, like pressing the mic button.
pub fn parse_input(line: &str) -> Option<Input> {
    match line.trim().to_ascii_lowercase().as_str() {
        "" | "t" | "toggle" => Some(Input::Command(Command::Toggle)),
        "on" => Some(Input::Command(Command::EnableVoiceMode)),
        "off" => Some(Input::Command(Command::DisableVoiceMode)),
        "mute" => Some(Input::Command(Command::SetMuted(true))),
        "unmute" => Some(Input::Command(Command::SetMuted(false))),
        "q" | "quit" | "exit" => Some(Input::Quit),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_mapping() {
        let args = Args::parse_from(["talkback", "-vv"]);
        assert_eq!(args.log_level(), LevelFilter::Debug);

        let args = Args::parse_from(["talkback", "-v", "--quiet"]);
        assert_eq!(args.log_level(), LevelFilter::Error);
    }

    #[test]
    fn test_flags_override_config() {
        let missing = std::env::temp_dir().join(format!("talkback-{}.json", uuid::Uuid::new_v4()));
        let args = Args::parse_from([
            "talkback",
            "--config",
            missing.to_str().unwrap(),
            "--language",
            "de",
            "--voice",
            "calm",
            "--mute",
        ]);
        let config = args.load_config().unwrap();
        assert_eq!(config.language, "de");
        assert_eq!(config.voice_profile, "calm");
        assert!(config.muted);
        assert_eq!(config.endpoint, VoiceConfig::default().endpoint);
    }

    #[test]
    fn test_parse_input() {
        assert_eq!(parse_input("\n"), Some(Input::Command(Command::Toggle)));
        assert_eq!(parse_input(" ON "), Some(Input::Command(Command::EnableVoiceMode)));
        assert_eq!(parse_input("off"), Some(Input::Command(Command::DisableVoiceMode)));
        assert_eq!(parse_input("q"), Some(Input::Quit));
        assert_eq!(parse_input("dance"), None);
    }
}
