use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// `Reverie` - journaling coach: streaming chat and entry analysis.
#[derive(Parser, Debug)]
#[command(name = "reverie")]
#[command(author = "theonlyhennygod")]
#[command(version = "0.1.0")]
#[command(about = "Talk to your journaling coach and analyse entries.", long_about = None)]
pub struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send one message to the coach and print the reply
    Chat {
        message: String,

        /// Print the reply as it streams in
        #[arg(long)]
        stream: bool,

        /// Treat the message as a journal entry
        #[arg(long)]
        journal: bool,

        /// Ask for coaching-style replies (overrides config)
        #[arg(long)]
        coaching: bool,
    },

    /// Classify what a message is asking for
    Intent {
        message: String,

        /// Activity the user is in (e.g. journal, habits, chat)
        #[arg(short, long, default_value = "chat")]
        activity: String,
    },

    /// Run mood and quick analysis over a journal entry file
    Analyze {
        file: PathBuf,

        /// Entry id in the store (default: a fresh id)
        #[arg(long)]
        id: Option<String>,

        /// Mood you felt, 1 (low) to 5 (high)
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
        mood: Option<u8>,

        /// Keep results in memory instead of writing them to the backend
        #[arg(long)]
        dry_run: bool,
    },

    /// Write a journal entry from stdin, auto-saving as lines arrive
    Write {
        /// Entry id in the store (default: a fresh id)
        #[arg(long)]
        id: Option<String>,

        /// Entry title
        #[arg(short, long, default_value = "")]
        title: String,

        /// Mood you felt, 1 (low) to 5 (high)
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
        mood: Option<u8>,
    },

    /// Print the effective configuration with secrets masked
    Config,
}
