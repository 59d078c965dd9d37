use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tasktrack", about = "Personal task tracker with scheduled reminders")]
pub struct Cli {
    /// Directory holding the database, preferences and config [default: ~/.tasktrack]
    #[arg(long, env = "TASKTRACK_HOME", global = true)]
    pub home: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create the data directory and database (idempotent)
    Init,

    /// Add a task
    Add {
        /// Task title
        title: String,
        /// Free-form description
        #[arg(short, long)]
        text: Option<String>,
        /// Attach an image file
        #[arg(long)]
        image: Option<PathBuf>,
        /// Caption for the attached image
        #[arg(long, requires = "image")]
        image_desc: Option<String>,
        /// Attach an audio recording
        #[arg(long)]
        audio: Option<PathBuf>,
        /// Caption for the attached recording
        #[arg(long, requires = "audio")]
        audio_desc: Option<String>,
    },

    /// List tasks
    List {
        /// Show detailed cards instead of one line per task
        #[arg(long, conflicts_with = "compact")]
        cards: bool,
        /// Show one line per task, overriding the configured layout
        #[arg(long)]
        compact: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
        /// Keep running and reprint whenever the tasks change
        #[arg(long)]
        follow: bool,
    },

    /// Delete a task
    Rm {
        /// Task id
        id: i64,
    },

    /// Show or set your display name
    Name {
        /// New name (omit to show the current one)
        name: Option<String>,
    },

    /// Forget the saved name and show the first-run prompt again
    Reset,

    /// Schedule a one-off reminder, replacing any pending one
    Schedule {
        /// Time of day, HH:MM (tomorrow if already past today)
        #[arg(long)]
        at: String,
        /// Reminder text
        message: String,
    },

    /// Show the pending reminder
    Pending {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Stay in the foreground until the pending reminder has been delivered
    Run,

    /// Interactive session
    Shell,
}
