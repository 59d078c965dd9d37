//! Interactive session: one registry, preference view and scheduler kept
//! alive across commands, the way the app keeps them alive across screens.

use std::io::{self, BufRead as _, Write as _};
use std::path::PathBuf;
use std::sync::mpsc::Receiver;

use anyhow::{bail, Result};
use chrono::Local;
use clap::{Parser, Subcommand};

use tasktrack::model::{NewTask, Rating};
use tasktrack::output;
use tasktrack::prefs::{PreferenceStore, PreferencesView};
use tasktrack::registry::{Subscription, TaskRegistry};
use tasktrack::scheduler::{next_occurrence, NotificationScheduler, SchedulerEvent};
use tasktrack::validate::{normalize_name, parse_clock};

use crate::{read_attachment, App};

#[derive(Parser)]
#[command(multicall = true)]
struct Line {
    #[command(subcommand)]
    command: ShellCommand,
}

#[derive(Subcommand)]
enum ShellCommand {
    /// Add a task
    Add {
        title: String,
        #[arg(short, long)]
        text: Option<String>,
        #[arg(long)]
        image: Option<PathBuf>,
        #[arg(long, requires = "image")]
        image_desc: Option<String>,
        #[arg(long)]
        audio: Option<PathBuf>,
        #[arg(long, requires = "audio")]
        audio_desc: Option<String>,
    },
    /// One line per task
    List,
    /// Detailed cards with ratings
    Cards,
    /// Rate a task: bad, average, good, excellent, outstanding
    Rate { id: i64, rating: String },
    /// Delete a task
    Rm { id: i64 },
    /// Save your display name
    Name { name: String },
    /// Schedule a reminder at HH:MM
    Schedule { at: String, message: String },
    /// Show the pending reminder
    Pending,
    /// Leave the session
    #[command(alias = "exit")]
    Quit,
}

struct Session {
    registry: TaskRegistry,
    prefs: PreferenceStore,
    scheduler: NotificationScheduler,
}

enum Flow {
    Continue,
    Quit,
}

pub fn run(app: &App) -> Result<()> {
    let session = Session {
        registry: app.registry()?,
        prefs: app.prefs()?,
        scheduler: app.scheduler()?,
    };
    let tasks = session.registry.subscribe();
    let mut view = session.prefs.read()?;
    let events = session.scheduler.subscribe();

    print!("{}", output::format_greeting(view.current()));
    print!("{}", output::format_task_list(&session.registry.snapshot()));

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("> ");
        io::stdout().flush()?;
        let Some(line) = lines.next().transpose()? else {
            break;
        };
        let words = match shlex::split(&line) {
            Some(w) if w.is_empty() => continue,
            Some(w) => w,
            None => {
                eprintln!("unbalanced quotes");
                continue;
            }
        };
        let command = match Line::try_parse_from(words) {
            Ok(line) => line.command,
            Err(e) => {
                // Includes --help output
                eprint!("{e}");
                continue;
            }
        };
        match session.execute(command) {
            Ok(Flow::Quit) => break,
            Ok(Flow::Continue) => {}
            Err(e) => eprintln!("{e:#}"),
        }
        report(&session, &tasks, &mut view, &events);
    }
    session.registry.unsubscribe(tasks);
    Ok(())
}

/// Print whatever changed as a result of the last command.
fn report(
    session: &Session,
    tasks: &Subscription,
    view: &mut PreferencesView,
    events: &Receiver<SchedulerEvent>,
) {
    if let Some(list) = tasks.latest() {
        print!("{}", output::format_task_list(&list));
    }
    if view.poll() {
        print!("{}", output::format_greeting(view.current()));
    }
    for event in events.try_iter() {
        match event {
            SchedulerEvent::Scheduled { job_id, .. } => {
                if let Ok(Some(job)) = session.scheduler.job(job_id).wait() {
                    print!("Scheduled {}", output::format_job(&job));
                }
            }
            SchedulerEvent::Fired { message, .. } => println!("Reminder: {message}"),
            SchedulerEvent::Replaced { .. }
            | SchedulerEvent::PermissionDenied { .. }
            | SchedulerEvent::Failed { .. } => {}
        }
    }
}

impl Session {
    fn execute(&self, command: ShellCommand) -> Result<Flow> {
        match command {
            ShellCommand::Add {
                title,
                text,
                image,
                image_desc,
                audio,
                audio_desc,
            } => {
                let mut task = NewTask::titled(title);
                if let Some(text) = text {
                    task = task.with_text(text);
                }
                if let Some(path) = image {
                    task = task.with_image(read_attachment(&path, "image")?, image_desc);
                }
                if let Some(path) = audio {
                    task = task.with_audio(read_attachment(&path, "audio")?, audio_desc);
                }
                self.registry.insert(task).wait()?;
                println!("Task saved");
            }
            ShellCommand::List => {
                print!("{}", output::format_task_list(&self.registry.snapshot()));
            }
            ShellCommand::Cards => {
                let tasks = self.registry.snapshot();
                print!(
                    "{}",
                    output::format_task_cards(&tasks, |id| self.registry.rating(id))
                );
            }
            ShellCommand::Rate { id, rating } => {
                let rating = Rating::parse(&rating)?;
                if !self.registry.rate(id, rating) {
                    bail!("no task {id}");
                }
                println!("Rated {id} {rating}");
            }
            ShellCommand::Rm { id } => {
                self.registry.delete_id(id).wait()?;
            }
            ShellCommand::Name { name } => {
                let name = normalize_name(&name)?;
                self.prefs.save_user_name(name).wait()?;
            }
            ShellCommand::Schedule { at, message } => {
                let (hour, minute) = parse_clock(&at)?;
                let fire_at = next_occurrence(&Local::now(), hour, minute)?;
                self.scheduler.schedule(&message, &fire_at).wait()?;
            }
            ShellCommand::Pending => match self.scheduler.pending().wait()? {
                Some(job) => print!("{}", output::format_job(&job)),
                None => println!("Nothing scheduled"),
            },
            ShellCommand::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Result<ShellCommand, clap::Error> {
        Line::try_parse_from(shlex::split(line).unwrap()).map(|l| l.command)
    }

    #[test]
    fn parses_session_commands() {
        assert!(matches!(
            parse(r#"add "Buy milk" --text "semi-skimmed""#).unwrap(),
            ShellCommand::Add { ref title, text: Some(ref t), .. } if title == "Buy milk" && t == "semi-skimmed"
        ));
        assert!(matches!(
            parse("rate 3 excellent").unwrap(),
            ShellCommand::Rate { id: 3, ref rating } if rating == "excellent"
        ));
        assert!(matches!(parse("exit").unwrap(), ShellCommand::Quit));
        assert!(matches!(
            parse("schedule 07:30 'wake up'").unwrap(),
            ShellCommand::Schedule { ref message, .. } if message == "wake up"
        ));
        assert!(parse("rm notanumber").is_err());
        assert!(parse("done 1").is_err());
        assert!(parse("frobnicate").is_err());
    }

    #[test]
    fn all_ratings_parse() {
        for rating in Rating::ALL {
            assert_eq!(Rating::parse(rating.as_str()).unwrap(), rating);
        }
    }
}
