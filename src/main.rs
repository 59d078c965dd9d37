mod cli;
mod shell;

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;

use cli::{Cli, Command};
use tasktrack::config::{Config, Layout};
use tasktrack::db::Database;
use tasktrack::model::NewTask;
use tasktrack::notifications::{ConfigPermission, DesktopNotifier};
use tasktrack::paths::Paths;
use tasktrack::prefs::PreferenceStore;
use tasktrack::registry::TaskRegistry;
use tasktrack::scheduler::{next_occurrence, NotificationScheduler, SchedulerEvent, MESSAGE_JOB};
use tasktrack::validate::{normalize_name, parse_clock};
use tasktrack::{jobs, logging, output, watch};

/// Everything a command might need, built once from the data directory.
pub struct App {
    pub paths: Paths,
    pub db: Database,
    pub config: Config,
}

impl App {
    fn open(paths: Paths) -> Result<Self> {
        paths.ensure()?;
        let db = Database::create(paths.db())?;
        let config = Config::load_from(&paths.config())?;
        Ok(Self { paths, db, config })
    }

    pub fn registry(&self) -> Result<TaskRegistry> {
        let registry = TaskRegistry::open(&self.db)?;
        registry.refresh().wait()?;
        Ok(registry)
    }

    pub fn prefs(&self) -> Result<PreferenceStore> {
        PreferenceStore::open(self.paths.prefs())
    }

    pub fn scheduler(&self) -> Result<NotificationScheduler> {
        NotificationScheduler::start(
            &self.db,
            DesktopNotifier::new(self.config.notifications.command.clone()),
            ConfigPermission::new(self.paths.config()),
        )
    }
}

/// Read an attachment file. Failure is reported without touching anything else.
pub fn read_attachment(path: &Path, kind: &str) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("failed to read {kind} {}", path.display()))
}

fn main() {
    logging::init();
    if let Err(e) = run() {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let app = App::open(Paths::resolve(cli.home)?)?;

    match cli.command {
        Command::Init => {
            eprintln!("Initialized {}", app.paths.home().display());
        }

        Command::Add {
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
            let registry = app.registry()?;
            registry.insert(task).wait()?;
            eprintln!("Task saved");
        }

        Command::List {
            cards,
            compact,
            json,
            follow,
        } => {
            let layout = if cards {
                Layout::Cards
            } else if compact {
                Layout::List
            } else {
                app.config.display.layout
            };
            let registry = app.registry()?;
            let print = |tasks: &[tasktrack::model::Task]| -> Result<()> {
                if json {
                    println!("{}", serde_json::to_string_pretty(tasks)?);
                } else {
                    match layout {
                        Layout::List => print!("{}", output::format_task_list(tasks)),
                        Layout::Cards => {
                            print!("{}", output::format_task_cards(tasks, |id| registry.rating(id)))
                        }
                    }
                }
                Ok(())
            };
            print(registry.snapshot().as_slice())?;

            if follow {
                let (_watcher, rx) = watch::watch_file(app.db.path())?;
                let sub = registry.subscribe();
                loop {
                    watch::wait_for_change(&rx, Duration::MAX);
                    // Let a burst of writes settle before re-reading
                    std::thread::sleep(Duration::from_millis(50));
                    watch::drain_events(&rx);
                    registry.refresh().wait()?;
                    if let Some(tasks) = sub.latest() {
                        println!();
                        print(tasks.as_slice())?;
                    }
                }
            }
        }

        Command::Rm { id } => {
            let registry = app.registry()?;
            if !registry.snapshot().iter().any(|t| t.id == id) {
                eprintln!("No task {id}");
                return Ok(());
            }
            registry.delete_id(id).wait()?;
            eprintln!("Deleted task {id}");
        }

        Command::Name { name } => {
            let prefs = app.prefs()?;
            match name {
                Some(name) => {
                    let name = normalize_name(&name)?;
                    prefs.save_user_name(name).wait()?;
                    eprintln!("Saved name '{name}'");
                }
                None => print!("{}", output::format_greeting(&prefs.current())),
            }
        }

        Command::Reset => {
            app.prefs()?.set_first_time(true).wait()?;
            eprintln!("Name cleared");
        }

        Command::Schedule { at, message } => {
            let (hour, minute) = parse_clock(&at)?;
            let fire_at = next_occurrence(&Local::now(), hour, minute)?;
            let scheduler = app.scheduler()?;
            scheduler.schedule(&message, &fire_at).wait()?;
            eprintln!("Scheduled for {}", output::format_fire_time(&fire_at));
            if !app.config.notifications.enabled {
                eprintln!("Note: notifications are disabled in {}", app.paths.config().display());
            }
        }

        Command::Pending { json } => {
            // Read the slot directly; starting a timer here would fire an overdue job.
            let conn = app.db.connect()?;
            match jobs::pending(&conn, MESSAGE_JOB)? {
                Some(job) if json => println!("{}", serde_json::to_string_pretty(&job)?),
                Some(job) => print!("{}", output::format_job(&job)),
                None => eprintln!("Nothing scheduled"),
            }
        }

        Command::Run => run_scheduler(&app)?,

        Command::Shell => shell::run(&app)?,
    }

    Ok(())
}

/// Keep the scheduler alive until no reminder is pending, following
/// reschedules made by other invocations in the meantime.
fn run_scheduler(app: &App) -> Result<()> {
    let scheduler = app.scheduler()?;
    let events = scheduler.subscribe();
    let (_watcher, changes) = watch::watch_file(app.db.path())?;

    let Some(mut job) = scheduler.pending().wait()? else {
        eprintln!("Nothing scheduled");
        return Ok(());
    };
    eprint!("Waiting: {}", output::format_job(&job));

    loop {
        match events.recv_timeout(Duration::from_millis(500)) {
            Ok(SchedulerEvent::Fired { job_id, message }) if job_id == job.id => {
                println!("{message}");
            }
            Ok(SchedulerEvent::PermissionDenied { job_id }) if job_id == job.id => {
                tracing::debug!(job_id, "reminder dropped: notifications not allowed");
            }
            Ok(_) | Err(_) => {}
        }
        if watch::wait_for_change(&changes, Duration::ZERO) {
            watch::drain_events(&changes);
            scheduler.rearm();
        }

        let current = scheduler.job(job.id).wait()?;
        if current.map(|j| j.status.is_terminal()).unwrap_or(true) {
            match scheduler.pending().wait()? {
                Some(next) => {
                    eprint!("Waiting: {}", output::format_job(&next));
                    job = next;
                }
                None => return Ok(()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_attachment_is_reported() {
        let err = read_attachment(Path::new("/nonexistent/photo.jpg"), "image").unwrap_err();
        assert!(format!("{err:#}").starts_with("failed to read image /nonexistent/photo.jpg"));
    }

    #[test]
    fn cli_parses() {
        use clap::CommandFactory;
        Cli::command().debug_assert();

        let cli = Cli::try_parse_from(["tasktrack", "schedule", "--at", "07:30", "wake up"]).unwrap();
        assert!(matches!(cli.command, Command::Schedule { ref at, .. } if at == "07:30"));
        assert!(Cli::try_parse_from(["tasktrack", "add", "t", "--image-desc", "x"]).is_err());
        assert!(Cli::try_parse_from(["tasktrack", "list", "--cards", "--compact"]).is_err());
    }
}
