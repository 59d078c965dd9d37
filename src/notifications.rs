//! Local notification delivery and the permission gate in front of it.

use std::path::PathBuf;
use std::process::Command;

use anyhow::{bail, Context, Result};

use crate::config::Config;

/// A category notifications are posted under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub id: &'static str,
    pub name: &'static str,
}

/// Channel used for scheduled messages.
pub const MESSAGE_CHANNEL: Channel = Channel {
    id: "message_channel",
    name: "Messages",
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
}

pub trait Notifier: Send + 'static {
    /// Prepare `channel` for posting. Called before the first post on it.
    fn create_channel(&mut self, channel: &Channel) -> Result<()>;

    fn post(&mut self, channel: &Channel, notification: &Notification) -> Result<()>;
}

/// Whether notifications may be shown right now.
pub trait PermissionCheck: Send + Sync + 'static {
    fn notifications_allowed(&self) -> bool;
}

impl PermissionCheck for bool {
    fn notifications_allowed(&self) -> bool {
        *self
    }
}

/// Reads `notifications.enabled` from the config file on every check, so a
/// change made after scheduling is honoured when the job fires.
pub struct ConfigPermission {
    path: PathBuf,
}

impl ConfigPermission {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PermissionCheck for ConfigPermission {
    fn notifications_allowed(&self) -> bool {
        match Config::load_from(&self.path) {
            Ok(config) => config.notifications.enabled,
            Err(e) => {
                tracing::warn!("treating notifications as denied: {e:#}");
                false
            }
        }
    }
}

/// Posts through the desktop's notification tool, falling back to stderr.
pub struct DesktopNotifier {
    command: Option<String>,
}

impl DesktopNotifier {
    /// `command` overrides the platform default program.
    pub fn new(command: Option<String>) -> Self {
        Self { command }
    }

    fn program(&self) -> Option<&str> {
        if let Some(c) = self.command.as_deref() {
            return Some(c);
        }
        if cfg!(target_os = "macos") {
            Some("osascript")
        } else if cfg!(target_os = "linux") {
            Some("notify-send")
        } else {
            None
        }
    }

    fn run(&self, program: &str, notification: &Notification) -> Result<()> {
        let mut cmd = Command::new(program);
        if program == "osascript" {
            let script = format!(
                "display notification {} with title {}",
                applescript_string(&notification.body),
                applescript_string(&notification.title)
            );
            cmd.arg("-e").arg(script);
        } else {
            // Keep a message like "--help" from being read as an option.
            cmd.arg("--").arg(&notification.title).arg(&notification.body);
        }
        let status = cmd
            .status()
            .with_context(|| format!("failed to run '{program}'"))?;
        if !status.success() {
            bail!("'{program}' exited with status {status}");
        }
        Ok(())
    }
}

/// Quote `s` as an AppleScript string literal.
fn applescript_string(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

impl Notifier for DesktopNotifier {
    fn create_channel(&mut self, channel: &Channel) -> Result<()> {
        tracing::debug!(channel = channel.id, name = channel.name, "notification channel ready");
        Ok(())
    }

    fn post(&mut self, channel: &Channel, notification: &Notification) -> Result<()> {
        if let Some(program) = self.program() {
            match self.run(program, notification) {
                Ok(()) => return Ok(()),
                Err(e) => tracing::warn!(channel = channel.id, "falling back to stderr: {e:#}"),
            }
        }
        eprintln!("\x07[{}] {}", notification.title, notification.body);
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_permission_follows_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let check = ConfigPermission::new(&path);
        assert!(check.notifications_allowed(), "missing config allows");

        std::fs::write(&path, "[notifications]\nenabled = false\n").unwrap();
        assert!(!check.notifications_allowed());

        std::fs::write(&path, "[notifications]\nenabled = true\n").unwrap();
        assert!(check.notifications_allowed());

        std::fs::write(&path, "[notifications]\nenabld = true\n").unwrap();
        assert!(!check.notifications_allowed(), "bad config denies");
    }

    #[test]
    fn applescript_strings_are_escaped() {
        assert_eq!(applescript_string("hi"), r#""hi""#);
        assert_eq!(applescript_string(r#"say "hi""#), r#""say \"hi\"""#);
        assert_eq!(applescript_string(r"C:\"), r#""C:\\""#);
    }

    #[cfg(unix)]
    #[test]
    fn message_is_never_read_as_an_option() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("notify");
        let args = dir.path().join("args");
        std::fs::write(
            &script,
            format!("#!/bin/sh\nprintf '%s\\n' \"$@\" > '{}'\n", args.display()),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let notifier = DesktopNotifier::new(Some(script.display().to_string()));
        let n = Notification {
            title: "Scheduled Message".into(),
            body: "--help".into(),
        };
        notifier.run(&script.display().to_string(), &n).unwrap();
        assert_eq!(
            std::fs::read_to_string(&args).unwrap(),
            "--\nScheduled Message\n--help\n"
        );
    }

    #[test]
    fn failing_command_falls_back() {
        let mut notifier = DesktopNotifier::new(Some("/nonexistent/notifier".into()));
        let n = Notification {
            title: "Scheduled Message".into(),
            body: "hi".into(),
        };
        assert!(notifier.post(&MESSAGE_CHANNEL, &n).is_ok());
    }
}
