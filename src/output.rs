use chrono::{DateTime, Local};

use crate::model::{Preferences, Rating, ScheduledJob, Task};

fn short_date(task: &Task) -> String {
    task.created_local()
        .map(|d| d.format("%a, %b %-d").to_string())
        .unwrap_or_default()
}

fn long_date(task: &Task) -> String {
    task.created_local()
        .map(|d| d.format("%a, %b %-d, %Y").to_string())
        .unwrap_or_default()
}

pub fn format_size(bytes: usize) -> String {
    const KIB: f64 = 1024.0;
    let b = bytes as f64;
    if b < KIB {
        format!("{bytes} B")
    } else if b < KIB * KIB {
        format!("{:.1} KiB", b / KIB)
    } else {
        format!("{:.1} MiB", b / (KIB * KIB))
    }
}

/// Compact layout: one line per task.
pub fn format_task_list(tasks: &[Task]) -> String {
    let mut out = String::new();
    for task in tasks {
        let mut markers = String::new();
        if task.has_image() {
            markers.push_str(" [image]");
        }
        if task.has_audio() {
            markers.push_str(" [audio]");
        }
        out.push_str(&format!(
            "{:>4}  {}  ({}){}\n",
            task.id,
            task.title,
            short_date(task),
            markers
        ));
    }
    out
}

/// Card layout: a block per task with its rating and attachments.
pub fn format_task_cards(tasks: &[Task], rating: impl Fn(i64) -> Rating) -> String {
    let mut out = String::new();
    for (i, task) in tasks.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(&format!("#{} {}  [{}]\n", task.id, task.title, rating(task.id)));
        out.push_str(&format!("  Created: {}\n", long_date(task)));
        out.push_str(&format!("  {}\n", task.text_content.as_deref().unwrap_or("-")));
        if let Some(ref data) = task.image_data {
            out.push_str(&format!(
                "  Image:   {}  {}\n",
                format_size(data.len()),
                task.image_description.as_deref().unwrap_or("")
            ));
        }
        if let Some(ref data) = task.audio_data {
            out.push_str(&format!(
                "  Audio:   {}  {}\n",
                format_size(data.len()),
                task.audio_description.as_deref().unwrap_or("")
            ));
        }
    }
    out
}

pub fn format_fire_time(fire_at: &DateTime<Local>) -> String {
    fire_at.format("%a, %b %-d at %H:%M").to_string()
}

pub fn format_job(job: &ScheduledJob) -> String {
    let when = job
        .fire_local()
        .map(|d| format_fire_time(&d))
        .unwrap_or_else(|| job.fire_at.to_string());
    format!(
        "[{}] {}  \"{}\"\n",
        job.status,
        when,
        job.message.as_deref().unwrap_or("")
    )
}

pub fn format_greeting(prefs: &Preferences) -> String {
    if prefs.is_first_time || prefs.user_name.is_empty() {
        "No name saved yet; set one with `name <NAME>`\n".to_string()
    } else {
        format!("Hello, {}\n", prefs.user_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::JobStatus;

    fn make_task(id: i64, title: &str) -> Task {
        Task {
            id,
            title: title.to_string(),
            text_content: None,
            image_data: None,
            image_description: None,
            audio_data: None,
            audio_description: None,
            created_at: 1_700_000_000_000,
            timer: None,
        }
    }

    #[test]
    fn compact_list_marks_attachments() {
        let mut photo = make_task(2, "photo");
        photo.image_data = Some(vec![0; 10]);
        let out = format_task_list(&[make_task(1, "Buy milk"), photo]);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("   1  Buy milk  ("));
        assert!(!lines[0].contains('['));
        assert!(lines[1].ends_with("[image]"));
    }

    #[test]
    fn cards_show_rating_text_and_attachments() {
        let mut task = make_task(3, "memo");
        task.audio_data = Some(vec![0; 2048]);
        task.audio_description = Some("voice note".into());
        let out = format_task_cards(&[make_task(1, "plain"), task], |id| {
            if id == 3 {
                Rating::Excellent
            } else {
                Rating::default()
            }
        });
        assert!(out.contains("#1 plain  [Good]\n"));
        assert!(out.contains("  -\n"));
        assert!(out.contains("#3 memo  [Excellent]\n"));
        assert!(out.contains("Audio:   2.0 KiB  voice note"));
        assert!(!out.contains("Image:"));
    }

    #[test]
    fn sizes() {
        assert_eq!(format_size(12), "12 B");
        assert_eq!(format_size(1536), "1.5 KiB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MiB");
    }

    #[test]
    fn job_line() {
        let job = ScheduledJob {
            id: 1,
            name: "w".into(),
            fire_at: 1_700_000_000_000,
            message: Some("Hi".into()),
            status: JobStatus::Pending,
        };
        let line = format_job(&job);
        assert!(line.starts_with("[pending] "));
        assert!(line.ends_with("\"Hi\"\n"));
    }

    #[test]
    fn greeting() {
        assert!(format_greeting(&Preferences::default()).contains("name <NAME>"));
        let prefs = Preferences {
            is_first_time: false,
            user_name: "Ann".into(),
        };
        assert_eq!(format_greeting(&prefs), "Hello, Ann\n");
    }
}
