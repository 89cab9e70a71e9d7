//! Terminal output: spinners and colored job summaries.
//!
//! `indicatif` drives the spinner and `console` the colors. [`JobProgress`]
//! follows one job from creation to a terminal status.

use std::time::Duration;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::state_machine::{Job, JobStatus};

/// Spinner shown while a job is pending, then a one-line outcome.
pub struct JobProgress {
    pb: ProgressBar,
    green: Style,
    red: Style,
    yellow: Style,
}

impl JobProgress {
    pub fn start(job: &Job) -> Self {
        let pb = ProgressBar::new_spinner();
        // The template is a literal; fall back to the default style if it
        // ever stops parsing.
        let style = ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        pb.set_style(style);
        pb.enable_steady_tick(Duration::from_millis(100));

        let progress = Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        };
        progress.update(job);
        progress
    }

    /// Refresh the spinner message from the latest record.
    pub fn update(&self, job: &Job) {
        let attempts = match job.attempt_count {
            0 => String::new(),
            n => format!(" (attempt {n})"),
        };
        self.pb
            .set_message(format!("{}: {}{attempts}", job.status, short_id(&job.id)));
    }

    /// Note a retry above the spinner without disturbing it.
    pub fn retry(&self, attempt: u32, max: u32) {
        self.pb.println(format!(
            "  {} attempt {attempt}/{max} failed, retrying",
            self.yellow.apply_to("↻")
        ));
    }

    /// Stop the spinner and print the job's outcome.
    pub fn complete(&self, job: &Job) {
        self.pb.finish_and_clear();
        match (&job.status, &job.result, &job.failure) {
            (JobStatus::Ready, Some(output), _) => println!(
                "  {} {} ready: {} ({:.2}s of audio, {} attempt(s))",
                self.green.apply_to("✓"),
                short_id(&job.id),
                output.audio_path,
                output.audio_duration,
                job.attempt_count
            ),
            (JobStatus::Failed, _, Some(failure)) => println!(
                "  {} {} failed after {} attempt(s): {failure}",
                self.red.apply_to("✗"),
                short_id(&job.id),
                job.attempt_count
            ),
            _ => println!(
                "  {} {} is {}",
                self.yellow.apply_to("…"),
                short_id(&job.id),
                job.status
            ),
        }
    }
}

/// Print a job record as pretty JSON under a status-colored header.
pub fn print_record(job: &Job) {
    let style = status_style(job.status);
    println!();
    println!("{}", style.apply_to(format!("─── Job {} ───", job.status)));
    println!("{}", serde_json::to_string_pretty(job).unwrap_or_default());
}

/// One line per job: id, status, attempts, owner, voice.
pub fn print_table(jobs: &[Job]) {
    if jobs.is_empty() {
        println!("no jobs");
        return;
    }
    for job in jobs {
        let style = status_style(job.status);
        println!(
            "{}  {}  {:>3}  {:<16}  {}",
            job.id,
            style.apply_to(format!("{:<10}", job.status.to_string())),
            job.attempt_count,
            job.owner.to_string(),
            job.input.voice
        );
    }
}

fn status_style(status: JobStatus) -> Style {
    match status {
        JobStatus::Ready => Style::new().green().bold(),
        JobStatus::Failed => Style::new().red().bold(),
        JobStatus::Processing => Style::new().yellow(),
        JobStatus::Created => Style::new().cyan(),
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_id_truncates_uuids_only() {
        assert_eq!(short_id("0123456789abcdef"), "01234567");
        assert_eq!(short_id("abc"), "abc");
    }
}
