use std::io::IsTerminal;
use std::path::PathBuf;

use anstyle::{AnsiColor, Style};
use indicatif::{ProgressBar, ProgressStyle};
use modsync_installer::{EventSink, UpdateEvent, UpdatePlan};
use modsync_state::{PackageState, SavedState};

fn status_style() -> Style {
    Style::new().fg_color(Some(AnsiColor::Cyan.into())).bold()
}

fn warn_style() -> Style {
    Style::new().fg_color(Some(AnsiColor::Yellow.into())).bold()
}

fn colorize(style: Style, text: &str) -> String {
    format!("{style}{text}{style:#}")
}

pub fn render_status_line(rich: bool, status: &str, message: &str) -> String {
    let label = format!("{status:>10}");
    if rich {
        format!("{}  {}", colorize(status_style(), &label), message)
    } else {
        format!("{label}  {message}")
    }
}

pub fn render_warning_line(rich: bool, message: &str) -> String {
    let label = format!("{:>10}", "skipped");
    if rich {
        format!("{}  {}", colorize(warn_style(), &label), message)
    } else {
        format!("{label}  {message}")
    }
}

/// Event sink for the terminal: status lines for phase changes, a progress
/// bar when attached to a tty, and a record of externally-modified skips
/// for the end-of-run summary.
pub struct CliSink {
    rich: bool,
    progress: Option<ProgressBar>,
    pub skipped: Vec<(String, PathBuf)>,
}

impl CliSink {
    pub fn new() -> Self {
        let rich = std::io::stdout().is_terminal();
        let progress = if rich {
            let bar = ProgressBar::new(100);
            if let Ok(style) =
                ProgressStyle::with_template("{msg:<12} [{bar:24.cyan/blue}] {percent:>3}%")
            {
                bar.set_style(style);
            }
            bar.set_message("reconciling");
            Some(bar)
        } else {
            None
        };
        Self {
            rich,
            progress,
            skipped: Vec::new(),
        }
    }

    pub fn finish(&mut self) {
        if let Some(bar) = self.progress.take() {
            bar.finish_and_clear();
        }
    }

    fn print(&self, line: String) {
        match &self.progress {
            Some(bar) => bar.println(line),
            None => println!("{line}"),
        }
    }
}

impl Default for CliSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for CliSink {
    fn emit(&mut self, event: UpdateEvent) {
        match event {
            UpdateEvent::UninstallStarted { packages } => {
                self.print(render_status_line(
                    self.rich,
                    "uninstall",
                    &format!("{packages} previously installed package(s)"),
                ));
            }
            UpdateEvent::UninstallingPackage { name } => {
                self.print(render_status_line(self.rich, "restoring", &name));
            }
            UpdateEvent::UninstallFinished => {}
            UpdateEvent::InstallStarted { packages } => {
                self.print(render_status_line(
                    self.rich,
                    "install",
                    &format!("{packages} selected package(s)"),
                ));
            }
            UpdateEvent::InstallingPackage { name } => {
                self.print(render_status_line(self.rich, "installing", &name));
            }
            UpdateEvent::InstallFinished => {}
            UpdateEvent::PackageUnchanged { name } => {
                self.print(render_status_line(self.rich, "unchanged", &name));
            }
            UpdateEvent::ExternallyModified { package, path } => {
                self.print(render_warning_line(
                    self.rich,
                    &format!("{} (modified outside modsync)", path.display()),
                ));
                self.skipped.push((package, path));
            }
            UpdateEvent::Progress { fraction } => {
                if let Some(bar) = &self.progress {
                    bar.set_position((fraction * 100.0).round() as u64);
                }
            }
            UpdateEvent::Cancelled => {
                self.print(render_status_line(self.rich, "cancelled", "run stopped"));
            }
        }
    }
}

pub fn plan_lines(plan: &UpdatePlan) -> Vec<String> {
    let mut lines = vec![format!(
        "plan: {} to restore, {} to install, {} unchanged",
        plan.uninstall.len(),
        plan.install.len(),
        plan.unchanged.len()
    )];
    for name in &plan.uninstall {
        lines.push(format!("  restore    {name}"));
    }
    for name in &plan.unchanged {
        lines.push(format!("  unchanged  {name}"));
    }
    for name in &plan.install {
        lines.push(format!("  install    {name}"));
    }
    lines
}

pub fn package_line(name: &str, state: &PackageState) -> String {
    let partial = if state.partial { " [partial]" } else { "" };
    format!(
        "{name}: {} file(s), installed_at_unix={}{partial}",
        state.files.len(),
        state.time_unix
    )
}

pub fn summary_lines(state: &SavedState, skipped: &[(String, PathBuf)]) -> Vec<String> {
    let mut lines = Vec::new();
    let partial = state.packages.values().filter(|s| s.partial).count();
    lines.push(format!(
        "done: {} package(s) installed, {} partial",
        state.packages.len(),
        partial
    ));
    for (package, path) in skipped {
        lines.push(format!(
            "left in place (modified outside modsync, owner '{package}'): {}",
            path.display()
        ));
    }
    lines
}
