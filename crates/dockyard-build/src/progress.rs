use crate::error::BuildError;
use crate::orchestrator::{BuildObserver, StageReport};
use colored::Colorize;
use dockyard_core::StageSpec;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;

/// ステージごとのスピナー表示
pub struct BuildProgress {
    total: usize,
    current: Mutex<Option<ProgressBar>>,
}

impl BuildProgress {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            current: Mutex::new(None),
        }
    }

    fn spinner(message: String) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) =
            ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")
        {
            pb.set_style(style);
        }
        pb.enable_steady_tick(std::time::Duration::from_millis(120));
        pb.set_message(message);
        pb
    }

    fn take(&self) -> Option<ProgressBar> {
        match self.current.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }
}

impl BuildObserver for BuildProgress {
    fn stage_started(&self, index: usize, stage: &StageSpec) {
        let pb = Self::spinner(format!(
            "[{}/{}] {} ...",
            index + 1,
            self.total,
            stage.name
        ));
        if let Ok(mut guard) = self.current.lock() {
            *guard = Some(pb);
        }
    }

    fn stage_finished(&self, report: &StageReport) {
        if let Some(pb) = self.take() {
            let status = if report.status.is_hit() {
                report.status.label().green()
            } else {
                report.status.label().yellow()
            };
            pb.finish_with_message(format!(
                "[{}/{}] {} {} ({:.1}s)",
                report.index + 1,
                self.total,
                report.name,
                status,
                report.duration.as_secs_f64()
            ));
        }
    }

    fn stage_failed(&self, index: usize, stage: &StageSpec, _error: &BuildError) {
        if let Some(pb) = self.take() {
            pb.finish_with_message(format!(
                "[{}/{}] {} {}",
                index + 1,
                self.total,
                stage.name,
                "failed".red()
            ));
        }
    }
}
