use std::path::PathBuf;

/// Observational notifications emitted while a reconciliation pass runs.
/// Sinks must not influence control flow.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateEvent {
    UninstallStarted { packages: usize },
    UninstallingPackage { name: String },
    UninstallFinished,
    InstallStarted { packages: usize },
    InstallingPackage { name: String },
    InstallFinished,
    /// The unchanged-fingerprint fast path skipped a restore pass.
    PackageUnchanged { name: String },
    /// A file was replaced by something outside package management since it
    /// was installed; its backup was discarded and the file left in place.
    ExternallyModified { package: String, path: PathBuf },
    /// Monotonic fraction across both phases, 0.0 ..= 1.0.
    Progress { fraction: f64 },
    Cancelled,
}

pub trait EventSink {
    fn emit(&mut self, event: UpdateEvent);
}

/// Sink that drops everything, for callers that do not observe progress.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&mut self, _event: UpdateEvent) {}
}

/// Adapter turning a closure into a sink.
pub struct FnSink<F: FnMut(UpdateEvent)>(pub F);

impl<F: FnMut(UpdateEvent)> EventSink for FnSink<F> {
    fn emit(&mut self, event: UpdateEvent) {
        (self.0)(event)
    }
}
