//! Watch mode for incremental rebuilds on file changes
//!
//! Provides file system watching with debouncing for the `assetflow watch`
//! command. One watcher is installed per asset class on the directory its
//! pattern is rooted at; all of them feed a single event queue that a
//! dispatcher loop drains. Each debounced batch re-runs every affected class
//! exactly once and never cleans the build root.

use crate::build::{ClassReport, Orchestrator, PipelineError, PipelineState};
use crate::config::AssetflowConfig;
use crate::reload::{ReloadError, ReloadHub, ReloadServer};
use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, DebouncedEventKind, Debouncer};
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// How often the dispatcher checks the stop flag while idle.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Error during watch mode
#[derive(Debug, Error)]
pub enum WatchError {
    /// The initial build or watcher setup failed
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    /// The reload endpoint could not be started
    #[error(transparent)]
    Reload(#[from] ReloadError),
}

/// Tracks files with errors across rebuilds for recovery detection
#[derive(Debug, Default)]
pub struct ErrorTracker {
    /// Files that failed on the last run of each class
    files_with_errors: HashMap<String, HashSet<PathBuf>>,
}

impl ErrorTracker {
    /// Create a new error tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Update tracker with a class run, returns the source files it fixed
    pub fn update(&mut self, report: &ClassReport) -> Vec<PathBuf> {
        let current: HashSet<PathBuf> = report
            .failures
            .iter()
            .map(|e| e.file().to_path_buf())
            .collect();

        let previous = self
            .files_with_errors
            .remove(&report.class)
            .unwrap_or_default();
        let mut fixed: Vec<PathBuf> = previous.difference(&current).cloned().collect();
        fixed.sort();

        if !current.is_empty() {
            self.files_with_errors.insert(report.class.clone(), current);
        }

        fixed
    }

    /// Check if there are any tracked errors
    pub fn has_errors(&self) -> bool {
        !self.files_with_errors.is_empty()
    }

    /// Get the number of files with errors
    pub fn error_count(&self) -> usize {
        self.files_with_errors.values().map(HashSet::len).sum()
    }
}

/// Where the reload endpoint listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadEndpoint {
    /// Interface to bind
    pub host: String,
    /// Port (0 picks a free one)
    pub port: u16,
}

/// Options for watch mode
#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// Quiet period before a batch of changes is dispatched
    pub debounce: Duration,
    /// Clear the terminal before each rebuild
    pub clear_screen: bool,
    /// Reload endpoint; `None` disables live reload
    pub reload: Option<ReloadEndpoint>,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(100),
            clear_screen: false,
            reload: None,
        }
    }
}

impl WatchOptions {
    /// Derive options from the `[watch]` and `[reload]` sections.
    pub fn from_config(config: &AssetflowConfig) -> Self {
        let reload = config.reload.enabled.then(|| ReloadEndpoint {
            host: config.reload.host.clone(),
            port: config.reload.port,
        });
        Self {
            debounce: Duration::from_millis(u64::from(config.watch.debounce_ms)),
            clear_screen: config.watch.clear_screen,
            reload,
        }
    }
}

/// Cloneable flag that asks a running session to stop.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    /// Create a handle that is not yet stopped.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the session to stop after the current dispatch.
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether stop was requested.
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

enum WatchEvent {
    Changed(Vec<PathBuf>),
    Failed(String),
}

/// An active watch: per-class watchers, the event queue and the reload endpoint.
///
/// Dropping the session removes the watchers, detaches the reload hub from
/// the orchestrator and shuts the reload endpoint down.
pub struct WatchSession {
    orchestrator: Orchestrator,
    events: Receiver<WatchEvent>,
    // Keeps the queue open when no directory could be watched.
    _sender: Sender<WatchEvent>,
    debouncers: Vec<Debouncer<RecommendedWatcher>>,
    server: Option<ReloadServer>,
    errors: ErrorTracker,
    options: WatchOptions,
    src_dir: PathBuf,
    canonical_src: Option<PathBuf>,
}

impl WatchSession {
    /// Start the reload endpoint (if enabled) and install one watcher per class.
    ///
    /// Classes whose base directory does not exist are skipped with a warning.
    pub fn start(orchestrator: Orchestrator, options: WatchOptions) -> Result<Self, WatchError> {
        let src_dir = orchestrator.context().src_dir();
        let canonical_src = src_dir.canonicalize().ok();

        let server = match &options.reload {
            Some(endpoint) => {
                let hub = ReloadHub::new();
                let server = ReloadServer::start(&hub, &endpoint.host, endpoint.port)?;
                orchestrator.attach_reload(hub);
                Some(server)
            }
            None => None,
        };

        let (sender, events) = channel();
        let debounce = options.debounce.max(Duration::from_millis(1));
        let mut debouncers = Vec::new();

        for class in orchestrator.registry().iter() {
            let dir = src_dir.join(class.base_dir());
            if !dir.is_dir() {
                tracing::warn!(
                    class = %class.name,
                    dir = %dir.display(),
                    "not watching missing directory"
                );
                continue;
            }

            let tx = sender.clone();
            let mut debouncer = new_debouncer(debounce, move |result: DebounceEventResult| {
                let event = match result {
                    Ok(events) => WatchEvent::Changed(
                        events
                            .into_iter()
                            .filter(|e| matches!(e.kind, DebouncedEventKind::Any))
                            .map(|e| e.path)
                            .collect(),
                    ),
                    Err(error) => WatchEvent::Failed(format!("{:?}", error)),
                };
                // The session is gone; nothing left to notify.
                let _ = tx.send(event);
            })
            .map_err(|e| PipelineError::WatchSetup {
                path: dir.clone(),
                message: e.to_string(),
            })?;

            debouncer
                .watcher()
                .watch(&dir, RecursiveMode::Recursive)
                .map_err(|e| PipelineError::WatchSetup {
                    path: dir.clone(),
                    message: e.to_string(),
                })?;

            tracing::debug!(class = %class.name, dir = %dir.display(), "watching");
            debouncers.push(debouncer);
        }

        orchestrator.set_state(PipelineState::Watching);

        Ok(Self {
            orchestrator,
            events,
            _sender: sender,
            debouncers,
            server,
            errors: ErrorTracker::new(),
            options,
            src_dir,
            canonical_src,
        })
    }

    /// The orchestrator driving rebuilds.
    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Address of the reload endpoint, if running.
    pub fn reload_addr(&self) -> Option<SocketAddr> {
        self.server.as_ref().map(ReloadServer::local_addr)
    }

    /// Number of installed filesystem watchers.
    pub fn watcher_count(&self) -> usize {
        self.debouncers.len()
    }

    /// Path relative to the source base directory, if it lies inside it.
    fn relative_source(&self, path: &Path) -> Option<PathBuf> {
        if let Ok(relative) = path.strip_prefix(&self.src_dir) {
            return Some(relative.to_path_buf());
        }
        let canonical = self.canonical_src.as_ref()?;
        path.strip_prefix(canonical).ok().map(Path::to_path_buf)
    }

    /// Re-run the classes owning `paths`, each at most once.
    ///
    /// Returns the names of the classes that ran, in registry order of first
    /// appearance. Failures are reported and do not stop the session.
    pub fn dispatch(&mut self, paths: &[PathBuf]) -> Vec<String> {
        let mut classes: Vec<String> = Vec::new();
        for path in paths {
            let Some(relative) = self.relative_source(path) else {
                continue;
            };
            match self.orchestrator.registry().class_for(&relative) {
                Some(class) if !classes.contains(&class.name) => classes.push(class.name.clone()),
                Some(_) => {}
                None => {
                    tracing::debug!(path = %relative.display(), "change matches no asset class")
                }
            }
        }

        if classes.is_empty() {
            return classes;
        }

        if self.options.clear_screen && atty::is(atty::Stream::Stdout) {
            clear_screen();
        }
        for path in paths {
            if let Some(name) = path.file_name() {
                println!("[{}] Changed: {}", timestamp(), name.to_string_lossy());
            }
        }

        for name in &classes {
            println!("[{}] Running '{}'...", timestamp(), name);
            match self.orchestrator.run_task(name) {
                Ok(report) => {
                    self.report_fixed(&report);
                    println!(
                        "[{}] Finished '{}' ({}) - {} written",
                        timestamp(),
                        name,
                        format_duration(report.duration),
                        report.written.len()
                    );
                }
                Err(PipelineError::TaskFailed(report)) => {
                    self.report_fixed(&report);
                    eprintln!("[{}] {}", timestamp(), report.failure_message());
                }
                Err(e) => eprintln!("[{}] Error: {}", timestamp(), e),
            }
        }

        classes
    }

    fn report_fixed(&mut self, report: &ClassReport) {
        for fixed in self.errors.update(report) {
            if let Some(name) = fixed.file_name() {
                println!("[{}] Fixed: {}", timestamp(), name.to_string_lossy());
            }
        }
    }

    /// Wait up to `timeout` for the next batch of changes.
    ///
    /// Everything already queued is merged into one batch so that a class
    /// touched by several watchers still runs once.
    pub fn next_batch(&self, timeout: Duration) -> Option<Vec<PathBuf>> {
        let first = match self.events.recv_timeout(timeout) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => return None,
        };

        let mut paths = Vec::new();
        for event in std::iter::once(first).chain(self.events.try_iter()) {
            match event {
                WatchEvent::Changed(changed) => paths.extend(changed),
                WatchEvent::Failed(error) => {
                    eprintln!("[{}] Watch error: {}", timestamp(), error);
                }
            }
        }
        Some(paths)
    }

    /// Dispatch change batches until `stop` is requested.
    ///
    /// A rerun in progress always completes before the flag is checked.
    pub fn run(&mut self, stop: &StopHandle) {
        let src = self.src_dir.display();
        println!("[{}] Watching {} for changes...", timestamp(), src);
        if let Some(addr) = self.reload_addr() {
            println!("[{}] Live reload on {}", timestamp(), addr);
        }

        while !stop.is_stopped() {
            if let Some(paths) = self.next_batch(POLL_INTERVAL) {
                if !self.dispatch(&paths).is_empty() {
                    println!("[{}] Watching for changes...", timestamp());
                }
            }
        }

        println!("[{}] Stopping watch", timestamp());
    }

    /// Tear down watchers and the reload endpoint.
    pub fn shutdown(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        self.debouncers.clear();
        self.orchestrator.detach_reload();
        if let Some(mut server) = self.server.take() {
            server.stop();
        }
        if self.orchestrator.state() == PipelineState::Watching {
            self.orchestrator.set_state(PipelineState::Idle);
        }
    }
}

impl Drop for WatchSession {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Build everything once, then watch until `stop` is requested.
///
/// Only failures that make the build meaningless (clean failed, overlapping
/// classes) end watch mode; class failures are reported and watching starts
/// anyway so they can be fixed.
pub fn watch(
    orchestrator: Orchestrator,
    options: WatchOptions,
    stop: &StopHandle,
) -> Result<(), WatchError> {
    if options.clear_screen && atty::is(atty::Stream::Stdout) {
        clear_screen();
    }
    println!("[{}] Building...", timestamp());

    match orchestrator.run_all() {
        Ok(report) => println!(
            "[{}] Build complete ({}) - {} files written",
            timestamp(),
            format_duration(report.total_duration),
            report.all_written().len()
        ),
        Err(PipelineError::BuildFailed(report)) => {
            eprintln!("[{}] {}", timestamp(), report.failure_message());
        }
        Err(e) => return Err(e.into()),
    }

    let mut session = WatchSession::start(orchestrator, options)?;
    session.run(stop);
    session.shutdown();
    Ok(())
}

/// Clear the terminal screen
fn clear_screen() {
    // ANSI escape code to clear screen and move cursor to top-left
    print!("\x1B[2J\x1B[1;1H");
}

/// Format duration for display
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1000 {
        format!("{}ms", millis)
    } else {
        format!("{:.2}s", duration.as_secs_f64())
    }
}

/// Get current timestamp for logging
pub fn timestamp() -> String {
    use std::time::SystemTime;
    let now = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default();
    let secs = now.as_secs() % 86400; // seconds since midnight
    let hours = (secs / 3600) % 24;
    let minutes = (secs / 60) % 60;
    let seconds = secs % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}
