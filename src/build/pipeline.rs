//! Pipeline orchestration.
//!
//! The [`Orchestrator`] owns the asset class registry and the run ledger.
//! A full build always cleans the build root first, then runs every class
//! concurrently on a bounded worker pool. Files within a class are processed
//! in parallel on the rayon pool; each file's transform chain runs in order.

use crate::build::{
    compose, write_asset, Asset, AssetClass, AssetRegistry, BuildContext, BuildReport,
    ClassReport, FileError, PipelineError, ReloadKind, RunLedger,
};
use crate::reload::{ReloadHub, ReloadMessage};
use rayon::prelude::*;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};
use std::time::{Instant, SystemTime};

/// Separator placed between sources when a class bundles them.
const BUNDLE_SEPARATOR: &[u8] = b"\n";

/// Lifecycle of the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Nothing running
    Idle,
    /// Removing the build root
    Cleaning,
    /// Running one or more classes
    Building,
    /// Waiting for source changes
    Watching,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineState::Idle => write!(f, "idle"),
            PipelineState::Cleaning => write!(f, "cleaning"),
            PipelineState::Building => write!(f, "building"),
            PipelineState::Watching => write!(f, "watching"),
        }
    }
}

/// Runs asset classes against a build context.
///
/// ```ignore
/// let context = BuildContext::new(config, project_root);
/// let orchestrator = Orchestrator::from_context(context)?;
/// let report = orchestrator.run_all()?;
/// println!("{}", report.summary());
/// ```
pub struct Orchestrator {
    context: BuildContext,
    registry: AssetRegistry,
    ledger: Mutex<RunLedger>,
    hub: RwLock<Option<ReloadHub>>,
    state: Mutex<PipelineState>,
}

impl Orchestrator {
    /// Create an orchestrator over an explicit set of classes.
    pub fn new(context: BuildContext, registry: AssetRegistry) -> Self {
        Self {
            context,
            registry,
            ledger: Mutex::new(RunLedger::new()),
            hub: RwLock::new(None),
            state: Mutex::new(PipelineState::Idle),
        }
    }

    /// Create an orchestrator with the classes configured in the context.
    pub fn from_context(context: BuildContext) -> Result<Self, PipelineError> {
        let registry = AssetRegistry::from_config(context.config())?;
        Ok(Self::new(context, registry))
    }

    /// Get the build context.
    pub fn context(&self) -> &BuildContext {
        &self.context
    }

    /// Get the class registry.
    pub fn registry(&self) -> &AssetRegistry {
        &self.registry
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PipelineState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the lifecycle state, returning the previous one.
    pub(crate) fn set_state(&self, state: PipelineState) -> PipelineState {
        let mut current = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *current, state)
    }

    /// Publish reload notifications to this hub after each class run.
    pub fn attach_reload(&self, hub: ReloadHub) {
        let mut slot = self.hub.write().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(hub);
    }

    /// Stop publishing reload notifications.
    pub fn detach_reload(&self) -> Option<ReloadHub> {
        self.hub
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// The attached reload hub, if any.
    pub fn reload_hub(&self) -> Option<ReloadHub> {
        self.hub
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Remove the build root recursively.
    ///
    /// A missing build root is not an error. The run ledger is reset since
    /// no output is up to date any more.
    pub fn clean(&self) -> Result<(), PipelineError> {
        let out_dir = self.context.out_dir();
        if let Some(reason) = self.context.build_root_conflict() {
            return Err(PipelineError::UnsafeBuildRoot {
                path: out_dir,
                reason: reason.to_string(),
            });
        }

        let previous = self.set_state(PipelineState::Cleaning);
        let result = match fs::remove_dir_all(&out_dir) {
            Ok(()) => {
                tracing::debug!(path = %out_dir.display(), "removed build root");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(PipelineError::CleanFailed {
                path: out_dir,
                source,
            }),
        };
        self.ledger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reset();
        self.set_state(restore_state(previous));
        result
    }

    /// Run a single asset class by name.
    ///
    /// Files that fail are collected; the class still writes every file that
    /// succeeded. Returns [`PipelineError::TaskFailed`] if any file failed.
    pub fn run_task(&self, name: &str) -> Result<ClassReport, PipelineError> {
        let class = self
            .registry
            .get(name)
            .ok_or_else(|| PipelineError::UnknownClass(name.to_string()))?;

        let previous = self.set_state(PipelineState::Building);
        let result = self.execute_class(class);
        self.set_state(restore_state(previous));

        let report = result?;
        if report.is_success() {
            Ok(report)
        } else {
            Err(PipelineError::TaskFailed(Box::new(report)))
        }
    }

    /// Clean, then run every class concurrently.
    ///
    /// All classes run to completion even when some fail; the returned
    /// [`PipelineError::BuildFailed`] names every failed class.
    pub fn run_all(&self) -> Result<BuildReport, PipelineError> {
        let start = Instant::now();

        self.check_overlaps()?;
        self.clean()?;

        let previous = self.set_state(PipelineState::Building);
        let classes: Vec<&AssetClass> = self.registry.iter().collect();
        let results = self.execute_classes(&classes);
        self.set_state(restore_state(previous));

        let mut report = BuildReport::new();
        for result in results {
            report.add_report(result?);
        }
        let report = report.with_duration(start.elapsed());

        if report.is_success() {
            tracing::info!("{}", report.summary());
            Ok(report)
        } else {
            Err(PipelineError::BuildFailed(Box::new(report)))
        }
    }

    /// Fail if any source file is matched by more than one class.
    pub fn check_overlaps(&self) -> Result<(), PipelineError> {
        let src_dir = self.context.src_dir();
        let mut owners: HashMap<PathBuf, &str> = HashMap::new();

        for class in self.registry.iter() {
            let files = class
                .discover(&src_dir)
                .map_err(|source| PipelineError::Discovery {
                    class: class.name.clone(),
                    source,
                })?;
            for file in files {
                if let Some(first) = owners.get(&file) {
                    return Err(PipelineError::Overlap {
                        file,
                        first: first.to_string(),
                        second: class.name.clone(),
                    });
                }
                owners.insert(file, &class.name);
            }
        }

        Ok(())
    }

    /// Run classes on a pool of at most `jobs` scoped worker threads.
    ///
    /// Results come back in the same order as `classes`.
    fn execute_classes(
        &self,
        classes: &[&AssetClass],
    ) -> Vec<Result<ClassReport, PipelineError>> {
        if classes.is_empty() {
            return Vec::new();
        }

        let jobs = self.context.jobs();
        if jobs == 1 || classes.len() == 1 {
            return classes.iter().map(|c| self.execute_class(c)).collect();
        }

        let results = Mutex::new(Vec::with_capacity(classes.len()));
        let next_idx = AtomicUsize::new(0);

        std::thread::scope(|s| {
            for _ in 0..jobs.min(classes.len()) {
                s.spawn(|| loop {
                    let idx = next_idx.fetch_add(1, Ordering::SeqCst);
                    if idx >= classes.len() {
                        break;
                    }
                    let result = self.execute_class(classes[idx]);
                    results
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push((idx, result));
                });
            }
        });

        let mut results = results.into_inner().unwrap_or_else(PoisonError::into_inner);
        results.sort_by_key(|(idx, _)| *idx);
        results.into_iter().map(|(_, r)| r).collect()
    }

    /// Run one class: select sources, transform, write, record, publish.
    fn execute_class(&self, class: &AssetClass) -> Result<ClassReport, PipelineError> {
        let start = Instant::now();
        let started = SystemTime::now();
        let src_dir = self.context.src_dir();
        let dest_dir = self.context.out_dir().join(&class.dest_dir);

        let sources = class
            .discover(&src_dir)
            .map_err(|source| PipelineError::Discovery {
                class: class.name.clone(),
                source,
            })?;

        let mut report = ClassReport::new(&class.name);

        let sources = if class.incremental {
            let ledger = self.ledger.lock().unwrap_or_else(PoisonError::into_inner);
            if class.bundle.is_some() {
                // A bundle always contains every source; rebuild it only when
                // one of them changed.
                let total = sources.len();
                if sources.iter().any(|s| ledger.needs_run(&class.name, s)) {
                    sources
                } else {
                    report.skipped = total;
                    Vec::new()
                }
            } else {
                let (selected, skipped) = ledger.select(&class.name, sources);
                report.skipped = skipped;
                selected
            }
        } else {
            sources
        };

        tracing::debug!(
            class = %class.name,
            sources = sources.len(),
            skipped = report.skipped,
            "running asset class"
        );

        report.processed = sources.len();
        let mut failed_sources = Vec::new();

        if let Some(bundle) = &class.bundle {
            if !sources.is_empty() {
                match self.process_bundle(class, bundle, &src_dir, &dest_dir, &sources) {
                    Ok(written) => report.written = written,
                    Err(errors) => {
                        failed_sources = sources.clone();
                        report.failures = errors;
                    }
                }
            }
        } else {
            let chain = compose(&class.transforms);
            let outcomes: Vec<(PathBuf, Result<Vec<PathBuf>, FileError>)> = sources
                .par_iter()
                .map(|source| {
                    let outcome = process_file(class, &chain, &src_dir, &dest_dir, source);
                    (source.clone(), outcome)
                })
                .collect();

            for (source, outcome) in outcomes {
                match outcome {
                    Ok(written) => report.written.extend(written),
                    Err(err) => {
                        tracing::warn!(class = %class.name, "{}", err);
                        failed_sources.push(source);
                        report.failures.push(err);
                    }
                }
            }
        }

        self.ledger.lock().unwrap_or_else(PoisonError::into_inner).record_run(
            &class.name,
            started,
            failed_sources,
        );

        report.duration = start.elapsed();
        if report.is_success() {
            tracing::info!("{}", report.summary());
        } else {
            tracing::error!("{}", report.failure_message());
        }

        self.publish(class, &report);
        Ok(report)
    }

    /// Concatenate all sources, run the chain once, write one output.
    fn process_bundle(
        &self,
        class: &AssetClass,
        bundle: &str,
        src_dir: &Path,
        dest_dir: &Path,
        sources: &[PathBuf],
    ) -> Result<Vec<PathBuf>, Vec<FileError>> {
        let mut contents = Vec::new();
        let mut errors = Vec::new();

        for (i, source) in sources.iter().enumerate() {
            match fs::read(source) {
                Ok(bytes) => {
                    if i > 0 {
                        contents.extend_from_slice(BUNDLE_SEPARATOR);
                    }
                    contents.extend_from_slice(&bytes);
                }
                Err(e) => errors.push(FileError::SourceRead {
                    path: source.clone(),
                    source: e,
                }),
            }
        }
        if !errors.is_empty() {
            return Err(errors);
        }

        let virtual_source = src_dir.join(class.base_dir()).join(bundle);
        let asset = Asset::new(virtual_source, bundle, contents);
        let chain = compose(&class.transforms);

        match chain(asset) {
            Ok(Some(asset)) => write_asset(dest_dir, &asset).map_err(|e| vec![e]),
            Ok(None) => Ok(Vec::new()),
            Err(e) => Err(vec![e]),
        }
    }

    /// Send one notification for the files a class just wrote.
    fn publish(&self, class: &AssetClass, report: &ClassReport) {
        if report.written.is_empty() {
            return;
        }
        let Some(hub) = self.reload_hub() else {
            return;
        };

        let message = match &class.reload {
            ReloadKind::Full => ReloadMessage::Full,
            ReloadKind::Asset(category) => {
                let out_dir = self.context.out_dir();
                let paths = report
                    .written
                    .iter()
                    .map(|p| {
                        let relative = p.strip_prefix(&out_dir).unwrap_or(p);
                        relative
                            .components()
                            .map(|c| c.as_os_str().to_string_lossy())
                            .collect::<Vec<_>>()
                            .join("/")
                    })
                    .collect();
                ReloadMessage::Asset {
                    category: category.clone(),
                    paths,
                }
            }
        };

        let receivers = hub.publish(message);
        tracing::debug!(class = %class.name, receivers, "published reload notification");
    }
}

/// State to return to after a nested operation.
fn restore_state(previous: PipelineState) -> PipelineState {
    match previous {
        PipelineState::Watching => PipelineState::Watching,
        _ => PipelineState::Idle,
    }
}

/// Read, transform and write one source file.
fn process_file<F>(
    class: &AssetClass,
    chain: &F,
    src_dir: &Path,
    dest_dir: &Path,
    source: &Path,
) -> Result<Vec<PathBuf>, FileError>
where
    F: Fn(Asset) -> Result<Option<Asset>, FileError>,
{
    let contents = fs::read(source).map_err(|e| FileError::SourceRead {
        path: source.to_path_buf(),
        source: e,
    })?;
    let relative = class.output_relative(src_dir, source);

    match chain(Asset::new(source, relative, contents))? {
        Some(asset) => {
            tracing::debug!(class = %class.name, file = %source.display(), "transformed");
            write_asset(dest_dir, &asset)
        }
        None => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::transform_fn;
    use crate::config::default_config;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    fn create_test_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        File::create(&path)
            .unwrap()
            .write_all(contents.as_bytes())
            .unwrap();
        path
    }

    fn create_test_context(temp: &TempDir) -> BuildContext {
        BuildContext::new(default_config(), temp.path().to_path_buf()).with_jobs(2)
    }

    fn copy_class(name: &str, pattern: &str, dest: &str) -> AssetClass {
        AssetClass::new(name, pattern, dest).unwrap()
    }

    #[test]
    fn test_clean_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let orchestrator = Orchestrator::new(create_test_context(&temp), AssetRegistry::default());
        create_test_file(temp.path(), "build/old.txt", "stale");

        orchestrator.clean().unwrap();
        assert!(!temp.path().join("build").exists());
        orchestrator.clean().unwrap();
        assert_eq!(orchestrator.state(), PipelineState::Idle);
    }

    #[test]
    fn test_clean_refuses_build_root_aliasing_sources() {
        let temp = TempDir::new().unwrap();
        let source = create_test_file(temp.path(), "app/js/app.js", "keep()");

        let mut config = default_config();
        config.project.src = PathBuf::from("./app");
        config.project.out = PathBuf::from("app");
        let context = BuildContext::new(config, temp.path().to_path_buf());
        let orchestrator = Orchestrator::new(context, AssetRegistry::default());

        let err = orchestrator.clean().unwrap_err();
        assert!(
            matches!(err, PipelineError::UnsafeBuildRoot { .. }),
            "{}",
            err
        );
        assert!(source.exists());
        assert_eq!(orchestrator.state(), PipelineState::Idle);
    }

    #[test]
    fn test_run_all_refuses_absolute_build_root_inside_sources() {
        let temp = TempDir::new().unwrap();
        let source = create_test_file(temp.path(), "app/js/app.js", "keep()");

        let mut config = default_config();
        config.project.out = temp.path().join("app/js");
        let context = BuildContext::new(config, temp.path().to_path_buf());
        let registry =
            AssetRegistry::new(vec![copy_class("fonts", "fonts/**/*", "fonts")]).unwrap();
        let orchestrator = Orchestrator::new(context, registry);

        let err = orchestrator.run_all().unwrap_err();
        assert!(
            matches!(err, PipelineError::UnsafeBuildRoot { .. }),
            "{}",
            err
        );
        assert!(source.exists());
    }

    #[test]
    fn test_run_task_unknown_class() {
        let temp = TempDir::new().unwrap();
        let orchestrator = Orchestrator::new(create_test_context(&temp), AssetRegistry::default());
        let err = orchestrator.run_task("nope").unwrap_err();
        assert!(matches!(err, PipelineError::UnknownClass(name) if name == "nope"));
    }

    #[test]
    fn test_run_task_copies_and_preserves_layout() {
        let temp = TempDir::new().unwrap();
        create_test_file(temp.path(), "app/fonts/a.woff", "a");
        create_test_file(temp.path(), "app/fonts/sub/b.woff", "b");

        let registry =
            AssetRegistry::new(vec![copy_class("fonts", "fonts/**/*", "fonts")]).unwrap();
        let orchestrator = Orchestrator::new(create_test_context(&temp), registry);

        let report = orchestrator.run_task("fonts").unwrap();
        assert_eq!(report.written.len(), 2);
        assert!(temp.path().join("build/fonts/a.woff").exists());
        assert!(temp.path().join("build/fonts/sub/b.woff").exists());
    }

    #[test]
    fn test_run_task_isolates_failures() {
        let temp = TempDir::new().unwrap();
        create_test_file(temp.path(), "app/js/good.js", "ok");
        create_test_file(temp.path(), "app/js/bad.js", "broken");

        let class = copy_class("scripts", "js/**/*.js", "js").with_transform(transform_fn(
            "check",
            |asset: Asset| {
                if asset.contents == b"broken" {
                    Err("syntax error".to_string())
                } else {
                    Ok(asset)
                }
            },
        ));
        let registry = AssetRegistry::new(vec![class]).unwrap();
        let orchestrator = Orchestrator::new(create_test_context(&temp), registry);

        let err = orchestrator.run_task("scripts").unwrap_err();
        match err {
            PipelineError::TaskFailed(report) => {
                assert_eq!(report.failures.len(), 1);
                assert!(report.failures[0].file().ends_with("bad.js"));
                assert_eq!(report.written.len(), 1);
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(temp.path().join("build/js/good.js").exists());
        assert!(!temp.path().join("build/js/bad.js").exists());
    }

    #[test]
    fn test_run_all_detects_overlap() {
        let temp = TempDir::new().unwrap();
        create_test_file(temp.path(), "app/js/app.js", "x");

        let registry = AssetRegistry::new(vec![
            copy_class("scripts", "js/**/*.js", "js"),
            copy_class("everything", "**/*", "all"),
        ])
        .unwrap();
        let orchestrator = Orchestrator::new(create_test_context(&temp), registry);

        let err = orchestrator.run_all().unwrap_err();
        match err {
            PipelineError::Overlap { first, second, .. } => {
                assert_eq!(first, "scripts");
                assert_eq!(second, "everything");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_run_all_reports_every_failed_class() {
        let temp = TempDir::new().unwrap();
        create_test_file(temp.path(), "app/a/x.txt", "x");
        create_test_file(temp.path(), "app/b/y.txt", "y");
        create_test_file(temp.path(), "app/c/z.txt", "z");

        let fail = || transform_fn("fail", |_a: Asset| Err("nope".to_string()));
        let registry = AssetRegistry::new(vec![
            copy_class("a", "a/*.txt", "a").with_transform(fail()),
            copy_class("b", "b/*.txt", "b"),
            copy_class("c", "c/*.txt", "c").with_transform(fail()),
        ])
        .unwrap();
        let orchestrator = Orchestrator::new(create_test_context(&temp), registry);

        let err = orchestrator.run_all().unwrap_err();
        let text = err.to_string();
        assert!(text.contains("Build failed in a, c"), "{}", text);
        assert!(temp.path().join("build/b/y.txt").exists());
        assert_eq!(orchestrator.state(), PipelineState::Idle);
    }

    #[test]
    fn test_bundle_concatenates_in_order() {
        let temp = TempDir::new().unwrap();
        create_test_file(temp.path(), "app/vendor/a.js", "one()");
        create_test_file(temp.path(), "app/vendor/b.js", "two()");

        let class = copy_class("vendor", "vendor/*.js", "js").with_bundle("vendor.js");
        let registry = AssetRegistry::new(vec![class]).unwrap();
        let orchestrator = Orchestrator::new(create_test_context(&temp), registry);

        let report = orchestrator.run_task("vendor").unwrap();
        assert_eq!(report.written.len(), 1);
        let bundled = fs::read_to_string(temp.path().join("build/js/vendor.js")).unwrap();
        assert_eq!(bundled, "one()\ntwo()");
    }

    #[test]
    fn test_declined_files_are_not_written() {
        let temp = TempDir::new().unwrap();
        create_test_file(temp.path(), "app/scss/_vars.scss", "$a: 1;");

        struct SkipAll;
        impl crate::build::Transform for SkipAll {
            fn name(&self) -> &str {
                "skip"
            }
            fn accepts(&self, _asset: &Asset) -> bool {
                false
            }
            fn apply(&self, asset: Asset) -> Result<Asset, String> {
                Ok(asset)
            }
        }

        let class = copy_class("styles", "scss/*.scss", "css")
            .with_transform(std::sync::Arc::new(SkipAll));
        let registry = AssetRegistry::new(vec![class]).unwrap();
        let orchestrator = Orchestrator::new(create_test_context(&temp), registry);

        let report = orchestrator.run_task("styles").unwrap();
        assert!(report.written.is_empty());
        assert_eq!(report.processed, 1);
    }

    #[test]
    fn test_publish_scoped_paths() {
        let temp = TempDir::new().unwrap();
        create_test_file(temp.path(), "app/js/lib/util.js", "u()");

        let registry =
            AssetRegistry::new(vec![copy_class("scripts", "js/**/*.js", "js")
                .with_reload(ReloadKind::Asset("js".to_string()))])
            .unwrap();
        let orchestrator = Orchestrator::new(create_test_context(&temp), registry);
        let hub = ReloadHub::new();
        let mut rx = hub.subscribe();
        orchestrator.attach_reload(hub);

        orchestrator.run_task("scripts").unwrap();
        let message = rx.try_recv().unwrap();
        assert_eq!(
            message,
            ReloadMessage::Asset {
                category: "js".to_string(),
                paths: vec!["js/lib/util.js".to_string()]
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_publish_skipped_when_nothing_written() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("app/js")).unwrap();

        let registry =
            AssetRegistry::new(vec![copy_class("scripts", "js/**/*.js", "js")]).unwrap();
        let orchestrator = Orchestrator::new(create_test_context(&temp), registry);
        let hub = ReloadHub::new();
        let mut rx = hub.subscribe();
        orchestrator.attach_reload(hub);

        orchestrator.run_task("scripts").unwrap();
        assert!(rx.try_recv().is_err());

        assert!(orchestrator.detach_reload().is_some());
        assert!(orchestrator.reload_hub().is_none());
    }

    #[test]
    fn test_from_context_uses_default_classes() {
        let temp = TempDir::new().unwrap();
        let orchestrator = Orchestrator::from_context(create_test_context(&temp)).unwrap();
        assert_eq!(orchestrator.registry().len(), 5);
    }
}
