//! Criterion benchmarks for Assetflow critical paths
//!
//! Benchmarks the core performance-critical operations:
//! - Discovery: brace expansion and glob enumeration
//! - Styles: stylesheet compilation and prefixing
//! - Pipeline: a full clean build over generated sources

use assetflow::build::{
    discover_files, expand_braces, transform_fn, Asset, AssetClass, AssetRegistry, BuildContext,
    Orchestrator, Transform,
};
use assetflow::config::default_config;
use assetflow::transforms::{Autoprefix, CompileStyles};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

// =============================================================================
// Test Data Generators
// =============================================================================

/// Generate a stylesheet with n rules
fn make_stylesheet(n: usize) -> String {
    (0..n)
        .map(|i| {
            let (r, g, b) = (i % 256, (i * 3) % 256, (i * 7) % 256);
            format!(
                ".item-{i} {{\n  color: #{r:02x}{g:02x}{b:02x};\n  \
                 user-select: none;\n  margin: {}px;\n}}\n",
                i % 16
            )
        })
        .collect()
}

/// Create n script files spread over a few nested directories
fn make_sources(root: &Path, n: usize) {
    for i in 0..n {
        let dir = root.join(format!("app/js/mod{}", i % 8));
        fs::create_dir_all(&dir).unwrap();
        let contents = format!("var x{} = {};\n", i, i);
        fs::write(dir.join(format!("file{}.js", i)), contents).unwrap();
        if i % 4 == 0 {
            fs::write(dir.join(format!("notes{}.txt", i)), "skip").unwrap();
        }
    }
}

// =============================================================================
// Discovery Benchmarks
// =============================================================================

fn bench_discovery(c: &mut Criterion) {
    let mut group = c.benchmark_group("discovery");

    let pattern = "img/{icons,photos}/**/*.{jpg,jpeg,png,svg,ico}";
    group.bench_function("expand_braces", |b| {
        b.iter(|| expand_braces(black_box(pattern)))
    });

    for size in [100, 1000] {
        let temp = TempDir::new().unwrap();
        make_sources(temp.path(), size);
        let base = temp.path().join("app");

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("discover_files", size), &base, |b, base| {
            b.iter(|| discover_files(black_box(base), "js/**/*.js").unwrap())
        });
    }

    group.finish();
}

// =============================================================================
// Style Benchmarks
// =============================================================================

fn bench_styles(c: &mut Criterion) {
    let mut group = c.benchmark_group("styles");
    let compile = CompileStyles::new(true);
    let prefix = Autoprefix::new(&["safari 12".to_string(), "firefox 60".to_string()]).unwrap();

    for rules in [10, 200] {
        let css = make_stylesheet(rules);
        let asset = Asset::new("app/scss/main.scss", "main.scss", css.into_bytes());

        group.throughput(Throughput::Bytes(asset.contents.len() as u64));
        group.bench_with_input(BenchmarkId::new("compile", rules), &asset, |b, asset| {
            b.iter(|| compile.apply(black_box(asset.clone())).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("autoprefix", rules), &asset, |b, asset| {
            b.iter(|| prefix.apply(black_box(asset.clone())).unwrap())
        });
    }

    group.finish();
}

// =============================================================================
// Pipeline Benchmarks
// =============================================================================

fn bench_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline");
    group.sample_size(20);

    let temp = TempDir::new().unwrap();
    make_sources(temp.path(), 200);

    let copy = transform_fn("identity", Ok);
    let registry = AssetRegistry::new(vec![AssetClass::new("scripts", "js/**/*.js", "js")
        .unwrap()
        .with_transform(Arc::clone(&copy))])
    .unwrap();
    let context = BuildContext::new(default_config(), temp.path().to_path_buf());
    let orchestrator = Orchestrator::new(context, registry);

    group.bench_function("run_all_200_files", |b| {
        b.iter(|| orchestrator.run_all().unwrap())
    });

    group.finish();
}

criterion_group!(benches, bench_discovery, bench_styles, bench_pipeline);
criterion_main!(benches);
