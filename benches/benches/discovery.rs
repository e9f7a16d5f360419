//! Benchmarks for directory-tree discovery.
//!
//! Measures the fallback path used when the mount listing is unavailable:
//! walking the overlay root, dropping scaffold directories, and pairing
//! workspaces with their remote layers.

#![allow(missing_docs)]

use cowspace_kernel::vfs::discovery::{walk, DiscoveryQuery};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::fs;
use tempfile::TempDir;

/// Lays out `count` workspaces with their scaffold; every other one gets a
/// remote layer directory.
fn populate(count: usize) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let overlay = dir.path().join("overlay");
    let sshfs = dir.path().join("sshfs");
    for i in 0..count {
        for prefix in ["", "upper-", "work-"] {
            fs::create_dir_all(overlay.join(format!("{prefix}ws{i}"))).unwrap();
        }
        if i % 2 == 0 {
            fs::create_dir_all(sshfs.join(format!("ws{i}"))).unwrap();
        }
    }
    fs::create_dir_all(&sshfs).unwrap();
    dir
}

fn bench_workspace_dirs(c: &mut Criterion) {
    let mut group = c.benchmark_group("discovery/workspace_dirs");

    for count in [10usize, 100, 500] {
        let dir = populate(count);
        let root = dir.path().join("overlay");
        group.bench_with_input(BenchmarkId::from_parameter(count), &root, |b, root| {
            b.iter(|| walk::workspace_dirs(black_box(root)).unwrap());
        });
    }

    group.finish();
}

fn bench_from_tree(c: &mut Criterion) {
    let mut group = c.benchmark_group("discovery/from_tree");

    for count in [10usize, 100, 500] {
        let dir = populate(count);
        let query = DiscoveryQuery::with_roots(
            dir.path().join("overlay"),
            dir.path().join("sshfs"),
            "mount".to_string(),
        );
        group.bench_with_input(BenchmarkId::new("plain", count), &query, |b, query| {
            b.iter(|| query.from_tree(black_box(false)).unwrap());
        });
        group.bench_with_input(BenchmarkId::new("verbose", count), &query, |b, query| {
            b.iter(|| query.from_tree(black_box(true)).unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_workspace_dirs, bench_from_tree);
criterion_main!(benches);
