//! Benchmarks for mount table parsing.
//!
//! Performance-critical paths:
//! - `parse`: splitting `mount` output into entries
//! - `decode_octal`: unescaping mount points with spaces
//! - `from_table`: matching entries against the workspace roots

#![allow(missing_docs)]

use cowspace_kernel::vfs::discovery::{mount_table, DiscoveryQuery};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::fmt::Write;
use std::path::PathBuf;

const OVERLAY_ROOT: &str = "/mnt/cow/overlay";
const SSHFS_ROOT: &str = "/mnt/cow/sshfs";

/// Builds a listing with `workspaces` remote-backed workspaces, their
/// scaffold noise, and a fixed set of unrelated system mounts.
fn listing(workspaces: usize) -> String {
    let mut out = String::from(
        "sysfs on /sys type sysfs (rw,nosuid,nodev,noexec,relatime)\n\
         proc on /proc type proc (rw,nosuid,nodev,noexec,relatime)\n\
         /dev/nvme0n1p2 on / type ext4 (rw,relatime)\n\
         tmpfs on /run type tmpfs (rw,nosuid,nodev,size=3269052k,mode=755)\n",
    );
    for i in 0..workspaces {
        let _ = writeln!(
            out,
            "dev@build01:/srv/repo{i} on {SSHFS_ROOT}/ws{i} type fuse.sshfs (rw,nosuid,nodev,relatime,user_id=1000,group_id=1000)"
        );
        let _ = writeln!(
            out,
            "fuse-overlayfs on {OVERLAY_ROOT}/ws{i} type fuse.fuse-overlayfs (rw,nosuid,nodev,relatime,user_id=1000,group_id=1000)"
        );
        if i % 10 == 0 {
            let _ = writeln!(
                out,
                "fuse-overlayfs on {OVERLAY_ROOT}/my\\040work\\040{i} type fuse.fuse-overlayfs (rw,nosuid)"
            );
        }
    }
    out
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("mount_table/parse");

    for workspaces in [10usize, 100, 1000] {
        let text = listing(workspaces);
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{workspaces}_workspaces")),
            &text,
            |b, text| b.iter(|| mount_table::parse(black_box(text)).count()),
        );
    }

    group.finish();
}

fn bench_decode_octal(c: &mut Criterion) {
    let mut group = c.benchmark_group("mount_table/decode_octal");

    let cases = [
        ("plain", "/mnt/cow/overlay/feature-branch"),
        ("escaped", "/mnt/cow/overlay/my\\040work\\040tree\\011tabbed"),
    ];

    for (name, raw) in cases {
        group.bench_function(name, |b| b.iter(|| mount_table::decode_octal(black_box(raw))));
    }

    group.finish();
}

fn bench_from_table(c: &mut Criterion) {
    let mut group = c.benchmark_group("mount_table/from_table");
    let query = DiscoveryQuery::with_roots(
        PathBuf::from(OVERLAY_ROOT),
        PathBuf::from(SSHFS_ROOT),
        "mount".to_string(),
    );

    for workspaces in [10usize, 100, 1000] {
        let text = listing(workspaces);
        group.bench_with_input(
            BenchmarkId::new("verbose", workspaces),
            &text,
            |b, text| b.iter(|| query.from_table(black_box(text), true)),
        );
        group.bench_with_input(
            BenchmarkId::new("plain", workspaces),
            &text,
            |b, text| b.iter(|| query.from_table(black_box(text), false)),
        );
    }

    group.finish();
}

criterion_group!(benches, bench_parse, bench_decode_octal, bench_from_table);
criterion_main!(benches);
