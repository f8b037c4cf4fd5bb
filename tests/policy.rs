// Copyright 2020 Google LLC
//
// Use of this source code is governed by an MIT-style license that can be found
// in the LICENSE file or at https://opensource.org/licenses/MIT.

use std::path::Path;

use fspolicy::backend::{Backend, FilterOptions, SnapshotBackend};
use fspolicy::backend::snapshot::TIER_XATTR;
use fspolicy::fs::{Entry, FileKind, Stat};
use fspolicy::policy::{self, config, Policy};
use fspolicy::query::{BuildContext, Registry};

const SCRATCH: &str = r#"
name: scratch
filter: -name *.tmp
rules:
  - name: large
    filter: -size +1G
    action: common:migrate
    parameters: { target: archive }
  - name: rest
    action: common:delete
"#;

fn file(path: &str, size: u64) -> Entry {
    Entry::new(path, Stat {
        kind: FileKind::File,
        mode: 0o644,
        size,
        ..Stat::default()
    })
}

fn write_snapshot(path: &Path, entries: Vec<Entry>) {
    SnapshotBackend::from_entries(entries).save(path).unwrap();
}

fn load_policy(text: &str, backends: &[&dyn Backend]) -> Policy {
    let mut registry = Registry::new();
    for backend in backends {
        for predicate in backend.predicates() {
            registry.register(predicate);
        }
    }
    config::parse(text, &registry, BuildContext::new(0)).unwrap()
}

#[test]
fn test_scratch_policy() {
    let tempdir = tempfile::tempdir().unwrap();
    let index_path = tempdir.path().join("index.jsonl");
    let live_path = tempdir.path().join("live.jsonl");

    let entries = || vec![
        file("/a.tmp", 2 << 30),
        file("/b.tmp", 10),
        file("/c.log", 5),
    ];
    write_snapshot(&index_path, entries());
    write_snapshot(&live_path, entries());

    let index = SnapshotBackend::load(&index_path).unwrap();
    let live = SnapshotBackend::load(&live_path).unwrap();
    let policy = load_policy(SCRATCH, &[&index, &live]);

    let stats = policy::run(&policy, Box::new(index), Box::new(live),
                            &FilterOptions::default(), &mut std::io::sink())
        .unwrap();
    // The index answers the policy filter itself: c.log is never fetched.
    assert_eq!(stats.processed(), 2);
    assert_eq!(stats.excluded, 0);
    assert_eq!(stats.applied, 2);
    assert_eq!(stats.failed, 0);

    let live = SnapshotBackend::load(&live_path).unwrap();
    let a = live.get("/a.tmp").unwrap();
    assert_eq!(a.xattrs.get(TIER_XATTR).map(String::as_str), Some("archive"));
    assert!(live.get("/b.tmp").is_none());
    let c = live.get("/c.log").unwrap();
    assert!(c.xattrs.is_empty());

    let index = SnapshotBackend::load(&index_path).unwrap();
    assert!(index.get("/b.tmp").is_none());
    assert_eq!(index.entries().len(), 2);
    let c = index.get("/c.log").unwrap();
    assert!(c.xattrs.is_empty());
    assert_eq!(c.stat.size, 5);
}

#[test]
fn test_tier_predicate_in_policy() {
    let tempdir = tempfile::tempdir().unwrap();
    let index_path = tempdir.path().join("index.jsonl");

    let mut archived = file("/old.dat", 100);
    archived.xattrs.insert(String::from(TIER_XATTR), String::from("archive"));
    write_snapshot(&index_path, vec![archived, file("/new.dat", 100)]);

    let index = SnapshotBackend::load(&index_path).unwrap();
    let live = SnapshotBackend::load(&index_path).unwrap();
    let policy = load_policy(
        "name: report\nfilter: -tier archive\naction: common:print\n",
        &[&index, &live],
    );

    let mut out: Vec<u8> = vec![];
    policy::run(&policy, Box::new(index), Box::new(live),
                &FilterOptions::default(), &mut out).unwrap();
    assert_eq!(String::from_utf8(out).unwrap(), "/old.dat\n");
}

#[cfg(target_family = "unix")]
mod posix {
    use super::*;
    use fspolicy::backend::PosixBackend;

    const PURGE: &str = "name: purge\nfilter: -name *.tmp\naction: common:delete\n";

    fn setup() -> (tempfile::TempDir, tempfile::TempDir) {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("a.tmp"), "a").unwrap();
        std::fs::write(root.path().join("b.tmp"), "b").unwrap();
        std::fs::write(root.path().join("keep.txt"), "k").unwrap();

        let state = tempfile::tempdir().unwrap();
        write_snapshot(&state.path().join("index.jsonl"), vec![
            file("/a.tmp", 1),
            file("/b.tmp", 1),
            file("/gone.tmp", 1),
            file("/keep.txt", 1),
        ]);
        (root, state)
    }

    fn run(dry_run: bool) -> (tempfile::TempDir, policy::RunStats) {
        let (root, state) = setup();
        let index = SnapshotBackend::load(state.path().join("index.jsonl"))
            .unwrap();
        let live = PosixBackend::open(root.path()).unwrap();
        let policy = load_policy(PURGE, &[&index, &live]);

        let options = FilterOptions { dry_run, ..FilterOptions::default() };
        let stats = policy::run(&policy, Box::new(index), Box::new(live),
                                &options, &mut std::io::sink()).unwrap();
        (root, stats)
    }

    #[test]
    fn test_purge() {
        let (root, stats) = run(false);

        assert_eq!(stats.fetched, 3);
        assert_eq!(stats.vanished, 1);
        assert_eq!(stats.processed(), 2);
        assert_eq!(stats.applied, 2);
        assert!(!root.path().join("a.tmp").exists());
        assert!(!root.path().join("b.tmp").exists());
        assert!(root.path().join("keep.txt").exists());
    }

    #[test]
    fn test_purge_dry_run() {
        let (root, stats) = run(true);

        assert_eq!(stats.applied, 2);
        assert!(root.path().join("a.tmp").exists());
        assert!(root.path().join("b.tmp").exists());
    }
}
