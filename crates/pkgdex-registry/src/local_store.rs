//! In-process datastore with optional on-disk persistence.
//!
//! Each package and its versions form one entity group with a revision
//! counter. Transactions are optimistic: they remember the revision of every
//! group they touch and, at commit, fail with [`StoreError::Conflict`] if any
//! of those groups moved on in the meantime. Commits and plain reads share a
//! single lock, so a reader sees either all of a commit or none of it.
//!
//! A persisted store may be shared by several processes. Every read reloads
//! the snapshot from disk, and a commit holds an exclusive lock on
//! `store.lock` while it reloads, validates revisions, and rewrites the
//! snapshot.
//!
//! Persisted layout:
//! ```text
//! <root>/
//!   store.json      : full snapshot, rewritten atomically on each commit
//!   store.lock      : held exclusively for the duration of a commit
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::model::{Package, PackageVersion};
use crate::store::{Datastore, Transaction};
use crate::version::Version;

const SNAPSHOT_FILE: &str = "store.json";
const LOCK_FILE: &str = "store.lock";

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    groups: BTreeMap<String, Group>,
}

/// One package with all of its versions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Group {
    #[serde(default)]
    revision: u64,
    #[serde(default)]
    package: Option<Package>,
    #[serde(default)]
    versions: BTreeMap<String, PackageVersion>,
}

impl Snapshot {
    fn revision(&self, group: &str) -> u64 {
        self.groups.get(group).map_or(0, |g| g.revision)
    }

    fn load(path: &Path) -> Result<Self, StoreError> {
        if !path.is_file() {
            return Ok(Snapshot::default());
        }
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }
}

/// A datastore kept in memory, optionally mirrored to a snapshot file.
#[derive(Debug)]
pub struct LocalStore {
    state: Mutex<Snapshot>,
    root: Option<PathBuf>,
}

impl LocalStore {
    /// A store that lives only as long as this value.
    pub fn in_memory() -> Self {
        LocalStore {
            state: Mutex::new(Snapshot::default()),
            root: None,
        }
    }

    /// Open (or create) a store persisted under `root`.
    pub fn open(root: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(root)?;
        let snapshot = Snapshot::load(&root.join(SNAPSHOT_FILE))?;

        Ok(LocalStore {
            state: Mutex::new(snapshot),
            root: Some(root.to_path_buf()),
        })
    }

    /// Root directory, if persisted.
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Lock the in-process state and bring it up to date with the snapshot
    /// file, which another process may have rewritten.
    fn current(&self) -> Result<MutexGuard<'_, Snapshot>, StoreError> {
        let mut state = self.state.lock();
        if let Some(root) = &self.root {
            *state = Snapshot::load(&root.join(SNAPSHOT_FILE))?;
        }
        Ok(state)
    }

    /// Exclusive cross-process commit lock, released when the file drops.
    fn lock_commits(&self) -> Result<Option<File>, StoreError> {
        let Some(root) = &self.root else {
            return Ok(None);
        };
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(root.join(LOCK_FILE))?;
        FileExt::lock_exclusive(&file)?;
        Ok(Some(file))
    }

    fn persist(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let Some(root) = &self.root else {
            return Ok(());
        };
        let path = root.join(SNAPSHOT_FILE);
        let tmp = root.join(format!("{SNAPSHOT_FILE}.tmp"));
        std::fs::write(&tmp, serde_json::to_vec_pretty(snapshot)?)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }
}

impl Datastore for LocalStore {
    fn begin(&self) -> Result<Box<dyn Transaction + '_>, StoreError> {
        Ok(Box::new(LocalTransaction {
            store: self,
            seen: HashMap::new(),
            packages: HashMap::new(),
            versions: HashMap::new(),
            finished: false,
        }))
    }

    fn package(&self, name: &str) -> Result<Option<Package>, StoreError> {
        let state = self.current()?;
        Ok(state.groups.get(name).and_then(|g| g.package.clone()))
    }

    fn version(
        &self,
        package: &str,
        version: &Version,
    ) -> Result<Option<PackageVersion>, StoreError> {
        let state = self.current()?;
        Ok(state
            .groups
            .get(package)
            .and_then(|g| g.versions.get(&version.to_string()).cloned()))
    }

    fn versions(&self, package: &str) -> Result<Vec<PackageVersion>, StoreError> {
        let state = self.current()?;
        Ok(state
            .groups
            .get(package)
            .map(|g| g.versions.values().cloned().collect())
            .unwrap_or_default())
    }
}

struct LocalTransaction<'a> {
    store: &'a LocalStore,
    /// Revision of each touched group when first observed.
    seen: HashMap<String, u64>,
    packages: HashMap<String, Package>,
    versions: HashMap<(String, String), PackageVersion>,
    finished: bool,
}

impl LocalTransaction<'_> {
    fn observe(&mut self, group: &str, state: &Snapshot) {
        if !self.seen.contains_key(group) {
            self.seen.insert(group.to_string(), state.revision(group));
        }
    }

    fn observe_current(&mut self, group: &str) -> Result<(), StoreError> {
        let store = self.store;
        let state = store.current()?;
        self.observe(group, &state);
        Ok(())
    }
}

impl Transaction for LocalTransaction<'_> {
    fn get_package(&mut self, name: &str) -> Result<Option<Package>, StoreError> {
        if let Some(pending) = self.packages.get(name) {
            return Ok(Some(pending.clone()));
        }
        let store = self.store;
        let state = store.current()?;
        self.observe(name, &state);
        Ok(state.groups.get(name).and_then(|g| g.package.clone()))
    }

    fn get_version(
        &mut self,
        package: &str,
        version: &Version,
    ) -> Result<Option<PackageVersion>, StoreError> {
        let key = (package.to_string(), version.to_string());
        if let Some(pending) = self.versions.get(&key) {
            return Ok(Some(pending.clone()));
        }
        let store = self.store;
        let state = store.current()?;
        self.observe(package, &state);
        Ok(state
            .groups
            .get(package)
            .and_then(|g| g.versions.get(&key.1).cloned()))
    }

    fn versions(&mut self, package: &str) -> Result<Vec<PackageVersion>, StoreError> {
        let mut merged: BTreeMap<String, PackageVersion> = {
            let store = self.store;
            let state = store.current()?;
            self.observe(package, &state);
            state
                .groups
                .get(package)
                .map(|g| g.versions.clone())
                .unwrap_or_default()
        };
        for ((group, key), pending) in &self.versions {
            if group == package {
                merged.insert(key.clone(), pending.clone());
            }
        }
        Ok(merged.into_values().collect())
    }

    fn put_package(&mut self, package: Package) -> Result<(), StoreError> {
        self.observe_current(&package.name)?;
        self.packages.insert(package.name.clone(), package);
        Ok(())
    }

    fn put_version(&mut self, version: PackageVersion) -> Result<(), StoreError> {
        self.observe_current(&version.package)?;
        let key = (version.package.clone(), version.version.to_string());
        self.versions.insert(key, version);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        self.finished = true;
        if self.packages.is_empty() && self.versions.is_empty() {
            return Ok(());
        }

        let store = self.store;
        let mut state = store.state.lock();
        let _commit_lock = store.lock_commits()?;
        if let Some(root) = &store.root {
            *state = Snapshot::load(&root.join(SNAPSHOT_FILE))?;
        }
        for (group, revision) in &self.seen {
            if state.revision(group) != *revision {
                return Err(StoreError::Conflict {
                    package: group.clone(),
                });
            }
        }

        let mut touched: Vec<String> = self.packages.keys().cloned().collect();
        touched.extend(self.versions.keys().map(|(group, _)| group.clone()));
        touched.sort();
        touched.dedup();

        let previous: Vec<(String, Option<Group>)> = touched
            .iter()
            .map(|name| (name.clone(), state.groups.get(name).cloned()))
            .collect();

        for (name, package) in self.packages.drain() {
            state.groups.entry(name).or_default().package = Some(package);
        }
        for ((name, key), version) in self.versions.drain() {
            state.groups.entry(name).or_default().versions.insert(key, version);
        }
        for name in &touched {
            if let Some(group) = state.groups.get_mut(name) {
                group.revision += 1;
            }
        }

        if let Err(e) = store.persist(&state) {
            for (name, group) in previous {
                match group {
                    Some(group) => {
                        state.groups.insert(name, group);
                    }
                    None => {
                        state.groups.remove(&name);
                    }
                }
            }
            return Err(e);
        }

        Ok(())
    }

    fn rollback(&mut self) {
        self.finished = true;
        self.packages.clear();
        self.versions.clear();
    }
}

impl Drop for LocalTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished && !(self.packages.is_empty() && self.versions.is_empty()) {
            tracing::debug!(
                groups = self.seen.len(),
                "discarding buffered writes of unfinished transaction"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrity::ContentHash;
    use crate::metadata::PackageMetadata;
    use crate::model::Identity;
    use crate::store::TransactionGuard;

    fn package(name: &str) -> Package {
        Package::new(name, Identity::new("owner@example.com"))
    }

    fn version(name: &str, v: &str) -> PackageVersion {
        PackageVersion {
            package: name.to_string(),
            version: Version::parse(v).unwrap(),
            sort_order: None,
            contents: ContentHash::compute(v.as_bytes()),
            metadata: PackageMetadata::new(name, v),
        }
    }

    #[test]
    fn commit_makes_writes_visible() {
        let store = LocalStore::in_memory();
        let mut txn = TransactionGuard::begin(&store).unwrap();
        txn.put_package(package("http")).unwrap();
        txn.put_version(version("http", "1.0.0")).unwrap();

        assert!(store.package("http").unwrap().is_none());
        txn.commit().unwrap();

        assert!(store.package("http").unwrap().is_some());
        assert_eq!(store.versions("http").unwrap().len(), 1);
        assert!(store
            .version("http", &Version::new(1, 0, 0))
            .unwrap()
            .is_some());
    }

    #[test]
    fn dropped_guard_discards_writes() {
        let store = LocalStore::in_memory();
        {
            let mut txn = TransactionGuard::begin(&store).unwrap();
            txn.put_package(package("http")).unwrap();
        }
        assert!(store.package("http").unwrap().is_none());
    }

    #[test]
    fn transaction_reads_its_own_writes() {
        let store = LocalStore::in_memory();
        let mut txn = TransactionGuard::begin(&store).unwrap();
        txn.put_version(version("http", "1.0.0")).unwrap();
        assert!(txn
            .get_version("http", &Version::new(1, 0, 0))
            .unwrap()
            .is_some());
        assert_eq!(txn.versions("http").unwrap().len(), 1);
    }

    #[test]
    fn concurrent_writers_to_one_package_conflict() {
        let store = LocalStore::in_memory();
        let mut first = TransactionGuard::begin(&store).unwrap();
        let mut second = TransactionGuard::begin(&store).unwrap();

        first.get_package("http").unwrap();
        second.get_package("http").unwrap();
        first.put_version(version("http", "1.0.0")).unwrap();
        second.put_version(version("http", "1.1.0")).unwrap();

        first.commit().unwrap();
        let err = second.commit().unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.versions("http").unwrap().len(), 1);
    }

    #[test]
    fn different_packages_do_not_conflict() {
        let store = LocalStore::in_memory();
        let mut first = TransactionGuard::begin(&store).unwrap();
        let mut second = TransactionGuard::begin(&store).unwrap();

        first.put_version(version("http", "1.0.0")).unwrap();
        second.put_version(version("json", "1.0.0")).unwrap();

        first.commit().unwrap();
        second.commit().unwrap();
    }

    #[test]
    fn persisted_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = LocalStore::open(dir.path()).unwrap();
            let mut txn = TransactionGuard::begin(&store).unwrap();
            txn.put_package(package("http")).unwrap();
            txn.put_version(version("http", "2.0.0-rc.1")).unwrap();
            txn.commit().unwrap();
        }

        let reopened = LocalStore::open(dir.path()).unwrap();
        assert_eq!(reopened.root(), Some(dir.path()));
        assert!(reopened.package("http").unwrap().is_some());
        let versions = reopened.versions("http").unwrap();
        assert_eq!(versions.len(), 1);
        assert!(versions[0].is_prerelease());
    }

    #[test]
    fn revision_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        let mut txn = TransactionGuard::begin(&store).unwrap();
        txn.put_package(package("http")).unwrap();
        txn.commit().unwrap();
        drop(store);

        let reopened = LocalStore::open(dir.path()).unwrap();
        assert_eq!(reopened.state.lock().revision("http"), 1);
    }

    #[test]
    fn handles_on_one_root_see_each_others_commits() {
        let dir = tempfile::tempdir().unwrap();
        let a = LocalStore::open(dir.path()).unwrap();
        let b = LocalStore::open(dir.path()).unwrap();

        let mut txn = TransactionGuard::begin(&a).unwrap();
        txn.put_package(package("http")).unwrap();
        txn.put_version(version("http", "1.0.0")).unwrap();
        txn.commit().unwrap();

        let mut txn = TransactionGuard::begin(&b).unwrap();
        assert!(txn
            .get_version("http", &Version::new(1, 0, 0))
            .unwrap()
            .is_some());
        txn.put_version(version("http", "2.0.0")).unwrap();
        txn.commit().unwrap();

        let mut txn = TransactionGuard::begin(&a).unwrap();
        txn.put_version(version("http", "1.1.0")).unwrap();
        txn.commit().unwrap();

        let reopened = LocalStore::open(dir.path()).unwrap();
        let mut listed: Vec<String> = reopened
            .versions("http")
            .unwrap()
            .iter()
            .map(|v| v.version.to_string())
            .collect();
        listed.sort();
        assert_eq!(listed, vec!["1.0.0", "1.1.0", "2.0.0"]);
    }

    #[test]
    fn stale_handle_conflicts_instead_of_overwriting() {
        let dir = tempfile::tempdir().unwrap();
        let a = LocalStore::open(dir.path()).unwrap();
        let b = LocalStore::open(dir.path()).unwrap();

        let mut late = TransactionGuard::begin(&b).unwrap();
        assert!(late
            .get_version("http", &Version::new(1, 0, 0))
            .unwrap()
            .is_none());

        let mut txn = TransactionGuard::begin(&a).unwrap();
        txn.put_package(package("http")).unwrap();
        txn.put_version(version("http", "1.0.0")).unwrap();
        txn.commit().unwrap();

        late.put_version(version("http", "1.0.0")).unwrap();
        let err = late.commit().unwrap_err();
        assert!(err.is_conflict());

        assert!(b.package("http").unwrap().is_some());
        assert_eq!(b.versions("http").unwrap().len(), 1);
    }

    #[test]
    fn failed_persist_leaves_state_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        let mut txn = TransactionGuard::begin(&store).unwrap();
        txn.put_package(package("http")).unwrap();
        txn.put_version(version("http", "1.0.0")).unwrap();
        txn.commit().unwrap();

        // A directory where the temporary snapshot goes makes the write fail.
        let blocker = dir.path().join(format!("{SNAPSHOT_FILE}.tmp"));
        std::fs::create_dir(&blocker).unwrap();

        let mut txn = TransactionGuard::begin(&store).unwrap();
        let mut bumped = package("http");
        bumped.latest_version = Some(Version::new(2, 0, 0));
        txn.put_package(bumped).unwrap();
        txn.put_version(version("http", "2.0.0")).unwrap();
        let err = txn.commit().unwrap_err();
        assert!(!err.is_conflict());

        {
            let state = store.state.lock();
            assert_eq!(state.revision("http"), 1);
            assert_eq!(state.groups["http"].versions.len(), 1);
        }
        assert_eq!(store.package("http").unwrap().unwrap().latest_version, None);
        assert_eq!(store.versions("http").unwrap().len(), 1);

        std::fs::remove_dir(&blocker).unwrap();
        let mut txn = TransactionGuard::begin(&store).unwrap();
        txn.put_version(version("http", "2.0.0")).unwrap();
        txn.commit().unwrap();
        assert_eq!(store.versions("http").unwrap().len(), 2);
    }
}
