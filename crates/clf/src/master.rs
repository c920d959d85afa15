use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex, Weak},
};

use serde::Deserialize;
use tracing::debug;

use crate::{Bucket, BucketError, BucketHash, MasterError, DEFAULT_SPILL_THRESHOLD};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MasterConfig {
    /// Directory under which the bucket tmp dir is created. Defaults to the
    /// OS temp directory.
    pub tmp_root: Option<PathBuf>,
    /// Serialized size above which a bucket is backed by a file
    pub spill_threshold: usize,
    /// Number of background merge workers
    pub merge_workers: usize,
}

impl Default for MasterConfig {
    fn default() -> Self {
        MasterConfig {
            tmp_root: None,
            spill_threshold: DEFAULT_SPILL_THRESHOLD,
            merge_workers: num_cpus::get().min(4),
        }
    }
}

/// Process-wide owner of bucket resources: the tmp directory every bucket
/// file lives in, the merge worker pool, and the registry of live buckets.
///
/// The tmp dir is created at startup and removed recursively when the
/// master drops; the OS temp reclamation is the backstop for abnormal
/// termination.
pub struct ClfMaster {
    config: MasterConfig,
    /// Dropped before the tmp dir so in-flight merges finish writing
    /// first
    pool: rayon::ThreadPool,
    tmp_dir: tempfile::TempDir,
    /// Live buckets by content hash. Merges can reproduce a bucket that
    /// is still referenced elsewhere; adopting through the registry keeps
    /// one owner per backing file.
    shared: Mutex<HashMap<BucketHash, Weak<Bucket>>>,
}

impl ClfMaster {
    pub fn new() -> Result<Self, MasterError> {
        Self::with_config(MasterConfig::default())
    }

    pub fn with_config(config: MasterConfig) -> Result<Self, MasterError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("clf-buckets-");
        let tmp_dir = match &config.tmp_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(MasterError::TmpDir)?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.merge_workers)
            .thread_name(|i| format!("bucket-merge-{i}"))
            .build()?;

        debug!(
            "bucket tmp dir at {:?}, {} merge workers",
            tmp_dir.path(),
            config.merge_workers
        );
        Ok(ClfMaster {
            config,
            tmp_dir,
            pool,
            shared: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &MasterConfig {
        &self.config
    }

    /// The directory all bucket files of this process live in
    pub fn tmp_dir(&self) -> &Path {
        self.tmp_dir.path()
    }

    /// Register a freshly built bucket, deduplicating against live buckets
    /// with the same content hash. The duplicate gives up its claim on the
    /// shared backing file before it is dropped.
    pub fn adopt(&self, bucket: Bucket) -> Arc<Bucket> {
        let mut shared = self.shared.lock().unwrap_or_else(|err| err.into_inner());
        shared.retain(|_, weak| weak.strong_count() > 0);

        if let Some(existing) = shared.get(&bucket.hash()).and_then(Weak::upgrade) {
            bucket.disown_file();
            return existing;
        }
        let bucket = Arc::new(bucket);
        shared.insert(bucket.hash(), Arc::downgrade(&bucket));
        bucket
    }

    /// Submit a merge to the worker pool. Merges that cannot change the
    /// surviving input resolve immediately without a job.
    pub fn spawn_merge(
        &self,
        older: Arc<Bucket>,
        newer: Arc<Bucket>,
        shadows: Vec<Arc<Bucket>>,
        keep_dead: bool,
    ) -> PendingBucket {
        if keep_dead && shadows.iter().all(|shadow| shadow.is_empty()) {
            if older.is_empty() {
                return PendingBucket(PendingInner::Ready(newer));
            }
            if newer.is_empty() {
                return PendingBucket(PendingInner::Ready(older));
            }
        }

        let (tx, rx) = mpsc::channel();
        let dir = self.tmp_dir().to_path_buf();
        let spill_threshold = self.config.spill_threshold;
        self.pool.spawn(move || {
            let result =
                Bucket::merge_with(&dir, &older, &newer, &shadows, keep_dead, spill_threshold);
            let _ = tx.send(result);
        });
        PendingBucket(PendingInner::Job(rx))
    }
}

/// Handle to a merge output that may still be running on a worker
pub struct PendingBucket(PendingInner);

enum PendingInner {
    Ready(Arc<Bucket>),
    Job(mpsc::Receiver<Result<Bucket, BucketError>>),
}

impl PendingBucket {
    /// Block until the merge completes and register its output with the
    /// master
    pub fn wait(self, master: &ClfMaster) -> Result<Arc<Bucket>, BucketError> {
        match self.0 {
            PendingInner::Ready(bucket) => Ok(bucket),
            PendingInner::Job(rx) => {
                let bucket = rx.recv().map_err(|_| BucketError::ShutdownRequested)??;
                Ok(master.adopt(bucket))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::*;

    #[test]
    fn tmp_dir_removed_on_drop() {
        let master = ClfMaster::new().unwrap();
        let path = master.tmp_dir().to_path_buf();
        assert!(path.is_dir());
        drop(master);
        assert!(!path.exists());
    }

    #[test]
    fn adopt_dedups_identical_buckets() {
        let master = ClfMaster::new().unwrap();
        let mut rng = rng(40);
        let live = ledger_entries(&mut rng, 32);

        let a = Bucket::fresh_with(master.tmp_dir(), live.clone(), vec![], 64).unwrap();
        let b = Bucket::fresh_with(master.tmp_dir(), live, vec![], 64).unwrap();
        assert_eq!(a.hash(), b.hash());

        let a = master.adopt(a);
        let path = a.file_path().unwrap().to_path_buf();
        let b = master.adopt(b);
        assert!(Arc::ptr_eq(&a, &b));

        // the duplicate's drop must not take the shared file with it
        assert!(path.exists());
        drop(b);
        assert!(path.exists());
        drop(a);
        assert!(!path.exists());
    }

    #[test]
    fn adopt_forgets_dropped_buckets() {
        let master = ClfMaster::new().unwrap();
        let mut rng = rng(41);
        let live = ledger_entries(&mut rng, 8);

        let first = master.adopt(Bucket::fresh(master.tmp_dir(), live.clone(), vec![]).unwrap());
        let hash = first.hash();
        drop(first);

        let second = master.adopt(Bucket::fresh(master.tmp_dir(), live, vec![]).unwrap());
        assert_eq!(second.hash(), hash);
    }

    #[test]
    fn spawned_merge_runs_on_the_pool() {
        let master = ClfMaster::new().unwrap();
        let mut rng = rng(42);

        let older =
            master.adopt(Bucket::fresh(master.tmp_dir(), ledger_entries(&mut rng, 16), vec![]).unwrap());
        let newer =
            master.adopt(Bucket::fresh(master.tmp_dir(), ledger_entries(&mut rng, 16), vec![]).unwrap());

        let pending = master.spawn_merge(older.clone(), newer.clone(), vec![], true);
        let merged = pending.wait(&master).unwrap();
        assert_eq!(merged.len(), older.len() + newer.len());
    }

    #[test]
    fn trivial_merges_reuse_the_surviving_input() {
        let master = ClfMaster::new().unwrap();
        let mut rng = rng(43);
        let bucket =
            master.adopt(Bucket::fresh(master.tmp_dir(), ledger_entries(&mut rng, 4), vec![]).unwrap());
        let empty = Arc::new(Bucket::empty());

        let merged = master
            .spawn_merge(empty.clone(), bucket.clone(), vec![], true)
            .wait(&master)
            .unwrap();
        assert!(Arc::ptr_eq(&merged, &bucket));

        let merged = master
            .spawn_merge(bucket.clone(), empty, vec![], true)
            .wait(&master)
            .unwrap();
        assert!(Arc::ptr_eq(&merged, &bucket));
    }
}
