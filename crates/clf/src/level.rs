use std::{mem, sync::Arc};

use crate::{Bucket, BucketError, ClfMaster, PendingBucket};

/// One level of the bucket list: `curr` accumulates spills from the level
/// above since the last snapshot, `snap` is the most recently frozen
/// half period, waiting to spill to the level below.
pub struct BucketLevel {
    level: usize,
    curr: Arc<Bucket>,
    snap: Arc<Bucket>,
    pending: Option<PendingBucket>,
}

impl BucketLevel {
    pub(crate) fn new(level: usize) -> Self {
        BucketLevel {
            level,
            curr: Arc::new(Bucket::empty()),
            snap: Arc::new(Bucket::empty()),
            pending: None,
        }
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn curr(&self) -> &Arc<Bucket> {
        &self.curr
    }

    pub fn snap(&self) -> &Arc<Bucket> {
        &self.snap
    }

    /// Dispatch the merge of `newer` into this level's `curr`. At most one
    /// merge may be in flight per level; a second dispatch before commit is
    /// a scheduling defect.
    pub(crate) fn prepare(
        &mut self,
        master: &ClfMaster,
        newer: Arc<Bucket>,
        shadows: Vec<Arc<Bucket>>,
        keep_dead: bool,
    ) -> Result<(), BucketError> {
        if self.pending.is_some() {
            return Err(BucketError::InvariantViolation(format!(
                "level {} already has a merge in flight",
                self.level
            )));
        }
        self.pending = Some(master.spawn_merge(self.curr.clone(), newer, shadows, keep_dead));
        Ok(())
    }

    /// Await the in-flight merge, if any, and install its output as `curr`
    pub(crate) fn commit(&mut self, master: &ClfMaster) -> Result<(), BucketError> {
        if let Some(pending) = self.pending.take() {
            self.curr = pending.wait(master)?;
        }
        Ok(())
    }

    /// Freeze `curr` as the new `snap` and reset `curr` to empty,
    /// returning the frozen bucket
    pub(crate) fn snapshot(&mut self) -> Arc<Bucket> {
        self.snap = mem::replace(&mut self.curr, Arc::new(Bucket::empty()));
        self.snap.clone()
    }
}
