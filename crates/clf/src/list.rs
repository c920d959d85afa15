use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::trace;

use crate::{
    Bucket, BucketError, BucketHash, BucketLevel, ClfMaster, LedgerEntry, LedgerKey,
};

/// The bucket list: a fixed stack of levels summarizing all ledger state
/// mutations, finest first.
///
/// Level geometry, with `half_period(j) = 2^(2j)`:
///
/// ```text
/// level 0:  snapshots and spills up every ledger
/// level 1:  every 4 ledgers
/// level 2:  every 16 ledgers
/// level 3:  every 64 ledgers
/// level 4:  terminal, never snapshots or spills
/// ```
///
/// Each level's `curr` accumulates spills from the level above for at most
/// a half period before it is frozen as `snap`; the frozen snap waits one
/// half period and then spills into the `curr` below. An entry therefore
/// resides in a level for a full period, and `curr`/`snap` each hold at
/// most a half period's worth of batches.
pub struct BucketList {
    levels: Vec<BucketLevel>,
    hash: BucketHash,
    last_ledger: u64,
}

impl BucketList {
    pub const NUM_LEVELS: usize = 5;

    pub fn new() -> Self {
        let levels: Vec<_> = (0..Self::NUM_LEVELS).map(BucketLevel::new).collect();
        let hash = Self::compute_hash(&levels);
        BucketList {
            levels,
            hash,
            last_ledger: 0,
        }
    }

    /// Ledgers between snapshots of a level
    pub fn half_period(level: usize) -> u64 {
        1 << (2 * level)
    }

    /// Ledgers an entry resides in a level before spilling to the next
    pub fn full_period(level: usize) -> u64 {
        2 * Self::half_period(level)
    }

    fn level_should_spill(ledger: u64, level: usize) -> bool {
        level + 1 < Self::NUM_LEVELS && ledger % Self::half_period(level) == 0
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn level(&self, level: usize) -> &BucketLevel {
        &self.levels[level]
    }

    /// Hash over every level's `(curr, snap)` hash pair, in level order.
    /// A pure function of the batch sequence ingested so far.
    pub fn hash(&self) -> BucketHash {
        self.hash
    }

    /// Sequence number of the last ingested ledger, 0 before the first
    pub fn last_ledger(&self) -> u64 {
        self.last_ledger
    }

    /// Ingest one ledger's live and dead batches.
    ///
    /// Builds the fresh bucket for level 0, dispatches every merge the
    /// schedule calls for at this ledger to the master's workers, awaits
    /// them, and advances the top hash. Spills are dispatched deepest
    /// first so that each merge sees the pre-snapshot state of the levels
    /// above its destination.
    pub fn add_batch(
        &mut self,
        master: &ClfMaster,
        ledger: u64,
        live: Vec<LedgerEntry>,
        dead: Vec<LedgerKey>,
    ) -> Result<BucketHash, BucketError> {
        if ledger == 0 {
            return Err(BucketError::InvariantViolation(
                "ledger sequence numbers start at 1".to_string(),
            ));
        }

        let incoming = master.adopt(Bucket::fresh_with(
            master.tmp_dir(),
            live,
            dead,
            master.config().spill_threshold,
        )?);
        self.levels[0].prepare(master, incoming, Vec::new(), true)?;
        self.levels[0].commit(master)?;

        for source in (0..Self::NUM_LEVELS - 1).rev() {
            if !Self::level_should_spill(ledger, source) {
                continue;
            }
            let shadows = self.spill_shadows(source);
            let spilling = self.levels[source].snap().clone();
            // tombstones are dropped once they reach the terminal level
            let keep_dead = source + 2 < Self::NUM_LEVELS;
            self.levels[source + 1].prepare(master, spilling, shadows, keep_dead)?;
            self.levels[source].snapshot();
        }

        for level in self.levels.iter_mut() {
            level.commit(master)?;
        }

        self.last_ledger = ledger;
        self.hash = Self::compute_hash(&self.levels);
        trace!("added batch {ledger}, hash={}", self.hash);
        Ok(self.hash)
    }

    /// The buckets that mask a spill out of `source`: every `curr` and
    /// `snap` strictly above it plus its own `curr`. Identities present in
    /// any of them have a fresher copy that will spill down later, so the
    /// older copy need not be carried into `source + 1`.
    fn spill_shadows(&self, source: usize) -> Vec<Arc<Bucket>> {
        let mut shadows = Vec::with_capacity(2 * source + 1);
        for level in &self.levels[..source] {
            shadows.push(level.curr().clone());
            shadows.push(level.snap().clone());
        }
        shadows.push(self.levels[source].curr().clone());
        shadows.retain(|shadow| !shadow.is_empty());
        shadows
    }

    fn compute_hash(levels: &[BucketLevel]) -> BucketHash {
        let mut hasher = Sha256::new();
        for level in levels {
            hasher.update(level.curr().hash().as_bytes());
            hasher.update(level.snap().hash().as_bytes());
        }
        BucketHash::from_digest(hasher)
    }
}

impl Default for BucketList {
    fn default() -> Self {
        Self::new()
    }
}
