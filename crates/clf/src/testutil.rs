//! Deterministic generators for ledger data used across the test suite

pub use rand::Rng;
use rand::{seq::SliceRandom, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tempfile::TempDir;

use crate::{
    AccountEntry, AccountId, Bucket, Currency, LedgerEntry, LedgerKey, OfferEntry, TrustLineEntry,
};

pub fn rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

pub fn tmp_dir() -> TempDir {
    tempfile::Builder::new()
        .prefix("clf-test-")
        .tempdir()
        .unwrap()
}

pub fn account_id(rng: &mut impl Rng) -> AccountId {
    AccountId(rng.gen())
}

pub fn currency(rng: &mut impl Rng) -> Currency {
    Currency {
        code: rng.gen(),
        issuer: account_id(rng),
    }
}

pub fn account_entry(rng: &mut impl Rng) -> LedgerEntry {
    LedgerEntry::Account(AccountEntry {
        account_id: account_id(rng),
        balance: rng.gen_range(0..1_000_000),
        sequence: rng.gen_range(1..1_000),
        num_sub_entries: rng.gen_range(0..16),
        inflation_dest: if rng.gen_bool(0.25) {
            Some(account_id(rng))
        } else {
            None
        },
        flags: rng.gen(),
    })
}

pub fn trustline_entry(rng: &mut impl Rng) -> LedgerEntry {
    LedgerEntry::TrustLine(TrustLineEntry {
        account_id: account_id(rng),
        currency: currency(rng),
        limit: rng.gen_range(0..1_000_000),
        balance: rng.gen_range(0..1_000_000),
        authorized: rng.gen_bool(0.9),
    })
}

pub fn offer_entry(rng: &mut impl Rng) -> LedgerEntry {
    LedgerEntry::Offer(OfferEntry {
        account_id: account_id(rng),
        sequence: rng.gen_range(1..1_000),
        taker_gets: currency(rng),
        taker_pays: currency(rng),
        amount: rng.gen_range(1..1_000_000),
        price: rng.gen_range(1..10_000_000),
    })
}

pub fn ledger_entry(rng: &mut impl Rng) -> LedgerEntry {
    match rng.gen_range(0..3) {
        0 => account_entry(rng),
        1 => trustline_entry(rng),
        _ => offer_entry(rng),
    }
}

pub fn ledger_entries(rng: &mut impl Rng, count: usize) -> Vec<LedgerEntry> {
    (0..count).map(|_| ledger_entry(rng)).collect()
}

pub fn dead_keys(rng: &mut impl Rng, count: usize) -> Vec<LedgerKey> {
    ledger_entries(rng, count)
        .iter()
        .map(LedgerEntry::key)
        .collect()
}

pub fn shuffle<T>(rng: &mut impl Rng, items: &mut [T]) {
    items.shuffle(rng);
}

/// A copy of `entry` with the same balance and sequence bumped, keeping its
/// identity
pub fn bump_account(entry: LedgerEntry) -> LedgerEntry {
    let LedgerEntry::Account(mut account) = entry else {
        panic!("bump_account expects an account entry");
    };
    account.balance += 1;
    account.sequence += 1;
    LedgerEntry::Account(account)
}

/// A new record with the same identity as `entry` but randomized contents
pub fn rewrite(rng: &mut impl Rng, entry: LedgerEntry) -> LedgerEntry {
    match entry {
        LedgerEntry::Account(mut account) => {
            account.balance = rng.gen_range(0..1_000_000);
            account.sequence += 1;
            account.flags = rng.gen();
            LedgerEntry::Account(account)
        }
        LedgerEntry::TrustLine(mut trustline) => {
            trustline.balance = rng.gen_range(0..1_000_000);
            trustline.limit = rng.gen_range(0..1_000_000);
            LedgerEntry::TrustLine(trustline)
        }
        LedgerEntry::Offer(mut offer) => {
            offer.amount = rng.gen_range(1..1_000_000);
            offer.price = rng.gen_range(1..10_000_000);
            LedgerEntry::Offer(offer)
        }
    }
}

pub fn assert_sorted_and_unique(bucket: &Bucket) {
    let entries = bucket.entries().unwrap();
    for pair in entries.windows(2) {
        assert!(
            pair[0].identity() < pair[1].identity(),
            "entries out of order: {:?} then {:?}",
            pair[0].identity(),
            pair[1].identity()
        );
    }
}
