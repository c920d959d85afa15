use std::cmp::Ordering;
use std::fmt;

/// Raw 32-byte account identifier. Ordered as a byte string.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AccountId(pub [u8; 32]);

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({})", hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// An issued currency: 4-byte alphanumeric code plus the issuing account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Currency {
    pub code: [u8; 4],
    pub issuer: AccountId,
}

/// The fields that uniquely identify a ledger entry of each kind.
///
/// The derived order is total: entry kind first (Account < TrustLine <
/// Offer), then the identifying fields lexicographically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LedgerKey {
    Account {
        account_id: AccountId,
    },
    TrustLine {
        account_id: AccountId,
        currency: Currency,
    },
    Offer {
        account_id: AccountId,
        sequence: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountEntry {
    pub account_id: AccountId,
    pub balance: i64,
    pub sequence: u64,
    pub num_sub_entries: u32,
    pub inflation_dest: Option<AccountId>,
    pub flags: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustLineEntry {
    pub account_id: AccountId,
    pub currency: Currency,
    pub limit: i64,
    pub balance: i64,
    pub authorized: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OfferEntry {
    pub account_id: AccountId,
    pub sequence: u64,
    pub taker_gets: Currency,
    pub taker_pays: Currency,
    pub amount: i64,
    /// Price of taker_gets in terms of taker_pays, in millionths
    pub price: i64,
}

/// A full ledger record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerEntry {
    Account(AccountEntry),
    TrustLine(TrustLineEntry),
    Offer(OfferEntry),
}

impl LedgerEntry {
    /// Project the identifying key out of a full record
    pub fn key(&self) -> LedgerKey {
        match self {
            LedgerEntry::Account(a) => LedgerKey::Account {
                account_id: a.account_id,
            },
            LedgerEntry::TrustLine(t) => LedgerKey::TrustLine {
                account_id: t.account_id,
                currency: t.currency,
            },
            LedgerEntry::Offer(o) => LedgerKey::Offer {
                account_id: o.account_id,
                sequence: o.sequence,
            },
        }
    }
}

/// A single element of a bucket: either a full record asserting the
/// presence of a ledger object, or a key-only tombstone asserting its
/// deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClfEntry {
    Live(LedgerEntry),
    Dead(LedgerKey),
}

impl ClfEntry {
    /// The identity of the entry, live or dead. Buckets sort and
    /// deduplicate on this.
    pub fn identity(&self) -> LedgerKey {
        match self {
            ClfEntry::Live(entry) => entry.key(),
            ClfEntry::Dead(key) => *key,
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, ClfEntry::Live(_))
    }

    pub fn is_dead(&self) -> bool {
        matches!(self, ClfEntry::Dead(_))
    }

    /// Identity order, with Dead before Live on an identity tie. Used to
    /// assert sortedness; merge winners are picked by input priority, never
    /// by this tie rule.
    pub fn cmp_by_identity(&self, other: &Self) -> Ordering {
        self.identity()
            .cmp(&other.identity())
            .then_with(|| self.is_live().cmp(&other.is_live()))
    }
}
