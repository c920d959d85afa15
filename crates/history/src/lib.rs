use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::debug;

/// Rows per INSERT statement, comfortably under the SQLite bind-parameter
/// limit at six binds per row
const INSERT_CHUNK_ROWS: usize = 1000;

#[derive(Debug, Clone)]
pub struct TxHistoryRow {
    pub txid: String,
    pub ledger_seq: u32,
    pub tx_index: u32,
    pub tx_body: String,
    pub tx_result: String,
    pub tx_meta: String,
}

/// Buffering appender for the `txhistory` table.
///
/// Rows accumulate in memory until [`TxHistoryWriter::commit`] flushes them
/// in multi-row parameterized inserts inside a single transaction. The
/// buffer is cleared only after a successful flush, so a failed commit can
/// be retried.
pub struct TxHistoryWriter {
    rows: Vec<TxHistoryRow>,
}

impl TxHistoryWriter {
    pub fn new() -> Self {
        TxHistoryWriter {
            rows: Vec::with_capacity(10_000),
        }
    }

    pub fn add(&mut self, row: TxHistoryRow) {
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Flush all buffered rows. Flushing an empty buffer is a no-op.
    pub async fn commit(&mut self, db: &SqlitePool) -> Result<(), sqlx::Error> {
        if self.rows.is_empty() {
            return Ok(());
        }

        let mut tx = db.begin().await?;
        for chunk in self.rows.chunks(INSERT_CHUNK_ROWS) {
            let mut query = QueryBuilder::<Sqlite>::new(
                "INSERT INTO txhistory (txid, ledgerseq, txindex, txbody, txresult, txmeta) ",
            );
            query.push_values(chunk, |mut values, row| {
                values
                    .push_bind(&row.txid)
                    .push_bind(row.ledger_seq)
                    .push_bind(row.tx_index)
                    .push_bind(&row.tx_body)
                    .push_bind(&row.tx_result)
                    .push_bind(&row.tx_meta);
            });
            query.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;

        debug!("flushed {} txhistory rows", self.rows.len());
        self.rows.clear();
        Ok(())
    }
}

impl Default for TxHistoryWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Owner of the bulk writers the ledger close path appends to, flushed
/// together when a ledger commits
#[derive(Default)]
pub struct BulkWriterManager {
    pub tx_history: TxHistoryWriter,
}

impl BulkWriterManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn commit(&mut self, db: &SqlitePool) -> Result<(), sqlx::Error> {
        self.tx_history.commit(db).await
    }
}
