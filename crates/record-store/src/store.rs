use async_trait::async_trait;

use crate::{
    Cursor, DeadLetterEntry, LaunchPatch, LaunchQuery, MemecoinAddress, Result, SourceId,
    TokenLaunchRecord, TokenTransactionRecord, TransferId, TxHash,
};

/// A scoped, atomic unit of work against the record store.
///
/// Reads observe the unit's own staged writes. Nothing becomes visible to
/// other readers until [`commit`](UnitOfWork::commit) succeeds; dropping the
/// unit without committing discards every write.
#[async_trait]
pub trait UnitOfWork: Send {
    async fn find_launch_by_address(
        &mut self,
        address: &MemecoinAddress,
    ) -> Result<Option<TokenLaunchRecord>>;

    async fn find_launch_by_tx_hash(&mut self, hash: &TxHash) -> Result<Option<TokenLaunchRecord>>;

    async fn find_transaction(
        &mut self,
        transfer_id: &TransferId,
    ) -> Result<Option<TokenTransactionRecord>>;

    /// Inserts a new launch.
    ///
    /// Fails with `UniqueViolation` if the transaction hash or the memecoin
    /// address is already taken.
    async fn insert_launch(&mut self, record: &TokenLaunchRecord) -> Result<()>;

    /// Inserts a transaction record.
    ///
    /// Fails with `UniqueViolation` if the transfer ID already exists. The
    /// failure leaves the unit of work usable.
    async fn insert_transaction(&mut self, record: &TokenTransactionRecord) -> Result<()>;

    /// Patches a launch in place. Returns false if no launch has this hash.
    async fn patch_launch(&mut self, hash: &TxHash, patch: &LaunchPatch) -> Result<bool>;

    async fn write_cursor(&mut self, cursor: &Cursor) -> Result<()>;

    async fn append_dead_letter(&mut self, entry: &DeadLetterEntry) -> Result<()>;

    /// Makes every staged write durable, all or nothing.
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Discards every staged write.
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Query-only access to projected records.
///
/// This is the surface exposed to readers; it has no mutation methods.
#[async_trait]
pub trait RecordReader: Send + Sync {
    async fn get_launch_by_address(
        &self,
        address: &MemecoinAddress,
    ) -> Result<Option<TokenLaunchRecord>>;

    async fn get_launch_by_tx_hash(&self, hash: &TxHash) -> Result<Option<TokenLaunchRecord>>;

    async fn get_transaction(
        &self,
        transfer_id: &TransferId,
    ) -> Result<Option<TokenTransactionRecord>>;

    /// Transactions referencing a memecoin, oldest block first.
    async fn transactions_for_address(
        &self,
        address: &MemecoinAddress,
        limit: usize,
    ) -> Result<Vec<TokenTransactionRecord>>;

    async fn query_launches(&self, query: LaunchQuery) -> Result<Vec<TokenLaunchRecord>>;

    /// Dead-letter entries in the order they were recorded.
    async fn dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterEntry>>;

    async fn read_cursor(&self, source_id: &SourceId) -> Result<Option<Cursor>>;
}

/// An ACID, key-addressable store of launch and transaction records.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait RecordStore: RecordReader {
    /// Starts a new unit of work.
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>>;
}
