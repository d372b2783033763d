use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    Cursor, DeadLetterEntry, LaunchPatch, LaunchQuery, MemecoinAddress, Result, SourceId,
    StoreError, TokenLaunchRecord, TokenTransactionRecord, TransferId, TxHash,
    store::{RecordReader, RecordStore, UnitOfWork},
};

#[derive(Debug, Default)]
struct Tables {
    launches: HashMap<TxHash, TokenLaunchRecord>,
    launch_by_address: HashMap<MemecoinAddress, TxHash>,
    transactions: HashMap<TransferId, TokenTransactionRecord>,
    cursors: HashMap<SourceId, Cursor>,
    dead_letters: Vec<DeadLetterEntry>,
}

impl Tables {
    fn launch_by_address(&self, address: &MemecoinAddress) -> Option<&TokenLaunchRecord> {
        self.launch_by_address
            .get(address)
            .and_then(|hash| self.launches.get(hash))
    }
}

#[derive(Debug, Default)]
struct Faults {
    failing_commits: AtomicUsize,
    commit_latency_ms: AtomicU64,
    commits: AtomicUsize,
}

/// In-memory record store implementation for testing and local runs.
///
/// Units of work stage their writes and apply them under a single write lock
/// on commit, so a unit is atomic and invisible to readers until then.
/// Uniqueness is re-checked at commit time; a conflicting unit fails with
/// `UniqueViolation` and applies nothing.
#[derive(Clone, Default)]
pub struct InMemoryRecordStore {
    tables: Arc<RwLock<Tables>>,
    faults: Arc<Faults>,
}

impl InMemoryRecordStore {
    /// Creates a new empty in-memory record store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` commits fail with `Unavailable`.
    pub fn fail_next_commits(&self, count: usize) {
        self.faults.failing_commits.store(count, Ordering::SeqCst);
    }

    /// Delays every commit, simulating store I/O.
    pub fn set_commit_latency(&self, latency: Duration) {
        self.faults
            .commit_latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of successful commits so far.
    pub fn commit_count(&self) -> usize {
        self.faults.commits.load(Ordering::SeqCst)
    }

    pub async fn launch_count(&self) -> usize {
        self.tables.read().await.launches.len()
    }

    pub async fn transaction_count(&self) -> usize {
        self.tables.read().await.transactions.len()
    }

    /// Every launch record, ordered by transaction hash.
    pub async fn all_launches(&self) -> Vec<TokenLaunchRecord> {
        let mut launches: Vec<_> = self.tables.read().await.launches.values().cloned().collect();
        launches.sort_by(|a, b| a.transaction_hash.cmp(&b.transaction_hash));
        launches
    }

    /// Every transaction record, ordered by transfer ID.
    pub async fn all_transactions(&self) -> Vec<TokenTransactionRecord> {
        let mut transactions: Vec<_> = self
            .tables
            .read()
            .await
            .transactions
            .values()
            .cloned()
            .collect();
        transactions.sort_by(|a, b| a.transfer_id.cmp(&b.transfer_id));
        transactions
    }

    fn take_injected_failure(&self) -> bool {
        self.faults
            .failing_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl RecordReader for InMemoryRecordStore {
    async fn get_launch_by_address(
        &self,
        address: &MemecoinAddress,
    ) -> Result<Option<TokenLaunchRecord>> {
        Ok(self.tables.read().await.launch_by_address(address).cloned())
    }

    async fn get_launch_by_tx_hash(&self, hash: &TxHash) -> Result<Option<TokenLaunchRecord>> {
        Ok(self.tables.read().await.launches.get(hash).cloned())
    }

    async fn get_transaction(
        &self,
        transfer_id: &TransferId,
    ) -> Result<Option<TokenTransactionRecord>> {
        Ok(self.tables.read().await.transactions.get(transfer_id).cloned())
    }

    async fn transactions_for_address(
        &self,
        address: &MemecoinAddress,
        limit: usize,
    ) -> Result<Vec<TokenTransactionRecord>> {
        let tables = self.tables.read().await;
        let mut transactions: Vec<_> = tables
            .transactions
            .values()
            .filter(|t| &t.memecoin_address == address)
            .cloned()
            .collect();
        transactions.sort_by(|a, b| {
            a.created_at_block
                .cmp(&b.created_at_block)
                .then_with(|| a.transfer_id.cmp(&b.transfer_id))
        });
        transactions.truncate(limit);
        Ok(transactions)
    }

    async fn query_launches(&self, query: LaunchQuery) -> Result<Vec<TokenLaunchRecord>> {
        let tables = self.tables.read().await;
        let mut launches: Vec<_> = tables
            .launches
            .values()
            .filter(|l| {
                if let Some(added) = query.liquidity_added
                    && l.is_liquidity_added != added
                {
                    return false;
                }
                if let Some(ref owner) = query.owner_address
                    && &l.owner_address != owner
                {
                    return false;
                }
                if let Some(from) = query.from_block
                    && l.created_at_block < from
                {
                    return false;
                }
                true
            })
            .cloned()
            .collect();

        launches.sort_by(|a, b| {
            a.created_at_block
                .cmp(&b.created_at_block)
                .then_with(|| a.transaction_hash.cmp(&b.transaction_hash))
        });

        let offset = query.offset.unwrap_or(0);
        let launches = launches.into_iter().skip(offset);
        Ok(match query.limit {
            Some(limit) => launches.take(limit).collect(),
            None => launches.collect(),
        })
    }

    async fn dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterEntry>> {
        let tables = self.tables.read().await;
        Ok(tables.dead_letters.iter().take(limit).cloned().collect())
    }

    async fn read_cursor(&self, source_id: &SourceId) -> Result<Option<Cursor>> {
        Ok(self.tables.read().await.cursors.get(source_id).cloned())
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        Ok(Box::new(InMemoryUnitOfWork {
            store: self.clone(),
            staged: Staged::default(),
        }))
    }
}

#[derive(Debug, Default)]
struct Staged {
    launches: Vec<TokenLaunchRecord>,
    patches: Vec<(TxHash, LaunchPatch)>,
    transactions: Vec<TokenTransactionRecord>,
    cursors: Vec<Cursor>,
    dead_letters: Vec<DeadLetterEntry>,
}

struct InMemoryUnitOfWork {
    store: InMemoryRecordStore,
    staged: Staged,
}

impl InMemoryUnitOfWork {
    /// Applies this unit's staged patches on top of a committed record.
    fn overlay(&self, record: Option<TokenLaunchRecord>) -> Option<TokenLaunchRecord> {
        let mut record = record?;
        for (hash, patch) in &self.staged.patches {
            if hash == &record.transaction_hash {
                record.apply_patch(patch);
            }
        }
        Some(record)
    }

    fn staged_launch<F>(&self, predicate: F) -> Option<TokenLaunchRecord>
    where
        F: Fn(&TokenLaunchRecord) -> bool,
    {
        self.staged.launches.iter().find(|l| predicate(l)).cloned()
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn find_launch_by_address(
        &mut self,
        address: &MemecoinAddress,
    ) -> Result<Option<TokenLaunchRecord>> {
        let found = match self.staged_launch(|l| &l.memecoin_address == address) {
            Some(launch) => Some(launch),
            None => self.store.get_launch_by_address(address).await?,
        };
        Ok(self.overlay(found))
    }

    async fn find_launch_by_tx_hash(&mut self, hash: &TxHash) -> Result<Option<TokenLaunchRecord>> {
        let found = match self.staged_launch(|l| &l.transaction_hash == hash) {
            Some(launch) => Some(launch),
            None => self.store.get_launch_by_tx_hash(hash).await?,
        };
        Ok(self.overlay(found))
    }

    async fn find_transaction(
        &mut self,
        transfer_id: &TransferId,
    ) -> Result<Option<TokenTransactionRecord>> {
        if let Some(staged) = self
            .staged
            .transactions
            .iter()
            .find(|t| &t.transfer_id == transfer_id)
        {
            return Ok(Some(staged.clone()));
        }
        self.store.get_transaction(transfer_id).await
    }

    async fn insert_launch(&mut self, record: &TokenLaunchRecord) -> Result<()> {
        if self
            .find_launch_by_tx_hash(&record.transaction_hash)
            .await?
            .is_some()
        {
            return Err(StoreError::UniqueViolation {
                entity: "token_launches.transaction_hash",
                key: record.transaction_hash.to_string(),
            });
        }
        if self
            .find_launch_by_address(&record.memecoin_address)
            .await?
            .is_some()
        {
            return Err(StoreError::UniqueViolation {
                entity: "token_launches.memecoin_address",
                key: record.memecoin_address.to_string(),
            });
        }
        self.staged.launches.push(record.clone());
        Ok(())
    }

    async fn insert_transaction(&mut self, record: &TokenTransactionRecord) -> Result<()> {
        if self.find_transaction(&record.transfer_id).await?.is_some() {
            return Err(StoreError::UniqueViolation {
                entity: "token_transactions.transfer_id",
                key: record.transfer_id.to_string(),
            });
        }
        self.staged.transactions.push(record.clone());
        Ok(())
    }

    async fn patch_launch(&mut self, hash: &TxHash, patch: &LaunchPatch) -> Result<bool> {
        if self.find_launch_by_tx_hash(hash).await?.is_none() {
            return Ok(false);
        }
        self.staged.patches.push((hash.clone(), *patch));
        Ok(true)
    }

    async fn write_cursor(&mut self, cursor: &Cursor) -> Result<()> {
        self.staged.cursors.push(cursor.clone());
        Ok(())
    }

    async fn append_dead_letter(&mut self, entry: &DeadLetterEntry) -> Result<()> {
        self.staged.dead_letters.push(entry.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let latency = self.store.faults.commit_latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.store.take_injected_failure() {
            return Err(StoreError::Unavailable(
                "injected commit failure".to_string(),
            ));
        }

        let InMemoryUnitOfWork { store, staged } = *self;
        let mut tables = store.tables.write().await;

        // Another unit may have committed the same keys since we staged.
        for launch in &staged.launches {
            if tables.launches.contains_key(&launch.transaction_hash)
                || tables.launch_by_address.contains_key(&launch.memecoin_address)
            {
                return Err(StoreError::UniqueViolation {
                    entity: "token_launches",
                    key: launch.transaction_hash.to_string(),
                });
            }
        }
        for transaction in &staged.transactions {
            if tables.transactions.contains_key(&transaction.transfer_id) {
                return Err(StoreError::UniqueViolation {
                    entity: "token_transactions.transfer_id",
                    key: transaction.transfer_id.to_string(),
                });
            }
        }

        for launch in staged.launches {
            tables
                .launch_by_address
                .insert(launch.memecoin_address.clone(), launch.transaction_hash.clone());
            tables
                .launches
                .insert(launch.transaction_hash.clone(), launch);
        }
        for (hash, patch) in staged.patches {
            if let Some(launch) = tables.launches.get_mut(&hash) {
                launch.apply_patch(&patch);
            }
        }
        for transaction in staged.transactions {
            tables
                .transactions
                .insert(transaction.transfer_id.clone(), transaction);
        }
        for cursor in staged.cursors {
            tables.cursors.insert(cursor.source_id.clone(), cursor);
        }
        tables.dead_letters.extend(staged.dead_letters);

        store.faults.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
