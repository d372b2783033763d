use async_trait::async_trait;
use chrono::{DateTime, Utc};
use events::OrderingKey;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Cursor, DeadLetterEntry, DeadLetterId, LaunchPatch, LaunchQuery, MemecoinAddress, Result,
    SourceId, StoreError, TokenLaunchRecord, TokenTransactionRecord, TransactionKind, TransferId,
    TxHash,
    store::{RecordReader, RecordStore, UnitOfWork},
};

const LAUNCH_COLUMNS: &str = "transaction_hash, memecoin_address, owner_address, quote_token, \
     total_supply, is_liquidity_added, created_at_block, liquidity_added_at_block";

const TRANSACTION_COLUMNS: &str = "transfer_id, memecoin_address, kind, owner_address, amount, \
     quote_amount, created_at_block";

const DEAD_LETTER_COLUMNS: &str = "id, source_id, transfer_id, source_block, source_tx_index, \
     source_event_index, reason, envelope, recorded_at";

/// PostgreSQL-backed record store implementation.
#[derive(Clone)]
pub struct PostgresRecordStore {
    pool: PgPool,
}

impl PostgresRecordStore {
    /// Creates a new PostgreSQL record store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        tracing::info!("record store migrations applied");
        Ok(())
    }
}

fn to_i64(value: u64, column: &str) -> Result<i64> {
    i64::try_from(value).map_err(|_| StoreError::Corrupt(format!("{column} {value} exceeds i64")))
}

fn from_i64<T: TryFrom<i64>>(value: i64, column: &str) -> Result<T> {
    T::try_from(value).map_err(|_| StoreError::Corrupt(format!("{column} {value} out of range")))
}

fn row_to_launch(row: PgRow) -> Result<TokenLaunchRecord> {
    let liquidity_block: Option<i64> = row.try_get("liquidity_added_at_block")?;
    Ok(TokenLaunchRecord {
        transaction_hash: TxHash::new(row.try_get::<String, _>("transaction_hash")?),
        memecoin_address: MemecoinAddress::new(row.try_get::<String, _>("memecoin_address")?),
        owner_address: row.try_get("owner_address")?,
        quote_token: row.try_get("quote_token")?,
        total_supply: row.try_get("total_supply")?,
        is_liquidity_added: row.try_get("is_liquidity_added")?,
        created_at_block: from_i64(row.try_get("created_at_block")?, "created_at_block")?,
        liquidity_added_at_block: liquidity_block
            .map(|b| from_i64(b, "liquidity_added_at_block"))
            .transpose()?,
    })
}

fn row_to_transaction(row: PgRow) -> Result<TokenTransactionRecord> {
    let kind: String = row.try_get("kind")?;
    Ok(TokenTransactionRecord {
        transfer_id: TransferId::new(row.try_get::<String, _>("transfer_id")?),
        memecoin_address: MemecoinAddress::new(row.try_get::<String, _>("memecoin_address")?),
        kind: kind.parse::<TransactionKind>().map_err(StoreError::Corrupt)?,
        owner_address: row.try_get("owner_address")?,
        amount: row.try_get("amount")?,
        quote_amount: row.try_get("quote_amount")?,
        created_at_block: from_i64(row.try_get("created_at_block")?, "created_at_block")?,
    })
}

fn row_to_cursor(row: PgRow) -> Result<Cursor> {
    Ok(Cursor {
        source_id: SourceId::new(row.try_get::<String, _>("source_id")?),
        position: OrderingKey::new(
            from_i64(row.try_get("last_applied_block")?, "last_applied_block")?,
            from_i64(row.try_get("last_applied_tx_index")?, "last_applied_tx_index")?,
            from_i64(
                row.try_get("last_applied_event_index")?,
                "last_applied_event_index",
            )?,
        ),
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

fn row_to_dead_letter(row: PgRow) -> Result<DeadLetterEntry> {
    let block: Option<i64> = row.try_get("source_block")?;
    let tx_index: Option<i64> = row.try_get("source_tx_index")?;
    let event_index: Option<i64> = row.try_get("source_event_index")?;
    let ordering = match (block, tx_index, event_index) {
        (Some(b), Some(t), Some(e)) => Some(OrderingKey::new(
            from_i64(b, "source_block")?,
            from_i64(t, "source_tx_index")?,
            from_i64(e, "source_event_index")?,
        )),
        _ => None,
    };
    let reason: serde_json::Value = row.try_get("reason")?;

    Ok(DeadLetterEntry {
        id: DeadLetterId::from_uuid(row.try_get::<Uuid, _>("id")?),
        source_id: row
            .try_get::<Option<String>, _>("source_id")?
            .map(SourceId::new),
        transfer_id: row
            .try_get::<Option<String>, _>("transfer_id")?
            .map(TransferId::new),
        ordering,
        reason: serde_json::from_value(reason)?,
        envelope: row.try_get("envelope")?,
        recorded_at: row.try_get("recorded_at")?,
    })
}

#[async_trait]
impl RecordReader for PostgresRecordStore {
    async fn get_launch_by_address(
        &self,
        address: &MemecoinAddress,
    ) -> Result<Option<TokenLaunchRecord>> {
        let sql = format!("SELECT {LAUNCH_COLUMNS} FROM token_launches WHERE memecoin_address = $1");
        let row = sqlx::query(&sql)
            .bind(address.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_launch).transpose()
    }

    async fn get_launch_by_tx_hash(&self, hash: &TxHash) -> Result<Option<TokenLaunchRecord>> {
        let sql = format!("SELECT {LAUNCH_COLUMNS} FROM token_launches WHERE transaction_hash = $1");
        let row = sqlx::query(&sql)
            .bind(hash.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_launch).transpose()
    }

    async fn get_transaction(
        &self,
        transfer_id: &TransferId,
    ) -> Result<Option<TokenTransactionRecord>> {
        let sql =
            format!("SELECT {TRANSACTION_COLUMNS} FROM token_transactions WHERE transfer_id = $1");
        let row = sqlx::query(&sql)
            .bind(transfer_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_transaction).transpose()
    }

    async fn transactions_for_address(
        &self,
        address: &MemecoinAddress,
        limit: usize,
    ) -> Result<Vec<TokenTransactionRecord>> {
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM token_transactions \
             WHERE memecoin_address = $1 \
             ORDER BY created_at_block ASC, transfer_id ASC \
             LIMIT $2"
        );
        let rows = sqlx::query(&sql)
            .bind(address.as_str())
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(row_to_transaction).collect()
    }

    async fn query_launches(&self, query: LaunchQuery) -> Result<Vec<TokenLaunchRecord>> {
        let mut sql = format!("SELECT {LAUNCH_COLUMNS} FROM token_launches WHERE 1=1");
        let mut param_count = 0;

        // Build dynamic query
        if query.liquidity_added.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND is_liquidity_added = ${param_count}"));
        }
        if query.owner_address.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND owner_address = ${param_count}"));
        }
        if query.from_block.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND created_at_block >= ${param_count}"));
        }

        sql.push_str(" ORDER BY created_at_block ASC, transaction_hash ASC");

        if query.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }
        if query.offset.is_some() {
            param_count += 1;
            sql.push_str(&format!(" OFFSET ${param_count}"));
        }

        // Bind in the same order the placeholders were numbered
        let mut sqlx_query = sqlx::query(&sql);

        if let Some(added) = query.liquidity_added {
            sqlx_query = sqlx_query.bind(added);
        }
        if let Some(owner) = query.owner_address {
            sqlx_query = sqlx_query.bind(owner);
        }
        if let Some(from_block) = query.from_block {
            sqlx_query = sqlx_query.bind(to_i64(from_block, "from_block")?);
        }
        if let Some(limit) = query.limit {
            sqlx_query = sqlx_query.bind(limit as i64);
        }
        if let Some(offset) = query.offset {
            sqlx_query = sqlx_query.bind(offset as i64);
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        rows.into_iter().map(row_to_launch).collect()
    }

    async fn dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterEntry>> {
        let sql =
            format!("SELECT {DEAD_LETTER_COLUMNS} FROM dead_letters ORDER BY sequence ASC LIMIT $1");
        let rows = sqlx::query(&sql)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(row_to_dead_letter).collect()
    }

    async fn read_cursor(&self, source_id: &SourceId) -> Result<Option<Cursor>> {
        let row = sqlx::query(
            r#"
            SELECT source_id, last_applied_block, last_applied_tx_index,
                   last_applied_event_index, updated_at
            FROM ingestion_cursors
            WHERE source_id = $1
            "#,
        )
        .bind(source_id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_cursor).transpose()
    }
}

#[async_trait]
impl RecordStore for PostgresRecordStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }
}

/// A unit of work backed by one PostgreSQL transaction.
///
/// Dropping it without `commit` rolls the transaction back.
struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn find_launch_by_address(
        &mut self,
        address: &MemecoinAddress,
    ) -> Result<Option<TokenLaunchRecord>> {
        let sql = format!(
            "SELECT {LAUNCH_COLUMNS} FROM token_launches WHERE memecoin_address = $1 FOR UPDATE"
        );
        let row = sqlx::query(&sql)
            .bind(address.as_str())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(row_to_launch).transpose()
    }

    async fn find_launch_by_tx_hash(&mut self, hash: &TxHash) -> Result<Option<TokenLaunchRecord>> {
        let sql = format!(
            "SELECT {LAUNCH_COLUMNS} FROM token_launches WHERE transaction_hash = $1 FOR UPDATE"
        );
        let row = sqlx::query(&sql)
            .bind(hash.as_str())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(row_to_launch).transpose()
    }

    async fn find_transaction(
        &mut self,
        transfer_id: &TransferId,
    ) -> Result<Option<TokenTransactionRecord>> {
        let sql =
            format!("SELECT {TRANSACTION_COLUMNS} FROM token_transactions WHERE transfer_id = $1");
        let row = sqlx::query(&sql)
            .bind(transfer_id.as_str())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(row_to_transaction).transpose()
    }

    async fn insert_launch(&mut self, record: &TokenLaunchRecord) -> Result<()> {
        // ON CONFLICT keeps the transaction usable; a raw unique violation
        // would abort it.
        let result = sqlx::query(
            r#"
            INSERT INTO token_launches (
                transaction_hash, memecoin_address, owner_address, quote_token,
                total_supply, is_liquidity_added, created_at_block, liquidity_added_at_block
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(record.transaction_hash.as_str())
        .bind(record.memecoin_address.as_str())
        .bind(&record.owner_address)
        .bind(&record.quote_token)
        .bind(&record.total_supply)
        .bind(record.is_liquidity_added)
        .bind(to_i64(record.created_at_block, "created_at_block")?)
        .bind(
            record
                .liquidity_added_at_block
                .map(|b| to_i64(b, "liquidity_added_at_block"))
                .transpose()?,
        )
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::UniqueViolation {
                entity: "token_launches",
                key: record.transaction_hash.to_string(),
            });
        }
        Ok(())
    }

    async fn insert_transaction(&mut self, record: &TokenTransactionRecord) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO token_transactions (
                transfer_id, memecoin_address, kind, owner_address, amount,
                quote_amount, created_at_block
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (transfer_id) DO NOTHING
            "#,
        )
        .bind(record.transfer_id.as_str())
        .bind(record.memecoin_address.as_str())
        .bind(record.kind.as_str())
        .bind(&record.owner_address)
        .bind(&record.amount)
        .bind(&record.quote_amount)
        .bind(to_i64(record.created_at_block, "created_at_block")?)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::UniqueViolation {
                entity: "token_transactions.transfer_id",
                key: record.transfer_id.to_string(),
            });
        }
        Ok(())
    }

    async fn patch_launch(&mut self, hash: &TxHash, patch: &LaunchPatch) -> Result<bool> {
        let result = match patch {
            LaunchPatch::LiquidityAdded { at_block } => {
                sqlx::query(
                    r#"
                    UPDATE token_launches
                    SET is_liquidity_added = TRUE,
                        liquidity_added_at_block = COALESCE(liquidity_added_at_block, $2),
                        updated_at = now()
                    WHERE transaction_hash = $1
                    "#,
                )
                .bind(hash.as_str())
                .bind(to_i64(*at_block, "liquidity_added_at_block")?)
                .execute(&mut *self.tx)
                .await?
            }
        };
        Ok(result.rows_affected() > 0)
    }

    async fn write_cursor(&mut self, cursor: &Cursor) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO ingestion_cursors (
                source_id, last_applied_block, last_applied_tx_index,
                last_applied_event_index, updated_at
            )
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (source_id) DO UPDATE SET
                last_applied_block = EXCLUDED.last_applied_block,
                last_applied_tx_index = EXCLUDED.last_applied_tx_index,
                last_applied_event_index = EXCLUDED.last_applied_event_index,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(cursor.source_id.as_str())
        .bind(to_i64(cursor.position.block, "last_applied_block")?)
        .bind(i64::from(cursor.position.tx_index))
        .bind(i64::from(cursor.position.event_index))
        .bind(cursor.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn append_dead_letter(&mut self, entry: &DeadLetterEntry) -> Result<()> {
        let reason = serde_json::to_value(&entry.reason)?;
        let ordering = entry.ordering;
        sqlx::query(
            r#"
            INSERT INTO dead_letters (
                id, source_id, transfer_id, source_block, source_tx_index,
                source_event_index, reason, envelope, recorded_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(entry.id.as_uuid())
        .bind(entry.source_id.as_ref().map(|s| s.as_str()))
        .bind(entry.transfer_id.as_ref().map(|t| t.as_str()))
        .bind(
            ordering
                .map(|k| to_i64(k.block, "source_block"))
                .transpose()?,
        )
        .bind(ordering.map(|k| i64::from(k.tx_index)))
        .bind(ordering.map(|k| i64::from(k.event_index)))
        .bind(reason)
        .bind(&entry.envelope)
        .bind(entry.recorded_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
