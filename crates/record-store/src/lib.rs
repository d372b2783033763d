pub mod dead_letter;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod record;
pub mod store;

pub use common::{MemecoinAddress, SourceId, TransferId, TxHash};
pub use dead_letter::{DeadLetterEntry, DeadLetterId, DeadLetterReason};
pub use error::{Result, StoreError};
pub use events::OrderingKey;
pub use memory::InMemoryRecordStore;
pub use postgres::PostgresRecordStore;
pub use query::LaunchQuery;
pub use record::{Cursor, LaunchPatch, TokenLaunchRecord, TokenTransactionRecord, TransactionKind};
pub use store::{RecordReader, RecordStore, UnitOfWork};
