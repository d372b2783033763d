use serde::{Deserialize, Serialize};

use crate::{EventPayload, MalformedEvent, MalformedReason, MemecoinAddress, TransferId};

/// The kind of an on-chain event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    LaunchCreated,
    LiquidityAdded,
    Transfer,
}

impl EventKind {
    /// Returns the kind name as it appears on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::LaunchCreated => "LaunchCreated",
            EventKind::LiquidityAdded => "LiquidityAdded",
            EventKind::Transfer => "Transfer",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventKind {
    type Err = MalformedReason;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LaunchCreated" => Ok(EventKind::LaunchCreated),
            "LiquidityAdded" => Ok(EventKind::LiquidityAdded),
            "Transfer" => Ok(EventKind::Transfer),
            other => Err(MalformedReason::UnknownKind(other.to_string())),
        }
    }
}

/// Position of an event within its source stream.
///
/// Compares lexicographically by block, then transaction index, then event
/// index. Keys must strictly increase within one source.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct OrderingKey {
    pub block: u64,
    pub tx_index: u32,
    pub event_index: u32,
}

impl OrderingKey {
    pub fn new(block: u64, tx_index: u32, event_index: u32) -> Self {
        Self {
            block,
            tx_index,
            event_index,
        }
    }

    /// The key just before the first event of `block`.
    ///
    /// Used to seed a cursor from a configured starting block: every event in
    /// `block` or later compares greater.
    pub fn before_block(block: u64) -> Option<Self> {
        block.checked_sub(1).map(|prev| Self {
            block: prev,
            tx_index: u32::MAX,
            event_index: u32::MAX,
        })
    }
}

impl std::fmt::Display for OrderingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.block, self.tx_index, self.event_index)
    }
}

/// One validated on-chain event plus its identity and ordering metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventEnvelope {
    transfer_id: TransferId,
    ordering: OrderingKey,
    payload: EventPayload,
}

impl EventEnvelope {
    /// Creates a new envelope builder.
    pub fn builder() -> EventEnvelopeBuilder {
        EventEnvelopeBuilder::default()
    }

    /// Validates the parts and assembles an envelope.
    pub fn new(
        transfer_id: TransferId,
        ordering: OrderingKey,
        payload: EventPayload,
    ) -> Result<Self, MalformedEvent> {
        if transfer_id.is_blank() {
            return Err(MalformedEvent::new(
                Some(transfer_id),
                MalformedReason::EmptyTransferId,
            ));
        }
        if let Err(detail) = payload.validate() {
            return Err(MalformedEvent::payload(&transfer_id, payload.kind(), detail));
        }
        Ok(Self {
            transfer_id,
            ordering,
            payload,
        })
    }

    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }

    pub fn transfer_id(&self) -> &TransferId {
        &self.transfer_id
    }

    pub fn ordering_key(&self) -> OrderingKey {
        self.ordering
    }

    pub fn source_block(&self) -> u64 {
        self.ordering.block
    }

    pub fn source_tx_index(&self) -> u32 {
        self.ordering.tx_index
    }

    pub fn source_event_index(&self) -> u32 {
        self.ordering.event_index
    }

    pub fn payload(&self) -> &EventPayload {
        &self.payload
    }

    pub fn memecoin_address(&self) -> &MemecoinAddress {
        self.payload.memecoin_address()
    }
}

/// Builder for constructing event envelopes.
#[derive(Debug, Default)]
pub struct EventEnvelopeBuilder {
    transfer_id: Option<TransferId>,
    ordering: OrderingKey,
    payload: Option<EventPayload>,
}

impl EventEnvelopeBuilder {
    /// Sets the idempotency key.
    pub fn transfer_id(mut self, id: impl Into<TransferId>) -> Self {
        self.transfer_id = Some(id.into());
        self
    }

    /// Sets the source block number.
    pub fn block(mut self, block: u64) -> Self {
        self.ordering.block = block;
        self
    }

    /// Sets the transaction index within the block.
    pub fn tx_index(mut self, tx_index: u32) -> Self {
        self.ordering.tx_index = tx_index;
        self
    }

    /// Sets the event index within the transaction.
    pub fn event_index(mut self, event_index: u32) -> Self {
        self.ordering.event_index = event_index;
        self
    }

    /// Sets the full ordering key at once.
    pub fn at(mut self, ordering: OrderingKey) -> Self {
        self.ordering = ordering;
        self
    }

    /// Sets the payload.
    pub fn payload(mut self, payload: EventPayload) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Validates and builds the envelope.
    pub fn build(self) -> Result<EventEnvelope, MalformedEvent> {
        let transfer_id = self.transfer_id.ok_or_else(|| {
            MalformedEvent::new(None, MalformedReason::MissingField("transfer_id"))
        })?;
        let payload = self.payload.ok_or_else(|| {
            MalformedEvent::new(
                Some(transfer_id.clone()),
                MalformedReason::MissingField("payload"),
            )
        })?;
        EventEnvelope::new(transfer_id, self.ordering, payload)
    }
}
