//! Wire shape of an envelope as delivered by a feed.

use serde::{Deserialize, Serialize};

use crate::{
    EventEnvelope, EventKind, EventPayload, MalformedEvent, MalformedReason, OrderingKey,
    TransferId,
};

/// An envelope as it arrives from the transport, before validation.
///
/// Ordering metadata is typed so that ordering can be enforced even for
/// events whose kind or payload turns out to be malformed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEnvelope {
    pub event_kind: String,
    pub source_block: u64,
    pub source_tx_index: u32,
    pub source_event_index: u32,
    #[serde(default)]
    pub transfer_id: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl RawEnvelope {
    pub fn ordering_key(&self) -> OrderingKey {
        OrderingKey::new(
            self.source_block,
            self.source_tx_index,
            self.source_event_index,
        )
    }

    /// Returns the transfer ID if one is present.
    pub fn transfer_id(&self) -> Option<TransferId> {
        let id = TransferId::new(self.transfer_id.clone());
        (!id.is_blank()).then_some(id)
    }

    /// Validates the raw fields and decodes the kind-specific payload.
    pub fn decode(&self) -> Result<EventEnvelope, MalformedEvent> {
        let transfer_id = TransferId::new(self.transfer_id.clone());
        if transfer_id.is_blank() {
            return Err(MalformedEvent::new(None, MalformedReason::EmptyTransferId));
        }

        let kind: EventKind = self
            .event_kind
            .parse()
            .map_err(|reason| MalformedEvent::new(Some(transfer_id.clone()), reason))?;

        let payload = EventPayload::from_json(kind, self.payload.clone())
            .map_err(|e| MalformedEvent::payload(&transfer_id, kind, e.to_string()))?;

        EventEnvelope::new(transfer_id, self.ordering_key(), payload)
    }
}

impl TryFrom<RawEnvelope> for EventEnvelope {
    type Error = MalformedEvent;

    fn try_from(raw: RawEnvelope) -> Result<Self, Self::Error> {
        raw.decode()
    }
}

impl EventEnvelope {
    /// Converts back to the wire shape, e.g. for dead-letter records.
    pub fn to_raw(&self) -> Result<RawEnvelope, serde_json::Error> {
        let key = self.ordering_key();
        Ok(RawEnvelope {
            event_kind: self.kind().as_str().to_string(),
            source_block: key.block,
            source_tx_index: key.tx_index,
            source_event_index: key.event_index,
            transfer_id: self.transfer_id().to_string(),
            payload: self.payload().to_json()?,
        })
    }
}
