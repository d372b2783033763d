use serde::{Deserialize, Serialize};

/// Declares a string-backed identifier newtype.
///
/// Each identifier wraps the raw on-chain string so that a transfer ID can
/// never be passed where a memecoin address is expected.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates an identifier from a raw string.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns true if the identifier is empty or whitespace only.
            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }

            /// Consumes the identifier, returning the inner string.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Idempotency key of an on-chain event, unique per emitting transaction and log index.
    TransferId
);

string_id!(
    /// Contract address of a launched memecoin. Stable identity of a token.
    MemecoinAddress
);

string_id!(
    /// Hash of the transaction that emitted a launch.
    TxHash
);

string_id!(
    /// Name of an inbound event source (one ordered stream of envelopes).
    SourceId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_compare_by_value() {
        let a = MemecoinAddress::new("0xabc");
        let b = MemecoinAddress::from("0xabc");
        assert_eq!(a, b);
        assert_ne!(a, MemecoinAddress::new("0xabd"));
    }

    #[test]
    fn blank_detection() {
        assert!(TransferId::new("").is_blank());
        assert!(TransferId::new("   ").is_blank());
        assert!(!TransferId::new("0x1_0").is_blank());
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = TxHash::new("0xdeadbeef");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"0xdeadbeef\"");
        let back: TxHash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn display_matches_inner_value() {
        let source = SourceId::new("launchpad-sepolia");
        assert_eq!(source.to_string(), "launchpad-sepolia");
        assert_eq!(source.into_inner(), "launchpad-sepolia");
    }
}
