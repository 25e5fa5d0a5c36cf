//! Type-safe identifier wrappers.
//!
//! Subscriber identifiers are allocated from a process-wide monotonic
//! counter by the broadcaster, so they are plain `u64` values rather than
//! UUIDs. The newtype keeps them from being confused with tick counters or
//! replay indices.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Generates a newtype wrapper around `u64` with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub u64);

        impl $name {
            /// Return the inner numeric value.
            pub const fn into_inner(self) -> u64 {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id! {
    /// Unique identifier for a registered stream subscriber.
    SubscriberId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_serializes_as_bare_number() {
        let json = serde_json::to_string(&SubscriberId(7)).ok();
        assert_eq!(json.as_deref(), Some("7"));
    }

    #[test]
    fn id_display_matches_inner() {
        let id = SubscriberId::from(42);
        assert_eq!(id.to_string(), "42");
        assert_eq!(u64::from(id), 42);
    }
}
