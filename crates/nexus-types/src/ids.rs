//! Type-safe identifier wrappers.
//!
//! Records that are only ever appended to a history (events, reasoning
//! entries) use UUID v7 (time-ordered). World entities (buildings,
//! vehicles, emergencies, plans) use sequential numeric ids so that a
//! seeded run assigns the same ids every time and so that "ascending id"
//! is a meaningful, stable tie-break for the engines.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// Generates a newtype wrapper around [`Uuid`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new identifier using UUID v7 (time-ordered).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Return the inner [`Uuid`] value.
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

/// Generates a sequential numeric identifier with a display prefix.
macro_rules! define_seq_id {
    (
        $(#[$meta:meta])*
        $name:ident, $prefix:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub u32);

        impl $name {
            /// Return the raw numeric value.
            pub const fn value(self) -> u32 {
                self.0
            }

            /// The id that follows this one, or `None` on overflow.
            pub const fn next(self) -> Option<Self> {
                match self.0.checked_add(1) {
                    Some(v) => Some(Self(v)),
                    None => None,
                }
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}-{}", $prefix, self.0)
            }
        }

        impl From<u32> for $name {
            fn from(id: u32) -> Self {
                Self(id)
            }
        }
    };
}

define_id! {
    /// Unique identifier for an event in the event history.
    EventId
}

define_id! {
    /// Unique identifier for a reasoning log entry.
    ReasoningId
}

define_seq_id! {
    /// Identifier for a building on the grid.
    BuildingId, "B"
}

define_seq_id! {
    /// Identifier for a vehicle in the fleet.
    VehicleId, "V"
}

define_seq_id! {
    /// Identifier for a reported emergency.
    EmergencyId, "E"
}

define_seq_id! {
    /// Identifier for a response plan.
    PlanId, "P"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_ids_are_distinct() {
        let a = EventId::new();
        let b = EventId::new();
        assert_ne!(a, b);
        assert_ne!(a.into_inner(), Uuid::nil());
    }

    #[test]
    fn sequential_ids_display_with_prefix() {
        assert_eq!(VehicleId(3).to_string(), "V-3");
        assert_eq!(BuildingId(12).to_string(), "B-12");
        assert_eq!(EmergencyId(0).to_string(), "E-0");
    }

    #[test]
    fn sequential_id_next_and_overflow() {
        assert_eq!(PlanId(1).next(), Some(PlanId(2)));
        assert_eq!(PlanId(u32::MAX).next(), None);
    }

    #[test]
    fn sequential_ids_serialize_as_numbers() {
        let json = serde_json::to_string(&VehicleId(7)).ok();
        assert_eq!(json.as_deref(), Some("7"));
    }
}
