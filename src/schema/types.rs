//! Enumerated field types.
//!
//! Each enum is an `i32` on the wire. Values this reader does not know, and
//! the null value, decode as `NullValue`.

use super::codec::NULL_I32;

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident { $($(#[$vmeta:meta])* $variant:ident = $value:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($(#[$vmeta])* $variant,)+
            /// Null or unknown value.
            NullValue,
        }

        impl $name {
            /// Wire value.
            pub fn value(self) -> i32 {
                match self {
                    $($name::$variant => $value,)+
                    $name::NullValue => NULL_I32,
                }
            }

            /// Decode a wire value.
            pub fn from_value(value: i32) -> Self {
                match value {
                    $($value => $name::$variant,)+
                    _ => $name::NullValue,
                }
            }
        }
    };
}

wire_enum! {
    /// Position of a marker within a snapshot.
    pub enum SnapshotMark {
        Begin = 0,
        Section = 1,
        End = 2,
    }
}

wire_enum! {
    /// Unit of the cluster clock the snapshot was taken with.
    pub enum ClusterTimeUnit {
        Millis = 0,
        Micros = 1,
        Nanos = 2,
    }
}

wire_enum! {
    /// Why a cluster session was closed.
    pub enum CloseReason {
        ClientAction = 0,
        ServiceAction = 1,
        Timeout = 2,
    }
}

impl ClusterTimeUnit {
    /// Nanoseconds per tick, `None` for the null value.
    pub fn nanos_per_tick(self) -> Option<i64> {
        match self {
            ClusterTimeUnit::Millis => Some(1_000_000),
            ClusterTimeUnit::Micros => Some(1_000),
            ClusterTimeUnit::Nanos => Some(1),
            ClusterTimeUnit::NullValue => None,
        }
    }
}
