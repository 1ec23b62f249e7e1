//! Zipkin v2 span model shared by the codec, the relay and the reporter.
mod annotation;
mod endpoint;
mod id;
mod span;

pub use annotation::Annotation;
pub use endpoint::Endpoint;
pub use id::{ParseIdError, SpanId, TraceId};
pub use span::{Kind, SpanRecord};

use std::time::{Duration, SystemTime};

/// Converts a `SystemTime` into epoch microseconds, clamping pre-epoch times
/// to zero.
pub(crate) fn to_micros(time: SystemTime) -> u64 {
    time.duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_micros() as u64
}

/// Converts epoch microseconds into a `SystemTime`.
pub(crate) fn from_micros(micros: u64) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_nanos(micros.saturating_mul(1_000))
}

/// Converts a duration into microseconds. Non-zero durations shorter than a
/// microsecond are rounded up so they do not read as absent.
pub(crate) fn duration_to_micros(duration: Duration) -> u64 {
    match duration.as_micros() as u64 {
        0 if !duration.is_zero() => 1,
        micros => micros,
    }
}

/// Serde adapters for the microsecond integers Zipkin JSON uses. Zero stands
/// for "absent" in the optional variants.
pub(crate) mod micros {
    pub(crate) mod timestamp {
        use serde::{Deserialize, Deserializer, Serializer};
        use std::time::SystemTime;

        pub(crate) fn serialize<S: Serializer>(
            time: &SystemTime,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            serializer.serialize_u64(super::super::to_micros(*time))
        }

        pub(crate) fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<SystemTime, D::Error> {
            u64::deserialize(deserializer).map(super::super::from_micros)
        }
    }

    pub(crate) mod option_timestamp {
        use serde::{Deserialize, Deserializer, Serializer};
        use std::time::SystemTime;

        pub(crate) fn serialize<S: Serializer>(
            time: &Option<SystemTime>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            serializer.serialize_u64(time.map(super::super::to_micros).unwrap_or_default())
        }

        pub(crate) fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<SystemTime>, D::Error> {
            Ok(Option::<u64>::deserialize(deserializer)?
                .filter(|micros| *micros != 0)
                .map(super::super::from_micros))
        }
    }

    pub(crate) mod option_duration {
        use serde::{Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        pub(crate) fn serialize<S: Serializer>(
            duration: &Option<Duration>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            serializer.serialize_u64(
                duration
                    .map(super::super::duration_to_micros)
                    .unwrap_or_default(),
            )
        }

        pub(crate) fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Duration>, D::Error> {
            Ok(Option::<u64>::deserialize(deserializer)?
                .filter(|micros| *micros != 0)
                .map(|micros| Duration::from_nanos(micros.saturating_mul(1_000))))
        }
    }
}
