use opentelemetry::trace::Event;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use super::micros;

/// An event that explains latency, with the time it happened.
#[derive(TypedBuilder, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    /// When the event happened.
    #[serde(with = "micros::timestamp")]
    pub timestamp: SystemTime,
    /// Usually a short tag indicating an event.
    #[builder(setter(into))]
    pub value: String,
}

/// Converts `Event` into an `Annotation`
impl From<Event> for Annotation {
    fn from(event: Event) -> Annotation {
        Annotation::builder()
            .timestamp(event.timestamp)
            .value(event.name.into_owned())
            .build()
    }
}
