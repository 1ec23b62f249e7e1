use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Error returned when a trace or span identifier cannot be parsed.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ParseIdError {
    /// The identifier was empty.
    #[error("identifier is empty")]
    Empty,

    /// The identifier has more hex digits than fit in the id.
    #[error("identifier has {len} hex digits, at most {max} allowed")]
    TooLong {
        /// Number of digits found.
        len: usize,
        /// Number of digits allowed.
        max: usize,
    },

    /// The identifier contains a non hex digit.
    #[error("identifier {0:?} is not valid hex")]
    InvalidHex(String),
}

/// A 128-bit Zipkin trace id, kept as the high and low 64-bit halves.
///
/// Ids whose high half is zero are rendered with 16 hex digits, all others
/// with 32, which is how Zipkin itself tells 64 and 128-bit ids apart.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TraceId {
    /// Upper 64 bits, zero for 64-bit ids.
    pub high: u64,
    /// Lower 64 bits.
    pub low: u64,
}

impl TraceId {
    /// Creates a trace id from its two halves.
    pub const fn new(high: u64, low: u64) -> Self {
        TraceId { high, low }
    }

    /// Creates a trace id from a single 128-bit value.
    pub const fn from_u128(value: u128) -> Self {
        TraceId {
            high: (value >> 64) as u64,
            low: value as u64,
        }
    }

    /// Returns the id as a single 128-bit value.
    pub const fn to_u128(self) -> u128 {
        ((self.high as u128) << 64) | self.low as u128
    }

    /// Generates a random 128-bit trace id.
    pub fn random() -> Self {
        use rand::Rng;

        let mut rng = rand::rng();
        TraceId {
            high: rng.random(),
            low: rng.random(),
        }
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.high == 0 {
            write!(f, "{:016x}", self.low)
        } else {
            write!(f, "{:016x}{:016x}", self.high, self.low)
        }
    }
}

impl FromStr for TraceId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !s.is_ascii() {
            return Err(ParseIdError::InvalidHex(s.to_string()));
        }
        match s.len() {
            0 => Err(ParseIdError::Empty),
            len if len > 32 => Err(ParseIdError::TooLong { len, max: 32 }),
            len if len > 16 => {
                let (high, low) = s.split_at(len - 16);
                Ok(TraceId {
                    high: parse_hex(high)?,
                    low: parse_hex(low)?,
                })
            }
            _ => Ok(TraceId {
                high: 0,
                low: parse_hex(s)?,
            }),
        }
    }
}

impl Serialize for TraceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TraceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// A 64-bit Zipkin span id.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpanId(pub u64);

impl SpanId {
    /// Returns the id as a `u64`.
    pub const fn to_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for SpanId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.len() {
            0 => Err(ParseIdError::Empty),
            len if len > 16 => Err(ParseIdError::TooLong { len, max: 16 }),
            _ => parse_hex(s).map(SpanId),
        }
    }
}

impl Serialize for SpanId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SpanId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// Deserializes a parent id, where an empty string or `null` means the span
/// is a root.
pub(crate) fn deserialize_parent<'de, D>(deserializer: D) -> Result<Option<SpanId>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(s) if s.is_empty() => Ok(None),
        Some(s) => s.parse().map(Some).map_err(de::Error::custom),
    }
}

fn parse_hex(s: &str) -> Result<u64, ParseIdError> {
    // from_str_radix accepts a leading '+', zipkin ids never carry one
    if !s.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ParseIdError::InvalidHex(s.to_string()));
    }
    u64::from_str_radix(s, 16).map_err(|_| ParseIdError::InvalidHex(s.to_string()))
}
