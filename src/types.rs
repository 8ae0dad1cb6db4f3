//! Value objects embedded in ledger records
//!
//! All business quantities are carried as decimal strings so that the stored
//! text round-trips exactly; they are parsed only where a comparison needs it.
use std::cmp::Ordering;

use crate::error::LedgerError;
use chrono::{DateTime, TimeZone, Utc};

#[derive(Debug, Clone, Default, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
#[cbor(map)]
pub struct Price {
    #[n(0)]
    pub amount: String,
    #[n(1)]
    pub currency: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
#[cbor(map)]
pub struct Environment {
    #[n(0)]
    pub temperature: String,
    #[n(1)]
    pub temperature_measurement: String,
    #[n(2)]
    pub humidity: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
#[cbor(map)]
pub struct Brand {
    #[n(0)]
    pub name: String,
    #[n(1)]
    pub logo: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
#[cbor(map)]
pub struct NetContent {
    #[n(0)]
    pub weight: String,
    #[n(1)]
    pub weight_measurement: String,
    #[n(2)]
    pub volume: String,
    #[n(3)]
    pub volume_measurement: String,
    #[n(4)]
    pub units: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
#[cbor(map)]
pub struct Dimension {
    #[n(0)]
    pub width: String,
    #[n(1)]
    pub height: String,
    #[n(2)]
    pub depth: String,
    #[n(3)]
    pub measurement: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
#[cbor(map)]
pub struct Location {
    #[n(0)]
    pub country: String,
    #[n(1)]
    pub province: String,
    #[n(2)]
    pub latitude: String,
    #[n(3)]
    pub longitude: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
#[cbor(map)]
pub struct Capacity {
    #[n(0)]
    pub units: String,
    #[n(1)]
    pub unit_measurement: String,
    #[n(2)]
    pub used: String,
}

/// Destination and expected arrival of a transport that is delivering.
#[derive(Debug, Clone, Default, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
#[cbor(map)]
pub struct Transporting {
    #[n(0)]
    pub destination: Location,
    #[n(1)]
    pub finish_time: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
#[cbor(map)]
pub struct Certification {
    #[n(0)]
    pub issuer: String,
    #[n(1)]
    pub certification_type: String,
    #[n(2)]
    pub result: String,
}

/// Where a lot goes next, who advises it there and in what conditions.
///
/// Shared argument of every lot transition that moves custody.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Relocation {
    pub location_id: String,
    pub new_advisor: String,
    pub environment: Environment,
}

#[derive(Debug, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

// Ordered by instant; the zone type itself carries no order.
impl<T: TimeZone> PartialEq for TimeStamp<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<T: TimeZone> Eq for TimeStamp<T> {}

impl<T: TimeZone> PartialOrd for TimeStamp<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: TimeZone> Ord for TimeStamp<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

/// Parses a unit count stored as a decimal string.
pub fn parse_units(field: &str, value: &str) -> crate::error::Result<u64> {
    value.trim().parse::<u64>().map_err(|_| {
        LedgerError::Validation(format!("{field} must be a whole number, got {value:?}"))
    })
}
