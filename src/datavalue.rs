//! Polymorphic Wikibase data values and their JSON codecs.
//!
//! Values arrive as `{"type": ..., "value": ...}` objects; a non-empty
//! `error` field marks a value the dump itself could not render, and a time
//! string the parser cannot handle is downgraded to the same error form
//! instead of failing the whole entity.

use std::fmt;
use std::str::FromStr;

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{pow, Signed, Zero};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::{Error, Result};
use crate::text::{de_nfc, nfc};

/// Referenced entity kind inside a `wikibase-entityid` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WikiBaseEntityType {
    Item,
    Property,
    Lexeme,
    Form,
    Sense,
}

/// Coarse granularity of a [`TimeValue`], from a billion years down to a
/// second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TimePrecision {
    BillionYears,
    HundredMillionYears,
    TenMillionYears,
    MillionYears,
    HundredMillennia,
    TenMillennia,
    Millennium,
    Century,
    Decade,
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
}

impl TimePrecision {
    pub fn from_ordinal(ordinal: u8) -> Option<Self> {
        use TimePrecision::*;
        Some(match ordinal {
            0 => BillionYears,
            1 => HundredMillionYears,
            2 => TenMillionYears,
            3 => MillionYears,
            4 => HundredMillennia,
            5 => TenMillennia,
            6 => Millennium,
            7 => Century,
            8 => Decade,
            9 => Year,
            10 => Month,
            11 => Day,
            12 => Hour,
            13 => Minute,
            14 => Second,
            _ => return None,
        })
    }
}

impl Serialize for TimePrecision {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

impl<'de> Deserialize<'de> for TimePrecision {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let ordinal = u8::deserialize(deserializer)?;
        TimePrecision::from_ordinal(ordinal)
            .ok_or_else(|| D::Error::custom(format!("invalid time precision: {ordinal}")))
    }
}

/// Proleptic calendar of a [`TimeValue`], normalized from Wikidata URIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarModel {
    Gregorian,
    Julian,
}

impl CalendarModel {
    /// Accepts the official item URIs plus the plain calendar items that
    /// occur in older dumps, in `https`/`http` and `/wiki/`-`/entity/`
    /// spellings.
    fn from_uri(uri: &str) -> Option<Self> {
        let rest = uri
            .strip_prefix("https://")
            .or_else(|| uri.strip_prefix("http://"))?;
        let qid = rest
            .strip_prefix("www.wikidata.org/wiki/")
            .or_else(|| rest.strip_prefix("www.wikidata.org/entity/"))?;
        match qid {
            "Q1985727" | "Q12138" => Some(CalendarModel::Gregorian),
            "Q1985786" | "Q11184" => Some(CalendarModel::Julian),
            _ => None,
        }
    }

    fn canonical_uri(self) -> &'static str {
        match self {
            CalendarModel::Gregorian => "https://www.wikidata.org/wiki/Q1985727",
            CalendarModel::Julian => "https://www.wikidata.org/wiki/Q1985786",
        }
    }
}

impl Serialize for CalendarModel {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.canonical_uri())
    }
}

impl<'de> Deserialize<'de> for CalendarModel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let uri = String::deserialize(deserializer)?;
        CalendarModel::from_uri(&uri)
            .ok_or_else(|| D::Error::custom(format!("unknown calendar model: {uri}")))
    }
}

/// Arbitrary-precision rational amount of a [`QuantityValue`].
///
/// The wire form is a signed decimal literal with a mandatory leading sign.
/// Formatting emits the minimal decimal representation that parses back to
/// the same rational.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Amount(BigRational);

impl Amount {
    pub fn as_rational(&self) -> &BigRational {
        &self.0
    }
}

impl From<BigRational> for Amount {
    fn from(value: BigRational) -> Self {
        Amount(value)
    }
}

impl FromStr for Amount {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let error = || Error::InvalidValue(format!("unable to parse amount: {s:?}"));
        let rest = match s.as_bytes().first() {
            Some(b'+') | Some(b'-') => &s[1..],
            _ => return Err(error()),
        };
        let (int_part, frac_part) = rest.split_once('.').unwrap_or((rest, ""));
        let all_digits =
            |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
        if !all_digits(int_part) || (rest.contains('.') && !all_digits(frac_part)) {
            return Err(error());
        }
        let mut numer =
            BigInt::parse_bytes(format!("{int_part}{frac_part}").as_bytes(), 10).ok_or_else(error)?;
        if s.starts_with('-') {
            numer = -numer;
        }
        let denom = pow(BigInt::from(10), frac_part.len());
        Ok(Amount(BigRational::new(numer, denom)))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0.is_negative() { '-' } else { '+' };
        let numer = self.0.numer().abs();
        let denom = self.0.denom();

        // The reduced denominator of a decimal literal is 2^a * 5^b; the
        // minimal exact precision is max(a, b).
        let mut precision = 0usize;
        let (two, five) = (BigInt::from(2), BigInt::from(5));
        let mut twos = denom.clone();
        let mut a = 0usize;
        while !twos.is_zero() && (&twos % &two).is_zero() {
            twos /= &two;
            a += 1;
        }
        let mut fives = denom.clone();
        let mut b = 0usize;
        while !fives.is_zero() && (&fives % &five).is_zero() {
            fives /= &five;
            b += 1;
        }
        precision = precision.max(a).max(b);

        let scaled = numer * pow(BigInt::from(10), precision) / denom;
        let digits = scaled.to_string();
        if precision == 0 {
            return write!(f, "{sign}{digits}");
        }
        let digits = if digits.len() <= precision {
            format!("{}{digits}", "0".repeat(precision - digits.len() + 1))
        } else {
            digits
        };
        let (int_part, frac_part) = digits.split_at(digits.len() - precision);
        write!(f, "{sign}{int_part}.{frac_part}")
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// Calendar date and time of day with astronomical year numbering.
///
/// Wikidata serializes times in historical numbering (no year zero); the
/// shift between the two systems happens only in [`parse_time`] and
/// [`format_time`]. An unknown month or day is stored as `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Time {
    pub year: i64,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

static TIME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([+-]\d{4,})-(\d{2})-(\d{2})T(\d{2}):(\d{2}):(\d{2})Z$").unwrap());

/// Parse a dump time string like `+1994-01-01T00:00:00Z`.
pub(crate) fn parse_time(s: &str) -> Result<Time> {
    let caps = TIME_REGEX
        .captures(s)
        .ok_or_else(|| Error::InvalidValue(format!("unable to parse time {s:?}")))?;
    let field = |i: usize| -> &str { caps.get(i).map_or("", |m| m.as_str()) };

    let mut year: i64 = field(1)
        .parse()
        .map_err(|_| Error::InvalidValue(format!("unable to parse year in time {s:?}")))?;
    if year == 0 {
        // Historical numbering has no year zero.
        return Err(Error::InvalidValue(format!("invalid year 0 in time {s:?}")));
    }
    if year < 0 {
        year += 1;
    }
    let part = |i: usize, what: &str| -> Result<u8> {
        field(i)
            .parse()
            .map_err(|_| Error::InvalidValue(format!("unable to parse {what} in time {s:?}")))
    };
    let month = part(2, "month")?;
    let day = part(3, "day")?;
    Ok(Time {
        year,
        month: if month == 0 { 1 } else { month },
        day: if day == 0 { 1 } else { day },
        hour: part(4, "hour")?,
        minute: part(5, "minute")?,
        second: part(6, "second")?,
    })
}

/// Format a [`Time`] back into the dump representation. The month and day
/// are rendered as `00` when the precision does not reach them.
pub(crate) fn format_time(time: &Time, precision: TimePrecision) -> String {
    let mut year = time.year;
    if year <= 0 {
        year -= 1;
    }
    let sign = if year < 0 { '-' } else { '+' };
    let month = if precision >= TimePrecision::Month {
        time.month
    } else {
        0
    };
    let day = if precision >= TimePrecision::Day {
        time.day
    } else {
        0
    };
    format!(
        "{sign}{:04}-{month:02}-{day:02}T{:02}:{:02}:{:02}Z",
        year.unsigned_abs(),
        time.hour,
        time.minute,
        time.second
    )
}

// --- value kinds ----------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WikiBaseEntityIdValue {
    pub entity_type: WikiBaseEntityType,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GlobeCoordinateValue {
    pub latitude: f64,
    pub longitude: f64,
    pub precision: f64,
    pub globe: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MonolingualTextValue {
    pub language: String,
    #[serde(deserialize_with = "de_nfc")]
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantityValue {
    pub amount: Amount,
    pub upper_bound: Option<Amount>,
    pub lower_bound: Option<Amount>,
    pub unit: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeValue {
    pub time: Time,
    pub precision: TimePrecision,
    pub calendar: CalendarModel,
}

/// One Wikibase data value, dispatched on the dump's `type` tag.
#[derive(Debug, Clone, PartialEq)]
pub enum DataValue {
    String(String),
    WikiBaseEntityId(WikiBaseEntityIdValue),
    GlobeCoordinate(GlobeCoordinateValue),
    MonolingualText(MonolingualTextValue),
    Quantity(QuantityValue),
    Time(TimeValue),
    /// Value the dump marked as erroneous, or a time value this library
    /// could not parse.
    Error(String),
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDataValue {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    value: serde_json::Value,
    #[serde(default)]
    error: String,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct EntityIdPayload {
    #[serde(rename = "entity-type")]
    entity_type: WikiBaseEntityType,
    id: String,
    // Not available for all entity types and not recommended; accepted on
    // input, never written back.
    #[serde(rename = "numeric-id", default, skip_serializing)]
    _numeric_id: Option<i64>,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct GlobeCoordinatePayload {
    latitude: f64,
    longitude: f64,
    // Deprecated and no longer used; accepted on input only.
    #[serde(rename = "altitude", default, skip_serializing)]
    _altitude: Option<f64>,
    precision: f64,
    globe: String,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct QuantityPayload {
    amount: Amount,
    #[serde(rename = "upperBound", default, skip_serializing_if = "Option::is_none")]
    upper_bound: Option<Amount>,
    #[serde(rename = "lowerBound", default, skip_serializing_if = "Option::is_none")]
    lower_bound: Option<Amount>,
    unit: String,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct TimePayload {
    time: String,
    precision: TimePrecision,
    #[serde(rename = "calendarmodel")]
    calendar: CalendarModel,
    // Declared unused by Wikibase but still present in dumps; accepted on
    // input only.
    #[serde(rename = "timezone", default, skip_serializing)]
    _timezone: Option<i64>,
    #[serde(rename = "before", default, skip_serializing)]
    _before: Option<i64>,
    #[serde(rename = "after", default, skip_serializing)]
    _after: Option<i64>,
}

#[derive(Serialize)]
struct TaggedValue<V> {
    #[serde(rename = "type")]
    kind: &'static str,
    value: V,
}

#[derive(Serialize)]
struct ErrorPayload<'a> {
    error: &'a str,
}

impl<'de> Deserialize<'de> for DataValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = RawDataValue::deserialize(deserializer)?;
        if !raw.error.is_empty() {
            return Ok(DataValue::Error(raw.error));
        }
        let payload = |what: &str, err: serde_json::Error| {
            D::Error::custom(format!("invalid {what} value: {err}"))
        };
        match raw.kind.as_str() {
            "string" => {
                let value: String =
                    serde_json::from_value(raw.value).map_err(|e| payload("string", e))?;
                Ok(DataValue::String(nfc(value)))
            }
            "wikibase-entityid" => {
                let value: EntityIdPayload =
                    serde_json::from_value(raw.value).map_err(|e| payload("entity id", e))?;
                Ok(DataValue::WikiBaseEntityId(WikiBaseEntityIdValue {
                    entity_type: value.entity_type,
                    id: value.id,
                }))
            }
            "globecoordinate" => {
                let value: GlobeCoordinatePayload =
                    serde_json::from_value(raw.value).map_err(|e| payload("coordinate", e))?;
                Ok(DataValue::GlobeCoordinate(GlobeCoordinateValue {
                    latitude: value.latitude,
                    longitude: value.longitude,
                    precision: value.precision,
                    globe: value.globe,
                }))
            }
            "monolingualtext" => {
                let value: MonolingualTextValue = serde_json::from_value(raw.value)
                    .map_err(|e| payload("monolingual text", e))?;
                Ok(DataValue::MonolingualText(value))
            }
            "quantity" => {
                let value: QuantityPayload =
                    serde_json::from_value(raw.value).map_err(|e| payload("quantity", e))?;
                Ok(DataValue::Quantity(QuantityValue {
                    amount: value.amount,
                    upper_bound: value.upper_bound,
                    lower_bound: value.lower_bound,
                    unit: value.unit,
                }))
            }
            "time" => {
                let value: TimePayload =
                    serde_json::from_value(raw.value).map_err(|e| payload("time", e))?;
                match parse_time(&value.time) {
                    Ok(time) => Ok(DataValue::Time(TimeValue {
                        time,
                        precision: value.precision,
                        calendar: value.calendar,
                    })),
                    // Happens for dates the historical calendar cannot
                    // express; keep the entity decodable.
                    Err(e) => Ok(DataValue::Error(format!("{e}: {}", value.time))),
                }
            }
            other => Err(D::Error::custom(format!(
                "unknown data value type {other:?}"
            ))),
        }
    }
}

impl Serialize for DataValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            DataValue::String(s) => TaggedValue {
                kind: "string",
                value: s,
            }
            .serialize(serializer),
            DataValue::WikiBaseEntityId(v) => TaggedValue {
                kind: "wikibase-entityid",
                value: EntityIdPayload {
                    entity_type: v.entity_type,
                    id: v.id.clone(),
                    _numeric_id: None,
                },
            }
            .serialize(serializer),
            DataValue::GlobeCoordinate(v) => TaggedValue {
                kind: "globecoordinate",
                value: GlobeCoordinatePayload {
                    latitude: v.latitude,
                    longitude: v.longitude,
                    _altitude: None,
                    precision: v.precision,
                    globe: v.globe.clone(),
                },
            }
            .serialize(serializer),
            DataValue::MonolingualText(v) => TaggedValue {
                kind: "monolingualtext",
                value: v,
            }
            .serialize(serializer),
            DataValue::Quantity(v) => TaggedValue {
                kind: "quantity",
                value: QuantityPayload {
                    amount: v.amount.clone(),
                    upper_bound: v.upper_bound.clone(),
                    lower_bound: v.lower_bound.clone(),
                    unit: v.unit.clone(),
                },
            }
            .serialize(serializer),
            DataValue::Time(v) => TaggedValue {
                kind: "time",
                value: TimePayload {
                    time: format_time(&v.time, v.precision),
                    precision: v.precision,
                    calendar: v.calendar,
                    _timezone: None,
                    _before: None,
                    _after: None,
                },
            }
            .serialize(serializer),
            DataValue::Error(e) => ErrorPayload { error: e }.serialize(serializer),
        }
    }
}
