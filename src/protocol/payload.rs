//! Resolved values and their wire serialization
//!
//! Resolvers hand back a [`Payload`]: a scalar, an ordered sequence or an
//! ordered mapping. [`payload_as_string`] turns any of them into the text that
//! goes on the wire.

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::collections::VecDeque;
use std::io;

/// Single value produced by a resolver
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    /// Named value of a typed enumeration, published as its ordinal
    Enumerated { label: String, ordinal: i64 },
}

/// Value produced by a resolver for one task
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Scalar(Scalar),
    Sequence(Vec<Payload>),
    /// Key/value pairs in insertion order
    Mapping(Vec<(String, Payload)>),
}

impl Payload {
    pub fn text<S: Into<String>>(value: S) -> Self {
        Payload::Scalar(Scalar::Text(value.into()))
    }

    pub fn integer(value: i64) -> Self {
        Payload::Scalar(Scalar::Integer(value))
    }

    pub fn float(value: f64) -> Self {
        Payload::Scalar(Scalar::Float(value))
    }

    pub fn boolean(value: bool) -> Self {
        Payload::Scalar(Scalar::Bool(value))
    }

    pub fn enumerated<S: Into<String>>(label: S, ordinal: i64) -> Self {
        Payload::Scalar(Scalar::Enumerated {
            label: label.into(),
            ordinal,
        })
    }

    /// Build a mapping, keeping the order of `entries`
    pub fn mapping<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Payload)>,
    {
        Payload::Mapping(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// True for sequences and mappings, which need a wildcard topic
    pub fn is_multi_valued(&self) -> bool {
        matches!(self, Payload::Sequence(_) | Payload::Mapping(_))
    }
}

impl Serialize for Scalar {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Scalar::Text(value) => serializer.serialize_str(value),
            Scalar::Integer(value) => serializer.serialize_i64(*value),
            Scalar::Float(value) => serializer.serialize_f64(*value),
            Scalar::Bool(value) => serializer.serialize_bool(*value),
            Scalar::Enumerated { ordinal, .. } => serializer.serialize_i64(*ordinal),
        }
    }
}

impl Serialize for Payload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Payload::Scalar(scalar) => scalar.serialize(serializer),
            Payload::Sequence(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Payload::Mapping(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}

/// JSON formatter matching the encoding subscribers already parse.
///
/// Writes `", "` between elements and `": "` after keys, escapes every
/// non-ASCII character as `\uXXXX`, and writes non-finite floats as `NaN`,
/// `Infinity` and `-Infinity`.
struct SpacedFormatter {
    /// Non-finite floats of the payload in traversal order
    non_finite: VecDeque<f64>,
}

impl serde_json::ser::Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }

    fn write_f64<W>(&mut self, writer: &mut W, value: f64) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(float_repr(value).as_bytes())
    }

    // A payload holds no nulls: serde_json writes null only for non-finite floats
    fn write_null<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let token = match self.non_finite.pop_front() {
            Some(value) if value.is_nan() => "NaN",
            Some(value) if value > 0.0 => "Infinity",
            Some(_) => "-Infinity",
            None => "null",
        };
        writer.write_all(token.as_bytes())
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if fragment.bytes().all(is_plain_ascii) {
            return writer.write_all(fragment.as_bytes());
        }

        let mut units = [0u16; 2];
        for ch in fragment.chars() {
            if ch.is_ascii() && is_plain_ascii(ch as u8) {
                writer.write_all(&[ch as u8])?;
            } else {
                for unit in ch.encode_utf16(&mut units) {
                    write!(writer, "\\u{unit:04x}")?;
                }
            }
        }
        Ok(())
    }
}

fn is_plain_ascii(byte: u8) -> bool {
    byte.is_ascii() && byte != 0x7f
}

fn collect_non_finite(payload: &Payload, out: &mut VecDeque<f64>) {
    match payload {
        Payload::Scalar(Scalar::Float(value)) if !value.is_finite() => out.push_back(*value),
        Payload::Scalar(_) => {}
        Payload::Sequence(items) => items.iter().for_each(|item| collect_non_finite(item, out)),
        Payload::Mapping(entries) => entries
            .iter()
            .for_each(|(_, value)| collect_non_finite(value, out)),
    }
}

/// Encode a payload as JSON
pub fn to_json(payload: &Payload) -> Result<String, serde_json::Error> {
    let mut non_finite = VecDeque::new();
    collect_non_finite(payload, &mut non_finite);

    let mut buffer = Vec::with_capacity(64);
    let formatter = SpacedFormatter { non_finite };
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    payload.serialize(&mut serializer)?;
    // Every non-ASCII character was escaped
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// Natural text form of a scalar
pub fn scalar_as_string(scalar: &Scalar) -> String {
    match scalar {
        Scalar::Text(value) => value.clone(),
        Scalar::Integer(value) => value.to_string(),
        Scalar::Float(value) => float_as_string(*value),
        Scalar::Bool(true) => "True".to_string(),
        Scalar::Bool(false) => "False".to_string(),
        Scalar::Enumerated { ordinal, .. } => ordinal.to_string(),
    }
}

fn float_as_string(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else if value.is_infinite() {
        let token = if value > 0.0 { "inf" } else { "-inf" };
        token.to_string()
    } else {
        float_repr(value)
    }
}

/// Shortest round-trip digits of a finite float.
///
/// Positional with at least one fractional digit for decimal exponents in
/// `-4..16`, otherwise scientific with a signed two-digit exponent
/// (`1e+16`, `1.5e-05`).
fn float_repr(value: f64) -> String {
    let scientific = format!("{value:e}");
    let (mantissa, exponent) = scientific
        .split_once('e')
        .unwrap_or((scientific.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if (-4..16).contains(&exponent) {
        let positional = value.to_string();
        if positional.contains('.') {
            positional
        } else {
            format!("{positional}.0")
        }
    } else {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", exponent.abs())
    }
}

/// Serialize a payload into the text published on the wire.
///
/// Mappings and multi-element sequences become JSON; a single-element sequence
/// is published as its only element.
pub fn payload_as_string(payload: &Payload) -> Result<String, serde_json::Error> {
    match payload {
        Payload::Mapping(_) => to_json(payload),
        Payload::Sequence(items) if items.len() == 1 => payload_as_string(&items[0]),
        Payload::Sequence(_) => to_json(payload),
        Payload::Scalar(scalar) => Ok(scalar_as_string(scalar)),
    }
}
