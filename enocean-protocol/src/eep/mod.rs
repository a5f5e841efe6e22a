//! EnOcean Equipment Profile (EEP) codec.
//!
//! A profile maps the payload of a radio telegram to named fields. Each field
//! is a [`BitRange`] plus a rule that turns the raw integer into an
//! engineering value:
//!
//! - affine scaling between a raw range and a value range (raw ranges may be
//!   inverted, e.g. `255..=0` for temperature sensors),
//! - an enum table of labels,
//! - the raw integer itself.
//!
//! Any field may also carry sentinels, raw values with a fixed label that
//! take precedence over the rule above.
//!
//! Profiles with several telegram layouts (VLD actuators) select the layout
//! with a command field. Tables are validated when they are registered, so
//! decoding and encoding never index out of bounds.

mod profiles;
mod setpoint;

pub use profiles::BUILTIN_PROFILES;
pub use setpoint::{SetpointRaw, SetpointScale, DEFAULT_REPORT_RANGE, SEND_RANGE};

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use log::{debug, warn};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::bits::{BitRange, MAX_FIELD_BITS};
use crate::error::ProtocolError;
use crate::packet::RadioPacket;
use crate::types::Rorg;

/// Identifies a profile: `RORG-FUNC-TYPE`, e.g. `A5-02-05`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EepKey {
    pub rorg: Rorg,
    pub func: u8,
    pub type_: u8,
}

impl EepKey {
    pub const fn new(rorg: Rorg, func: u8, type_: u8) -> Self {
        Self { rorg, func, type_ }
    }
}

impl fmt::Display for EepKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02X}-{:02X}", self.rorg, self.func, self.type_)
    }
}

/// Error returned when an EEP string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid EEP: {0}")]
pub struct ParseEepKeyError(pub String);

impl FromStr for EepKey {
    type Err = ParseEepKeyError;

    /// Accepts `A5-02-05`, `a5-02-05` and `A5:02:05`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split(|c| c == '-' || c == ':').collect();
        if parts.len() != 3 {
            return Err(ParseEepKeyError(s.to_string()));
        }

        let mut bytes = [0u8; 3];
        for (slot, part) in bytes.iter_mut().zip(&parts) {
            if part.is_empty() || part.len() > 2 {
                return Err(ParseEepKeyError(s.to_string()));
            }
            *slot = u8::from_str_radix(part, 16).map_err(|_| ParseEepKeyError(s.to_string()))?;
        }

        Ok(EepKey::new(Rorg::from(bytes[0]), bytes[1], bytes[2]))
    }
}

impl Serialize for EepKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EepKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Rule that turns a raw field value into an engineering value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldKind {
    /// Affine scaling of `raw_min..=raw_max` onto `min..=max`.
    Scaled {
        raw_min: u32,
        raw_max: u32,
        min: f64,
        max: f64,
        unit: &'static str,
    },
    /// Lookup table of labels.
    Enum(&'static [(u32, &'static str)]),
    /// Raw integer.
    Raw,
}

/// One named field of a telegram layout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSpec {
    pub shortcut: &'static str,
    pub description: &'static str,
    pub bits: BitRange,
    pub kind: FieldKind,
    /// Raw values with a fixed meaning, checked before `kind`.
    pub sentinels: &'static [(u32, &'static str)],
}

impl FieldSpec {
    fn decode(&self, raw: u32) -> DecodedField {
        let sentinel = self
            .sentinels
            .iter()
            .find(|(value, _)| *value == raw)
            .map(|(_, label)| *label);

        let (value, unit) = match (sentinel, self.kind) {
            (Some(label), _) => (FieldValue::Label(label), None),
            (
                None,
                FieldKind::Scaled {
                    raw_min,
                    raw_max,
                    min,
                    max,
                    unit,
                },
            ) => {
                let scaled = (raw as f64 - raw_min as f64) / (raw_max as f64 - raw_min as f64)
                    * (max - min)
                    + min;
                (FieldValue::Scaled(scaled), Some(unit))
            }
            (None, FieldKind::Enum(items)) => match items.iter().find(|(value, _)| *value == raw) {
                Some((_, label)) => (FieldValue::Label(*label), None),
                None => (FieldValue::Raw(raw), None),
            },
            (None, FieldKind::Raw) => (FieldValue::Raw(raw), None),
        };

        DecodedField {
            raw_value: raw,
            value,
            unit,
            description: self.description,
        }
    }

    /// Map an input to a raw value, clamping to the representable range.
    ///
    /// Returns the raw value and, if clamping happened, the warning.
    fn encode(&self, input: &FieldInput<'_>) -> Result<(u32, Option<ClampWarning>), ProtocolError> {
        let invalid = |reason: String| ProtocolError::InvalidValue {
            field: self.shortcut.to_string(),
            reason,
        };

        match *input {
            FieldInput::Raw(raw) => {
                let max = self.bits.max_value();
                if raw > max {
                    Ok((max, Some(self.clamp_warning(raw as f64, max))))
                } else {
                    Ok((raw, None))
                }
            }
            FieldInput::Label(label) => {
                let from_sentinels = self.sentinels.iter().find(|(_, l)| *l == label);
                let from_enum = match self.kind {
                    FieldKind::Enum(items) => items.iter().find(|(_, l)| *l == label),
                    _ => None,
                };
                from_sentinels
                    .or(from_enum)
                    .map(|(value, _)| (*value, None))
                    .ok_or_else(|| invalid(format!("unknown label '{}'", label)))
            }
            FieldInput::Scaled(value) => {
                if !value.is_finite() {
                    return Err(invalid(format!("{} is not a finite number", value)));
                }
                match self.kind {
                    FieldKind::Scaled {
                        raw_min,
                        raw_max,
                        min,
                        max,
                        ..
                    } => {
                        let raw = (value - min) / (max - min) * (raw_max as f64 - raw_min as f64)
                            + raw_min as f64;
                        let raw = raw.round();
                        let lo = raw_min.min(raw_max);
                        let hi = raw_min.max(raw_max);
                        if raw < lo as f64 {
                            Ok((lo, Some(self.clamp_warning(value, lo))))
                        } else if raw > hi as f64 {
                            Ok((hi, Some(self.clamp_warning(value, hi))))
                        } else {
                            Ok((raw as u32, None))
                        }
                    }
                    FieldKind::Enum(_) => Err(invalid(
                        "enum field takes a label or a raw value".to_string(),
                    )),
                    FieldKind::Raw => {
                        if value.fract() != 0.0 {
                            return Err(invalid(format!("{} is not an integer", value)));
                        }
                        let max = self.bits.max_value();
                        if value < 0.0 {
                            Ok((0, Some(self.clamp_warning(value, 0))))
                        } else if value > max as f64 {
                            Ok((max, Some(self.clamp_warning(value, max))))
                        } else {
                            Ok((value as u32, None))
                        }
                    }
                }
            }
        }
    }

    fn clamp_warning(&self, requested: f64, raw: u32) -> ClampWarning {
        warn!(
            "Value {} for field {} out of range, clamped to raw {}",
            requested, self.shortcut, raw
        );
        ClampWarning {
            field: self.shortcut,
            requested,
            raw,
        }
    }
}

/// One telegram layout of a profile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Layout {
    /// Value of the profile's command field selecting this layout.
    pub command: Option<u32>,
    pub description: &'static str,
    /// Payload length in bytes.
    pub data_len: usize,
    pub fields: &'static [FieldSpec],
}

impl Layout {
    fn field(&self, shortcut: &str) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|f| f.shortcut == shortcut)
    }
}

/// A registered equipment profile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Profile {
    pub key: EepKey,
    pub description: &'static str,
    /// Shortcut of the field that selects the layout, if there are several.
    pub command_field: Option<&'static str>,
    pub layouts: &'static [Layout],
}

impl Profile {
    fn validate(&self) -> Result<(), ProtocolError> {
        let invalid = |reason: String| ProtocolError::InvalidProfile {
            eep: self.key,
            reason,
        };

        if self.layouts.is_empty() {
            return Err(invalid("no layouts".to_string()));
        }

        for (i, layout) in self.layouts.iter().enumerate() {
            if layout.data_len == 0 {
                return Err(invalid("layout with zero data length".to_string()));
            }

            for (j, field) in layout.fields.iter().enumerate() {
                validate_field(field, layout.data_len).map_err(&invalid)?;
                if layout.fields[..j].iter().any(|f| f.shortcut == field.shortcut) {
                    return Err(invalid(format!("duplicate field {}", field.shortcut)));
                }
            }

            match (self.command_field, layout.command) {
                (Some(name), Some(command)) => {
                    let field = layout
                        .field(name)
                        .ok_or_else(|| invalid(format!("layout lacks command field {}", name)))?;
                    if command > field.bits.max_value() {
                        return Err(invalid(format!(
                            "command {} does not fit field {}",
                            command, name
                        )));
                    }
                }
                (Some(_), None) => {
                    return Err(invalid("layout without command value".to_string()));
                }
                (None, Some(_)) => {
                    return Err(invalid("command value without command field".to_string()));
                }
                (None, None) => {}
            }

            let clash = self.layouts[..i].iter().any(|other| {
                other.data_len == layout.data_len
                    && (other.command.is_none() || other.command == layout.command)
            });
            if clash {
                return Err(invalid(format!(
                    "ambiguous layouts for {} bytes",
                    layout.data_len
                )));
            }
        }

        Ok(())
    }

    /// Payload lengths accepted by any layout.
    pub fn data_lengths(&self) -> Vec<usize> {
        let mut lengths: Vec<usize> = self.layouts.iter().map(|l| l.data_len).collect();
        lengths.sort_unstable();
        lengths.dedup();
        lengths
    }

    fn select_layout(&self, payload: &[u8]) -> Result<&'static Layout, ProtocolError> {
        let mut candidates = self
            .layouts
            .iter()
            .filter(|l| l.data_len == payload.len())
            .peekable();

        if candidates.peek().is_none() {
            return Err(ProtocolError::PayloadLengthMismatch {
                eep: self.key,
                expected: self.data_lengths(),
                actual: payload.len(),
            });
        }

        let mut seen_command = None;
        for layout in candidates {
            let (Some(name), Some(command)) = (self.command_field, layout.command) else {
                return Ok(layout);
            };
            let actual = layout
                .field(name)
                .and_then(|f| f.bits.read(payload))
                .unwrap_or_default();
            if actual == command {
                return Ok(layout);
            }
            seen_command.get_or_insert(actual);
        }

        Err(ProtocolError::UnsupportedCommand {
            eep: self.key,
            command: seen_command.unwrap_or_default(),
        })
    }

    fn layout_for_command(&self, command: Option<u32>) -> Result<&'static Layout, ProtocolError> {
        match (self.command_field, command) {
            (None, _) => self.layouts.first().ok_or(ProtocolError::UnsupportedEep(self.key)),
            (Some(name), None) => Err(ProtocolError::InvalidValue {
                field: name.to_string(),
                reason: format!("{} needs a command", self.key),
            }),
            (Some(_), Some(command)) => self
                .layouts
                .iter()
                .find(|l| l.command == Some(command))
                .ok_or(ProtocolError::UnsupportedCommand {
                    eep: self.key,
                    command,
                }),
        }
    }
}

fn validate_field(field: &FieldSpec, data_len: usize) -> Result<(), String> {
    let bits = field.bits;
    if bits.size == 0 || bits.size > MAX_FIELD_BITS {
        return Err(format!("field {} has width {}", field.shortcut, bits.size));
    }
    if !bits.fits(data_len) {
        return Err(format!(
            "field {} ends at bit {} beyond {} bytes",
            field.shortcut,
            bits.end(),
            data_len
        ));
    }

    let max = bits.max_value();
    match field.kind {
        FieldKind::Scaled {
            raw_min,
            raw_max,
            min,
            max: value_max,
            ..
        } => {
            if raw_min > max || raw_max > max {
                return Err(format!(
                    "field {} raw range {}..={} exceeds {} bits",
                    field.shortcut, raw_min, raw_max, bits.size
                ));
            }
            if raw_min == raw_max {
                return Err(format!("field {} has an empty raw range", field.shortcut));
            }
            if !min.is_finite() || !value_max.is_finite() || min == value_max {
                return Err(format!("field {} has an invalid value range", field.shortcut));
            }
        }
        FieldKind::Enum(items) => {
            if let Some((value, _)) = items.iter().find(|(value, _)| *value > max) {
                return Err(format!(
                    "field {} enum value {} exceeds {} bits",
                    field.shortcut, value, bits.size
                ));
            }
        }
        FieldKind::Raw => {}
    }

    if let Some((value, _)) = field.sentinels.iter().find(|(value, _)| *value > max) {
        return Err(format!(
            "field {} sentinel {} exceeds {} bits",
            field.shortcut, value, bits.size
        ));
    }

    Ok(())
}

/// Engineering value of a decoded field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Scaled(f64),
    Label(&'static str),
    Raw(u32),
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            FieldValue::Scaled(v) => Some(v),
            FieldValue::Raw(v) => Some(v as f64),
            FieldValue::Label(_) => None,
        }
    }

    pub fn as_label(&self) -> Option<&'static str> {
        match *self {
            FieldValue::Label(l) => Some(l),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Scaled(v) => write!(f, "{:.2}", v),
            FieldValue::Label(l) => f.write_str(l),
            FieldValue::Raw(v) => write!(f, "{}", v),
        }
    }
}

/// A field as read from a payload.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DecodedField {
    pub raw_value: u32,
    pub value: FieldValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<&'static str>,
    pub description: &'static str,
}

/// Result of decoding a payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decoded {
    pub eep: EepKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<u32>,
    pub fields: BTreeMap<&'static str, DecodedField>,
}

impl Decoded {
    pub fn get(&self, shortcut: &str) -> Option<&DecodedField> {
        self.fields.get(shortcut)
    }

    pub fn raw(&self, shortcut: &str) -> Option<u32> {
        self.get(shortcut).map(|f| f.raw_value)
    }
}

/// Value handed to the encoder for one field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldInput<'a> {
    /// Engineering value, scaled to raw for `Scaled` fields.
    Scaled(f64),
    /// Enum or sentinel label.
    Label(&'a str),
    /// Raw value written as is.
    Raw(u32),
}

impl From<f64> for FieldInput<'_> {
    fn from(value: f64) -> Self {
        FieldInput::Scaled(value)
    }
}

impl From<u32> for FieldInput<'_> {
    fn from(value: u32) -> Self {
        FieldInput::Raw(value)
    }
}

impl<'a> From<&'a str> for FieldInput<'a> {
    fn from(value: &'a str) -> Self {
        FieldInput::Label(value)
    }
}

/// Out-of-range input that was clamped during encoding.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClampWarning {
    pub field: &'static str,
    pub requested: f64,
    pub raw: u32,
}

/// Result of encoding a set of field values.
#[derive(Debug, Clone, PartialEq)]
pub struct Encoded {
    pub payload: Vec<u8>,
    pub clamped: Vec<ClampWarning>,
}

/// Lookup table of profiles keyed by `(rorg, func, type)`.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    profiles: HashMap<EepKey, &'static Profile>,
}

impl Registry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in profiles.
    pub fn builtin() -> Result<Self, ProtocolError> {
        let mut registry = Self::new();
        for &profile in BUILTIN_PROFILES {
            registry.register(profile)?;
        }
        Ok(registry)
    }

    /// Validate and add a profile.
    pub fn register(&mut self, profile: &'static Profile) -> Result<(), ProtocolError> {
        profile.validate()?;
        if self.profiles.contains_key(&profile.key) {
            return Err(ProtocolError::InvalidProfile {
                eep: profile.key,
                reason: "already registered".to_string(),
            });
        }
        debug!("Registered EEP {} ({})", profile.key, profile.description);
        self.profiles.insert(profile.key, profile);
        Ok(())
    }

    pub fn get(&self, key: EepKey) -> Option<&'static Profile> {
        self.profiles.get(&key).copied()
    }

    pub fn contains(&self, key: EepKey) -> bool {
        self.profiles.contains_key(&key)
    }

    /// Registered keys in ascending order.
    pub fn keys(&self) -> Vec<EepKey> {
        let mut keys: Vec<EepKey> = self.profiles.keys().copied().collect();
        keys.sort();
        keys
    }

    fn profile(&self, key: EepKey) -> Result<&'static Profile, ProtocolError> {
        self.get(key).ok_or(ProtocolError::UnsupportedEep(key))
    }

    /// Decode a payload with the profile registered for `key`.
    pub fn decode(&self, key: EepKey, payload: &[u8]) -> Result<Decoded, ProtocolError> {
        let profile = self.profile(key)?;
        let layout = profile.select_layout(payload)?;

        let mut fields = BTreeMap::new();
        for field in layout.fields {
            // Bounds were checked at registration.
            let raw = field.bits.read(payload).unwrap_or_default();
            fields.insert(field.shortcut, field.decode(raw));
        }

        Ok(Decoded {
            eep: key,
            command: layout.command,
            fields,
        })
    }

    /// Decode a radio telegram's payload as `RORG-func-type`.
    pub fn decode_packet(
        &self,
        packet: &RadioPacket,
        func: u8,
        type_: u8,
    ) -> Result<Decoded, ProtocolError> {
        self.decode(EepKey::new(packet.rorg(), func, type_), packet.payload())
    }

    /// Encode field values into a payload.
    ///
    /// Fields that are not given are zero. For profiles with several layouts,
    /// `command` selects the layout and is written into the command field.
    /// Out-of-range values are clamped and reported in [`Encoded::clamped`].
    pub fn encode(
        &self,
        key: EepKey,
        command: Option<u32>,
        values: &[(&str, FieldInput<'_>)],
    ) -> Result<Encoded, ProtocolError> {
        let profile = self.profile(key)?;
        let layout = profile.layout_for_command(command)?;

        let mut payload = vec![0u8; layout.data_len];
        let mut clamped = Vec::new();

        for (shortcut, input) in values {
            if Some(*shortcut) == profile.command_field {
                continue;
            }
            let field = layout.field(shortcut).ok_or_else(|| ProtocolError::UnknownField {
                eep: key,
                field: shortcut.to_string(),
            })?;
            let (raw, warning) = field.encode(input)?;
            clamped.extend(warning);
            field.bits.write(&mut payload, raw);
        }

        if let (Some(name), Some(command)) = (profile.command_field, layout.command) {
            if let Some(field) = layout.field(name) {
                field.bits.write(&mut payload, command);
            }
        }

        Ok(Encoded { payload, clamped })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPLIT_FIELDS: &[FieldSpec] = &[
        FieldSpec {
            shortcut: "HI",
            description: "High",
            bits: BitRange::new(4, 8),
            kind: FieldKind::Raw,
            sentinels: &[],
        },
        FieldSpec {
            shortcut: "LVL",
            description: "Level",
            bits: BitRange::new(12, 10),
            kind: FieldKind::Scaled {
                raw_min: 0,
                raw_max: 1000,
                min: 0.0,
                max: 100.0,
                unit: "%",
            },
            sentinels: &[(1023, "error")],
        },
    ];

    static SPLIT_PROFILE: Profile = Profile {
        key: EepKey::new(Rorg::Vld, 0x7F, 0x01),
        description: "Fields straddling bytes",
        command_field: None,
        layouts: &[Layout {
            command: None,
            description: "Only",
            data_len: 3,
            fields: SPLIT_FIELDS,
        }],
    };

    static OVERFLOWING_PROFILE: Profile = Profile {
        key: EepKey::new(Rorg::Bs4, 0x7F, 0x02),
        description: "Field beyond the payload",
        command_field: None,
        layouts: &[Layout {
            command: None,
            description: "Only",
            data_len: 4,
            fields: &[FieldSpec {
                shortcut: "BAD",
                description: "Bad",
                bits: BitRange::new(28, 8),
                kind: FieldKind::Raw,
                sentinels: &[],
            }],
        }],
    };

    static BAD_RANGE_PROFILE: Profile = Profile {
        key: EepKey::new(Rorg::Bs4, 0x7F, 0x03),
        description: "Raw range wider than the field",
        command_field: None,
        layouts: &[Layout {
            command: None,
            description: "Only",
            data_len: 4,
            fields: &[FieldSpec {
                shortcut: "BAD",
                description: "Bad",
                bits: BitRange::new(0, 4),
                kind: FieldKind::Scaled {
                    raw_min: 0,
                    raw_max: 100,
                    min: 0.0,
                    max: 1.0,
                    unit: "",
                },
                sentinels: &[],
            }],
        }],
    };

    static MISSING_COMMAND_PROFILE: Profile = Profile {
        key: EepKey::new(Rorg::Vld, 0x7F, 0x04),
        description: "Command field absent from layout",
        command_field: Some("CMD"),
        layouts: &[Layout {
            command: Some(1),
            description: "Only",
            data_len: 1,
            fields: &[],
        }],
    };

    fn builtin() -> Registry {
        Registry::builtin().expect("built-in profiles are valid")
    }

    #[test]
    fn test_eep_key_parse_and_display() {
        let key: EepKey = "A5-02-05".parse().unwrap();
        assert_eq!(key, EepKey::new(Rorg::Bs4, 0x02, 0x05));
        assert_eq!(key.to_string(), "A5-02-05");
        assert_eq!("d2:05:00".parse::<EepKey>().unwrap().to_string(), "D2-05-00");
        assert!("A5-02".parse::<EepKey>().is_err());
        assert!("A5-02-XYZ".parse::<EepKey>().is_err());
    }

    #[test]
    fn test_builtin_registry() {
        let registry = builtin();
        for key in ["F6-02-01", "F6-02-02", "A5-02-05", "A5-04-01", "A5-10-03", "D2-05-00"] {
            assert!(registry.contains(key.parse().unwrap()), "{} missing", key);
        }
        assert_eq!(registry.keys().len(), BUILTIN_PROFILES.len());
    }

    #[test]
    fn test_unsupported_eep() {
        let registry = builtin();
        let key = EepKey::new(Rorg::Bs4, 0x99, 0x01);
        assert_eq!(
            registry.decode(key, &[0, 0, 0, 0]),
            Err(ProtocolError::UnsupportedEep(key))
        );
    }

    #[test]
    fn test_payload_length_mismatch() {
        let registry = builtin();
        let key: EepKey = "A5-02-05".parse().unwrap();
        assert_eq!(
            registry.decode(key, &[0, 0, 0]),
            Err(ProtocolError::PayloadLengthMismatch {
                eep: key,
                expected: vec![4],
                actual: 3,
            })
        );

        let vld: EepKey = "D2-05-00".parse().unwrap();
        match registry.decode(vld, &[0, 0]) {
            Err(ProtocolError::PayloadLengthMismatch { expected, .. }) => {
                assert_eq!(expected, vec![1, 4]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_decode_fields_straddling_bytes() {
        let mut registry = Registry::new();
        registry.register(&SPLIT_PROFILE).unwrap();

        // HI = 0xAB at bits 4..12, LVL = 500 at bits 12..22
        let mut payload = [0u8; 3];
        BitRange::new(4, 8).write(&mut payload, 0xAB).unwrap();
        BitRange::new(12, 10).write(&mut payload, 500).unwrap();

        let decoded = registry.decode(SPLIT_PROFILE.key, &payload).unwrap();
        assert_eq!(decoded.raw("HI"), Some(0xAB));
        assert_eq!(decoded.get("LVL").unwrap().value, FieldValue::Scaled(50.0));
        assert_eq!(decoded.get("LVL").unwrap().unit, Some("%"));

        BitRange::new(12, 10).write(&mut payload, 1023).unwrap();
        let decoded = registry.decode(SPLIT_PROFILE.key, &payload).unwrap();
        assert_eq!(decoded.get("LVL").unwrap().value, FieldValue::Label("error"));
        assert_eq!(decoded.raw("HI"), Some(0xAB));
    }

    #[test]
    fn test_encode_straddling_fields() {
        let mut registry = Registry::new();
        registry.register(&SPLIT_PROFILE).unwrap();

        let encoded = registry
            .encode(
                SPLIT_PROFILE.key,
                None,
                &[("HI", FieldInput::Raw(0xAB)), ("LVL", FieldInput::Scaled(25.0))],
            )
            .unwrap();
        assert!(encoded.clamped.is_empty());
        assert_eq!(BitRange::new(4, 8).read(&encoded.payload), Some(0xAB));
        assert_eq!(BitRange::new(12, 10).read(&encoded.payload), Some(250));

        let encoded = registry
            .encode(SPLIT_PROFILE.key, None, &[("LVL", "error".into())])
            .unwrap();
        assert_eq!(BitRange::new(12, 10).read(&encoded.payload), Some(1023));
    }

    #[test]
    fn test_encode_clamps_and_reports() {
        let registry = builtin();
        let key: EepKey = "A5-04-01".parse().unwrap();

        let encoded = registry
            .encode(key, None, &[("HUM", 150.0.into()), ("TMP", (-5.0).into())])
            .unwrap();
        assert_eq!(encoded.clamped.len(), 2);
        assert_eq!(
            encoded.clamped[0],
            ClampWarning {
                field: "HUM",
                requested: 150.0,
                raw: 250
            }
        );
        assert_eq!(encoded.clamped[1].raw, 0);
        assert_eq!(encoded.payload[1], 250);
        assert_eq!(encoded.payload[2], 0);
    }

    #[test]
    fn test_encode_errors() {
        let registry = builtin();
        let key: EepKey = "A5-02-05".parse().unwrap();

        assert!(matches!(
            registry.encode(key, None, &[("NOPE", 1.0.into())]),
            Err(ProtocolError::UnknownField { .. })
        ));
        assert!(matches!(
            registry.encode(key, None, &[("TMP", f64::NAN.into())]),
            Err(ProtocolError::InvalidValue { .. })
        ));
        assert!(matches!(
            registry.encode(key, None, &[("LRNB", "Maybe".into())]),
            Err(ProtocolError::InvalidValue { .. })
        ));

        let vld: EepKey = "D2-05-00".parse().unwrap();
        assert!(matches!(
            registry.encode(vld, None, &[]),
            Err(ProtocolError::InvalidValue { .. })
        ));
        assert_eq!(
            registry.encode(vld, Some(9), &[]),
            Err(ProtocolError::UnsupportedCommand {
                eep: vld,
                command: 9
            })
        );
    }

    #[test]
    fn test_registration_rejects_invalid_tables() {
        let mut registry = Registry::new();
        for profile in [&OVERFLOWING_PROFILE, &BAD_RANGE_PROFILE, &MISSING_COMMAND_PROFILE] {
            assert!(matches!(
                registry.register(profile),
                Err(ProtocolError::InvalidProfile { .. })
            ));
        }
        assert!(registry.keys().is_empty());

        registry.register(&SPLIT_PROFILE).unwrap();
        assert!(matches!(
            registry.register(&SPLIT_PROFILE),
            Err(ProtocolError::InvalidProfile { .. })
        ));
    }

    #[test]
    fn test_decode_packet() {
        let registry = builtin();
        let packet = RadioPacket::from_data(
            &[0xA5, 0x00, 0x00, 0x55, 0x08, 0x01, 0x81, 0xB7, 0x44, 0x00],
            &[],
        )
        .unwrap();
        let decoded = registry.decode_packet(&packet, 0x02, 0x05).unwrap();
        let tmp = decoded.get("TMP").unwrap().value.as_f64().unwrap();
        assert!((tmp - 26.666).abs() < 0.01, "got {}", tmp);
        assert_eq!(decoded.get("LRNB").unwrap().value.as_label(), Some("Data telegram"));
    }
}
