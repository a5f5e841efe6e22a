//! Built-in profile tables.

use super::{EepKey, FieldKind, FieldSpec, Layout, Profile};
use crate::bits::BitRange;
use crate::types::Rorg;

const ROCKER_BUTTONS: &[(u32, &str)] = &[
    (0, "Button AI"),
    (1, "Button AO"),
    (2, "Button BI"),
    (3, "Button BO"),
];

const LEARN_BIT: &[(u32, &str)] = &[(0, "Teach-in telegram"), (1, "Data telegram")];

const fn field(
    shortcut: &'static str,
    description: &'static str,
    offset: u16,
    size: u8,
    kind: FieldKind,
) -> FieldSpec {
    FieldSpec {
        shortcut,
        description,
        bits: BitRange::new(offset, size),
        kind,
        sentinels: &[],
    }
}

const fn scaled(raw_min: u32, raw_max: u32, min: f64, max: f64, unit: &'static str) -> FieldKind {
    FieldKind::Scaled {
        raw_min,
        raw_max,
        min,
        max,
        unit,
    }
}

const LRNB: FieldSpec = field("LRNB", "Learn bit", 28, 1, FieldKind::Enum(LEARN_BIT));

const ROCKER_FIELDS: &[FieldSpec] = &[
    field("R1", "Rocker 1st action", 0, 3, FieldKind::Enum(ROCKER_BUTTONS)),
    field(
        "EB",
        "Energy bow",
        3,
        1,
        FieldKind::Enum(&[(0, "released"), (1, "pressed")]),
    ),
    field("R2", "Rocker 2nd action", 4, 3, FieldKind::Enum(ROCKER_BUTTONS)),
    field(
        "SA",
        "2nd action",
        7,
        1,
        FieldKind::Enum(&[(0, "No 2nd action"), (1, "2nd action valid")]),
    ),
];

const ROCKER_LAYOUT: &[Layout] = &[Layout {
    command: None,
    description: "Rocker telegram",
    data_len: 1,
    fields: ROCKER_FIELDS,
}];

pub static F6_02_01: Profile = Profile {
    key: EepKey::new(Rorg::Rps, 0x02, 0x01),
    description: "Light and blind control, application style 1",
    command_field: None,
    layouts: ROCKER_LAYOUT,
};

pub static F6_02_02: Profile = Profile {
    key: EepKey::new(Rorg::Rps, 0x02, 0x02),
    description: "Light and blind control, application style 2",
    command_field: None,
    layouts: ROCKER_LAYOUT,
};

pub static A5_02_05: Profile = Profile {
    key: EepKey::new(Rorg::Bs4, 0x02, 0x05),
    description: "Temperature sensor, range 0 to +40 °C",
    command_field: None,
    layouts: &[Layout {
        command: None,
        description: "Temperature",
        data_len: 4,
        fields: &[
            field("TMP", "Temperature", 16, 8, scaled(255, 0, 0.0, 40.0, "°C")),
            LRNB,
        ],
    }],
};

pub static A5_04_01: Profile = Profile {
    key: EepKey::new(Rorg::Bs4, 0x04, 0x01),
    description: "Temperature and humidity sensor, range 0 to +40 °C and 0 to 100 %",
    command_field: None,
    layouts: &[Layout {
        command: None,
        description: "Temperature and humidity",
        data_len: 4,
        fields: &[
            field("HUM", "Rel. Humidity (linear)", 8, 8, scaled(0, 250, 0.0, 100.0, "%")),
            field("TMP", "Temperature (linear)", 16, 8, scaled(0, 250, 0.0, 40.0, "°C")),
            LRNB,
            field(
                "TSN",
                "Availability of the temperature sensor",
                30,
                1,
                FieldKind::Enum(&[(0, "not available"), (1, "available")]),
            ),
        ],
    }],
};

pub static A5_10_03: Profile = Profile {
    key: EepKey::new(Rorg::Bs4, 0x10, 0x03),
    description: "Room operating panel: temperature sensor and set point control",
    command_field: None,
    layouts: &[Layout {
        command: None,
        description: "Set point and temperature",
        data_len: 4,
        fields: &[
            field("SP", "Set point", 8, 8, scaled(0, 255, 0.0, 255.0, "")),
            field("TMP", "Temperature", 16, 8, scaled(255, 0, 0.0, 40.0, "°C")),
            LRNB,
        ],
    }],
};

const CHANNEL: &[(u32, &str)] = &[(0, "Channel 1"), (15, "All channels")];

const fn position(description: &'static str, sentinel: &'static [(u32, &'static str)]) -> FieldSpec {
    FieldSpec {
        shortcut: "POS",
        description,
        bits: BitRange::new(1, 7),
        kind: scaled(0, 100, 0.0, 100.0, "%"),
        sentinels: sentinel,
    }
}

const fn angle(sentinel: &'static [(u32, &'static str)]) -> FieldSpec {
    FieldSpec {
        shortcut: "ANG",
        description: "Angle",
        bits: BitRange::new(9, 7),
        kind: scaled(0, 100, 0.0, 100.0, "%"),
        sentinels: sentinel,
    }
}

const NO_CHANGE: &[(u32, &str)] = &[(127, "no change")];
const UNKNOWN: &[(u32, &str)] = &[(127, "unknown")];

const LOCK: &[(u32, &str)] = &[
    (0, "Normal"),
    (1, "Blockage"),
    (2, "Alarm"),
];

pub static D2_05_00: Profile = Profile {
    key: EepKey::new(Rorg::Vld, 0x05, 0x00),
    description: "Blinds control for position and angle",
    command_field: Some("CMD"),
    layouts: &[
        Layout {
            command: Some(1),
            description: "Go to position and angle",
            data_len: 4,
            fields: &[
                position("Vertical position", NO_CHANGE),
                angle(NO_CHANGE),
                field(
                    "REPO",
                    "Repositioning",
                    17,
                    3,
                    FieldKind::Enum(&[
                        (0, "Go directly to POS/ANG"),
                        (1, "Go up (0%), then to POS/ANG"),
                        (2, "Go down (100%), then to POS/ANG"),
                    ]),
                ),
                field(
                    "LOCK",
                    "Locking modes",
                    21,
                    3,
                    FieldKind::Enum(&[
                        (0, "Do not change"),
                        (1, "Set blockage mode"),
                        (2, "Set alarm mode"),
                        (7, "Deblockage"),
                    ]),
                ),
                field("CHN", "Channel", 24, 4, FieldKind::Enum(CHANNEL)),
                field("CMD", "Command Id", 28, 4, FieldKind::Raw),
            ],
        },
        Layout {
            command: Some(2),
            description: "Stop",
            data_len: 1,
            fields: &[
                field("CHN", "Channel", 0, 4, FieldKind::Enum(CHANNEL)),
                field("CMD", "Command Id", 4, 4, FieldKind::Raw),
            ],
        },
        Layout {
            command: Some(3),
            description: "Query position and angle",
            data_len: 1,
            fields: &[
                field("CHN", "Channel", 0, 4, FieldKind::Enum(CHANNEL)),
                field("CMD", "Command Id", 4, 4, FieldKind::Raw),
            ],
        },
        Layout {
            command: Some(4),
            description: "Reply position and angle",
            data_len: 4,
            fields: &[
                position("Vertical position", UNKNOWN),
                angle(UNKNOWN),
                field("LOCK", "Locking modes", 21, 3, FieldKind::Enum(LOCK)),
                field("CHN", "Channel", 24, 4, FieldKind::Enum(CHANNEL)),
                field("CMD", "Command Id", 28, 4, FieldKind::Raw),
            ],
        },
    ],
};

/// Profiles registered by [`Registry::builtin`](super::Registry::builtin).
pub static BUILTIN_PROFILES: &[&Profile] = &[
    &F6_02_01, &F6_02_02, &A5_02_05, &A5_04_01, &A5_10_03, &D2_05_00,
];

#[cfg(test)]
mod tests {
    use super::super::{FieldInput, FieldValue, Registry};
    use super::*;

    fn registry() -> Registry {
        Registry::builtin().unwrap()
    }

    #[test]
    fn test_rocker_decode() {
        let decoded = registry().decode(F6_02_01.key, &[0x30]).unwrap();
        assert_eq!(decoded.get("R1").unwrap().value, FieldValue::Label("Button AO"));
        assert_eq!(decoded.get("EB").unwrap().value, FieldValue::Label("pressed"));
        assert_eq!(decoded.raw("SA"), Some(0));

        let decoded = registry().decode(F6_02_02.key, &[0x00]).unwrap();
        assert_eq!(decoded.get("EB").unwrap().value, FieldValue::Label("released"));
    }

    #[test]
    fn test_humidity_temperature_decode() {
        // HUM = 125 (50 %), TMP = 125 (20 °C), data telegram, sensor present
        let decoded = registry()
            .decode(A5_04_01.key, &[0x00, 0x7D, 0x7D, 0x0A])
            .unwrap();
        assert_eq!(decoded.get("HUM").unwrap().value, FieldValue::Scaled(50.0));
        assert_eq!(decoded.get("TMP").unwrap().value, FieldValue::Scaled(20.0));
        assert_eq!(decoded.get("TMP").unwrap().unit, Some("°C"));
        assert_eq!(decoded.get("TSN").unwrap().value, FieldValue::Label("available"));
        assert_eq!(decoded.get("LRNB").unwrap().value, FieldValue::Label("Data telegram"));
    }

    #[test]
    fn test_inverted_temperature_range() {
        let registry = registry();
        let cold = registry.decode(A5_02_05.key, &[0, 0, 0xFF, 0x08]).unwrap();
        assert_eq!(cold.get("TMP").unwrap().value, FieldValue::Scaled(0.0));
        let warm = registry.decode(A5_02_05.key, &[0, 0, 0x00, 0x08]).unwrap();
        assert_eq!(warm.get("TMP").unwrap().value, FieldValue::Scaled(40.0));

        let encoded = registry
            .encode(A5_02_05.key, None, &[("TMP", FieldInput::Scaled(40.0))])
            .unwrap();
        assert_eq!(encoded.payload[2], 0x00);
    }

    #[test]
    fn test_room_panel_decode() {
        let decoded = registry()
            .decode(A5_10_03.key, &[0x00, 0x80, 0xFF, 0x08])
            .unwrap();
        assert_eq!(decoded.raw("SP"), Some(0x80));
        assert_eq!(decoded.get("TMP").unwrap().value, FieldValue::Scaled(0.0));
    }

    #[test]
    fn test_blinds_reply_position() {
        let registry = registry();

        // POS = 30, ANG = 0, CHN = 0, CMD = 4
        let decoded = registry.decode(D2_05_00.key, &[30, 0, 0, 0x04]).unwrap();
        assert_eq!(decoded.command, Some(4));
        assert_eq!(decoded.raw("POS"), Some(30));
        assert_eq!(decoded.get("POS").unwrap().value, FieldValue::Scaled(30.0));

        let unknown = registry.decode(D2_05_00.key, &[127, 127, 0, 0x04]).unwrap();
        assert_eq!(unknown.raw("POS"), Some(127));
        assert_eq!(unknown.get("POS").unwrap().value, FieldValue::Label("unknown"));
    }

    #[test]
    fn test_blinds_layout_selected_by_command() {
        let registry = registry();

        let stop = registry.decode(D2_05_00.key, &[0x02]).unwrap();
        assert_eq!(stop.command, Some(2));
        let query = registry.decode(D2_05_00.key, &[0x03]).unwrap();
        assert_eq!(query.command, Some(3));
        assert!(query.get("POS").is_none());

        assert!(matches!(
            registry.decode(D2_05_00.key, &[0x05]),
            Err(crate::error::ProtocolError::UnsupportedCommand { command: 5, .. })
        ));
    }

    #[test]
    fn test_blinds_encode_commands() {
        let registry = registry();

        let goto = registry
            .encode(D2_05_00.key, Some(1), &[("POS", FieldInput::Scaled(70.0))])
            .unwrap();
        assert_eq!(goto.payload, vec![70, 0, 0, 0x01]);

        let stop = registry.encode(D2_05_00.key, Some(2), &[]).unwrap();
        assert_eq!(stop.payload, vec![0x02]);

        let query = registry.encode(D2_05_00.key, Some(3), &[]).unwrap();
        assert_eq!(query.payload, vec![0x03]);

        let keep = registry
            .encode(D2_05_00.key, Some(1), &[("POS", "no change".into()), ("ANG", "no change".into())])
            .unwrap();
        assert_eq!(keep.payload, vec![127, 127, 0, 0x01]);
    }
}
