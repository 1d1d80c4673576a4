//! Classification ruleset data.
//!
//! The tables are plain data so the cascade in [`crate::classify`] stays free
//! of hard-coded vendor names. Order matters inside every table: the first
//! matching rule wins, and the versions are bumped whenever an entry moves.

use crate::model::DeviceType;

/// Identifies the ruleset a classification was produced with.
pub const RULESET_VERSION: &str = "2024.2";

/// A group of vendor keywords that map to one device type.
#[derive(Debug, Clone, Copy)]
pub struct VendorRule {
    pub device_type: DeviceType,
    /// Lowercase keywords matched as whole words in the lowercased vendor string.
    pub keywords: &'static [&'static str],
}

/// A set of OUI prefixes (first three octets) that map to one device type.
#[derive(Debug, Clone, Copy)]
pub struct OuiRule {
    pub device_type: DeviceType,
    pub prefixes: &'static [[u8; 3]],
}

/// A set of open ports that map to one device type.
#[derive(Debug, Clone, Copy)]
pub struct PortRule {
    pub device_type: DeviceType,
    pub ports: &'static [u16],
}

/// Complete, ordered ruleset consumed by the classifier.
#[derive(Debug, Clone, Copy)]
pub struct Ruleset {
    pub version: &'static str,
    pub vendors: &'static [VendorRule],
    pub ouis: &'static [OuiRule],
    pub ports: &'static [PortRule],
    /// Corporate suffixes stripped when a vendor name ends up in a display name.
    pub legal_suffixes: &'static [&'static str],
}

impl Default for Ruleset {
    fn default() -> Self {
        DEFAULT_RULESET
    }
}

// Workstation vendors come first: "hp inc." is listed under both workstations
// and printers, and an HP-branded host without printer evidence is a PC.
const VENDOR_RULES: &[VendorRule] = &[
    VendorRule {
        device_type: DeviceType::Workstation,
        keywords: &[
            "giga-byte",
            "micro-star",
            "msi",
            "asus",
            "intel",
            "acer",
            "dell",
            "lenovo",
            "hp inc.",
            "hewlett-packard",
            "microsoft",
            "samsung",
            "azurewave",
            "realtek",
            "broadcom",
        ],
    },
    VendorRule {
        device_type: DeviceType::NetworkDevice,
        keywords: &[
            "cisco", "mikrotik", "ubiquiti", "tplink", "tp-link", "d-link", "zyxel", "aruba",
            "extreme", "juniper",
        ],
    },
    VendorRule {
        device_type: DeviceType::Printer,
        keywords: &[
            "hp inc.",
            "hewlett-packard",
            "hp printer",
            "canon",
            "epson",
            "brother",
            "kyocera",
            "xerox",
        ],
    },
    VendorRule {
        device_type: DeviceType::VoipPhone,
        keywords: &["grandstream", "yealink", "polycom", "avaya", "snom", "panasonic"],
    },
    VendorRule {
        device_type: DeviceType::Camera,
        keywords: &["hikvision", "dahua", "axis", "bosch"],
    },
    VendorRule {
        device_type: DeviceType::Mobile,
        keywords: &["samsung", "apple", "xiaomi", "huawei", "sony", "lg"],
    },
    VendorRule {
        device_type: DeviceType::Iot,
        keywords: &["raspberry", "arduino", "iot"],
    },
];

const OUI_RULES: &[OuiRule] = &[
    OuiRule {
        device_type: DeviceType::Printer,
        prefixes: &[
            [0x00, 0x01, 0xE6],
            [0x00, 0x0E, 0x7F],
            [0x00, 0x12, 0x79],
            [0x00, 0x50, 0xF1],
            [0x00, 0x01, 0x47],
            [0x00, 0x0C, 0x6E],
            [0x00, 0x0A, 0x27],
            [0x00, 0x80, 0x77],
            [0x00, 0x05, 0x02],
            [0x00, 0x09, 0x6D],
            [0x00, 0x0A, 0xDE],
        ],
    },
    OuiRule {
        device_type: DeviceType::VoipPhone,
        prefixes: &[
            [0x00, 0x0B, 0x82],
            [0x00, 0x13, 0x6A],
            [0x00, 0x15, 0x65],
            [0x00, 0x1E, 0x72],
            [0x00, 0x04, 0x13],
            [0x00, 0x18, 0x6B],
            [0x00, 0x0A, 0xD9],
            [0x00, 0x07, 0x7D],
        ],
    },
    OuiRule {
        device_type: DeviceType::NetworkDevice,
        prefixes: &[
            [0x00, 0x1C, 0xC0],
            [0x00, 0x0C, 0x29],
            [0x00, 0x50, 0x56],
            [0x00, 0x1B, 0x21],
            [0x00, 0x1C, 0x42],
            [0x00, 0x1A, 0x2B],
            [0x00, 0x1C, 0x0E],
            [0x4C, 0x5E, 0x0C],
            [0x00, 0x0C, 0x42],
            [0x00, 0x1E, 0x65],
            [0x80, 0x2A, 0xA8],
            [0x00, 0x15, 0x6D],
            [0x00, 0x23, 0xCD],
            [0x00, 0x17, 0x9A],
            [0x00, 0x21, 0x91],
        ],
    },
];

const PORT_RULES: &[PortRule] = &[
    PortRule {
        device_type: DeviceType::NetworkDevice,
        ports: &[22, 23, 161],
    },
    PortRule {
        device_type: DeviceType::WebExposedDevice,
        ports: &[80, 443, 8080],
    },
];

const LEGAL_SUFFIXES: &[&str] = &[
    "inc",
    "corp",
    "corporation",
    "llc",
    "ltd",
    "co",
    "gmbh",
    "technology",
    "technologies",
    "intl",
];

pub const DEFAULT_RULESET: Ruleset = Ruleset {
    version: RULESET_VERSION,
    vendors: VENDOR_RULES,
    ouis: OUI_RULES,
    ports: PORT_RULES,
    legal_suffixes: LEGAL_SUFFIXES,
};
