//! Firmware records parsed from a board's updater config.
//!
//! Each machine board directory inside `FirmwareUpdate.pkg` carries a
//! `Config.plist` whose `Thunderbolt` array describes the firmware payloads
//! for that board. Invalid array entries are dropped with a warning; a board
//! whose entries are all invalid yields no config at all.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::plist::{self, PlistError, Value};
use crate::report::{IndentingWriter, Render};

/// Apple board identifier, e.g. "Mac-827FB448E656EC26".
pub type BoardId = String;

/// Firmware configs keyed by board id, as gathered from one installer.
pub type FirmwareRecords = BTreeMap<BoardId, FirmwareConfig>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Plist(#[from] PlistError),
    #[error("updater config is not a dictionary")]
    NotADictionary,
    #[error("updater config has no Thunderbolt section")]
    NoThunderboltSection,
    #[error("every Thunderbolt entry in the updater config is invalid")]
    NoValidFirmware,
}

/// One firmware payload: the file shipped for a board plus the hardware it
/// targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareInfo {
    /// Payload file name, e.g. "TBT_0x0E_25.75.bin".
    pub file_name: String,
    /// Firmware version in its decimal spelling, e.g. "25.75" or "33.0".
    pub version: String,
    /// Vendor id of the Thunderbolt controller.
    pub vendor_id: i64,
    /// Device id of the Thunderbolt controller.
    pub device_id: i64,
    /// Hardware revision the payload applies to.
    pub revision: i64,
}

impl FirmwareInfo {
    /// Build a record from one `Thunderbolt` array entry. The reported
    /// reason names the first missing field.
    fn from_value(entry: &Value) -> Result<Self, &'static str> {
        if entry.as_dict().is_none() {
            return Err("entry is not a dictionary");
        }
        let file_name = entry
            .get("Firmware")
            .and_then(Value::as_str)
            .ok_or("missing firmware file name")?;
        let version = entry
            .get("Version")
            .and_then(Value::as_real)
            .ok_or("missing firmware version")?;
        // Newer configs carry the actual controller version separately;
        // prefer it when present.
        let version = entry
            .get("Ridge Firmware Version")
            .and_then(Value::as_real)
            .unwrap_or(version);
        let vendor_id = entry
            .get("Ridge Silicon Vendor ID")
            .and_then(Value::as_integer)
            .ok_or("missing vendor id")?;
        let device_id = entry
            .get("Ridge Silicon Device ID")
            .and_then(Value::as_integer)
            .ok_or("missing device id")?;
        let revision = entry
            .get("Ridge Silicon Revision")
            .and_then(Value::as_integer)
            .ok_or("missing revision")?;
        Ok(Self {
            file_name: file_name.to_string(),
            version: decimal_string(version),
            vendor_id,
            device_id,
            revision,
        })
    }
}

impl Render for FirmwareInfo {
    fn render(&self, writer: &mut IndentingWriter) {
        writer.println(format!("- Firmware Version #: {}", self.version));
        writer.println(format!("- Firmware File Name: {}", self.file_name));
        writer.println(format!("- Hardware Vendor ID: 0x{:X}", self.vendor_id));
        writer.println(format!("- Hardware Device ID: 0x{:X}", self.device_id));
        writer.println(format!("- Hardware Revisions: {}", self.revision));
    }
}

/// All Thunderbolt firmware shipped for one board.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareConfig {
    pub firmwares: Vec<FirmwareInfo>,
}

impl FirmwareConfig {
    /// Read and validate `Config.plist` at `path`. `board` labels warnings
    /// about dropped entries.
    pub fn from_file(path: &Path, board: &str) -> Result<Self, ConfigError> {
        let value = plist::parse_file(path)?;
        Self::from_value(&value, board)
    }

    /// Validate an already parsed updater config.
    pub fn from_value(value: &Value, board: &str) -> Result<Self, ConfigError> {
        if value.as_dict().is_none() {
            return Err(ConfigError::NotADictionary);
        }
        // Boards that only ship USB-C retimer payloads have no section at all.
        let entries = value
            .get("Thunderbolt")
            .and_then(Value::as_array)
            .ok_or(ConfigError::NoThunderboltSection)?;
        let mut firmwares = Vec::new();
        for (index, entry) in entries.iter().enumerate() {
            match FirmwareInfo::from_value(entry) {
                Ok(info) => firmwares.push(info),
                Err(reason) => {
                    println!("Warning: {board}: dropping Thunderbolt entry {index}: {reason}");
                }
            }
        }
        if firmwares.is_empty() && !entries.is_empty() {
            return Err(ConfigError::NoValidFirmware);
        }
        Ok(Self { firmwares })
    }
}

impl Render for FirmwareConfig {
    fn render(&self, writer: &mut IndentingWriter) {
        for (index, firmware) in self.firmwares.iter().enumerate() {
            writer.println(format!("* Firmware {index}"));
            writer.indent();
            firmware.render(writer);
            writer.outdent();
        }
    }
}

impl Render for FirmwareRecords {
    fn render(&self, writer: &mut IndentingWriter) {
        for (board, config) in self {
            writer.println(format!("- Board ID: {board}"));
            writer.indent();
            config.render(writer);
            writer.outdent();
        }
    }
}

/// Format a firmware version the way the updater configs spell it: whole
/// numbers keep one fractional digit ("33.0"), everything else prints as-is.
fn decimal_string(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_plist(thunderbolt: &str) -> Value {
        let xml = format!(
            "<plist version=\"1.0\"><dict><key>Thunderbolt</key>{thunderbolt}</dict></plist>"
        );
        plist::parse_str(&xml).unwrap()
    }

    const FULL_ENTRY: &str = r#"<dict>
        <key>Firmware</key><string>TBT_0x0E_25.75.bin</string>
        <key>Version</key><real>25.75</real>
        <key>Ridge Silicon Vendor ID</key><integer>1</integer>
        <key>Ridge Silicon Device ID</key><integer>5558</integer>
        <key>Ridge Silicon Revision</key><integer>2</integer>
    </dict>"#;

    #[test]
    fn parses_a_complete_entry() {
        let value = config_plist(&format!("<array>{FULL_ENTRY}</array>"));
        let config = FirmwareConfig::from_value(&value, "Mac-TEST").unwrap();
        assert_eq!(
            config.firmwares,
            [FirmwareInfo {
                file_name: "TBT_0x0E_25.75.bin".into(),
                version: "25.75".into(),
                vendor_id: 1,
                device_id: 5558,
                revision: 2,
            }]
        );
    }

    #[test]
    fn prefers_the_ridge_firmware_version() {
        let entry = r#"<dict>
            <key>Firmware</key><string>TBT.bin</string>
            <key>Version</key><real>1.0</real>
            <key>Ridge Firmware Version</key><real>33.0</real>
            <key>Ridge Silicon Vendor ID</key><integer>1</integer>
            <key>Ridge Silicon Device ID</key><integer>5558</integer>
            <key>Ridge Silicon Revision</key><integer>0</integer>
        </dict>"#;
        let value = config_plist(&format!("<array>{entry}</array>"));
        let config = FirmwareConfig::from_value(&value, "Mac-TEST").unwrap();
        assert_eq!(config.firmwares[0].version, "33.0");
    }

    #[test]
    fn drops_entries_with_missing_fields() {
        let broken = r#"<dict>
            <key>Firmware</key><string>TBT.bin</string>
            <key>Version</key><real>1.0</real>
        </dict>"#;
        let value = config_plist(&format!("<array>{broken}{FULL_ENTRY}</array>"));
        let config = FirmwareConfig::from_value(&value, "Mac-TEST").unwrap();
        assert_eq!(config.firmwares.len(), 1);
        assert_eq!(config.firmwares[0].file_name, "TBT_0x0E_25.75.bin");
    }

    #[test]
    fn all_entries_invalid_is_an_error() {
        let value = config_plist("<array><dict/><string>junk</string></array>");
        let error = FirmwareConfig::from_value(&value, "Mac-TEST").unwrap_err();
        assert!(matches!(error, ConfigError::NoValidFirmware));
    }

    #[test]
    fn explicitly_empty_section_is_a_valid_config() {
        let value = config_plist("<array/>");
        let config = FirmwareConfig::from_value(&value, "Mac-TEST").unwrap();
        assert!(config.firmwares.is_empty());
    }

    #[test]
    fn missing_section_is_an_error() {
        let value = plist::parse_str("<plist><dict><key>USBC</key><array/></dict></plist>")
            .unwrap();
        let error = FirmwareConfig::from_value(&value, "Mac-TEST").unwrap_err();
        assert!(matches!(error, ConfigError::NoThunderboltSection));
    }

    #[test]
    fn non_dictionary_config_is_an_error() {
        let value = plist::parse_str("<plist><array/></plist>").unwrap();
        let error = FirmwareConfig::from_value(&value, "Mac-TEST").unwrap_err();
        assert!(matches!(error, ConfigError::NotADictionary));
    }

    #[test]
    fn whole_number_versions_keep_one_decimal() {
        assert_eq!(decimal_string(33.0), "33.0");
        assert_eq!(decimal_string(25.75), "25.75");
        assert_eq!(decimal_string(0.0), "0.0");
    }

    #[test]
    fn renders_indented_board_records() {
        let value = config_plist(&format!("<array>{FULL_ENTRY}</array>"));
        let config = FirmwareConfig::from_value(&value, "Mac-TEST").unwrap();
        let mut records = FirmwareRecords::new();
        records.insert("Mac-TEST".into(), config);

        let mut writer = IndentingWriter::new();
        records.render(&mut writer);
        let expected = "\
- Board ID: Mac-TEST
    * Firmware 0
        - Firmware Version #: 25.75
        - Firmware File Name: TBT_0x0E_25.75.bin
        - Hardware Vendor ID: 0x1
        - Hardware Device ID: 0x15B6
        - Hardware Revisions: 2
";
        assert_eq!(writer.as_str(), expected);
    }
}
