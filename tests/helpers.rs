//! Shared test utilities for tbtquery tests.
//!
//! Real installers need `hdiutil` and `pkgutil`, so the fixtures fake both:
//! a "disk image" is a plain directory, the mock `hdiutil` copies it into
//! the mount point, and the mock `pkgutil` copies a "package" directory into
//! the expansion destination. Every invocation is appended to a log file so
//! tests can assert how often the tools ran.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use tbtquery::mount::MountBroker;
use tbtquery::query::PackageExpander;

/// Test environment with mock disk image and package tools.
pub struct FixtureEnv {
    /// Temporary directory (kept alive for the lifetime of the fixture)
    pub _temp_dir: TempDir,
    /// Root for fixture installers and images
    pub root: PathBuf,
    /// Mock hdiutil path
    pub hdiutil: PathBuf,
    /// Mock pkgutil path
    pub pkgutil: PathBuf,
    /// Tool invocation log, one line of arguments per call
    pub log: PathBuf,
}

impl FixtureEnv {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let base = temp_dir.path();
        let root = base.join("fixtures");
        let bin = base.join("bin");
        let log = base.join("tools.log");
        fs::create_dir_all(&root).expect("Failed to create fixture root");
        fs::create_dir_all(&bin).expect("Failed to create bin dir");

        let hdiutil = bin.join("hdiutil");
        write_script(
            &hdiutil,
            &format!(
                r#"#!/bin/sh
# Mock hdiutil: disk images are plain directories.
echo "$@" >> "{log}"
case "$1" in
    attach)
        image="$2"
        mountpoint="$5"
        case "$image" in
            *unattachable*) exit 1 ;;
        esac
        cp -R "$image"/. "$mountpoint"/ || exit 1
        ;;
    detach)
        # A volume holding a "busy" marker refuses to detach.
        [ -e "$2/busy" ] && exit 16
        ;;
    *)
        exit 64
        ;;
esac
exit 0
"#,
                log = log.display()
            ),
        );

        let pkgutil = bin.join("pkgutil");
        write_script(
            &pkgutil,
            &format!(
                r#"#!/bin/sh
# Mock pkgutil: packages are plain directories.
echo "$@" >> "{log}"
[ "$1" = "--expand-full" ] || exit 64
package="$2"
destination="$3"
# A package holding a "damaged" marker refuses to expand.
[ -e "$package/damaged" ] && exit 3
# Real pkgutil refuses an existing destination.
[ -e "$destination" ] && exit 1
mkdir -p "$destination"
cp -R "$package"/. "$destination"/
"#,
                log = log.display()
            ),
        );

        Self {
            _temp_dir: temp_dir,
            root,
            hdiutil,
            pkgutil,
            log,
        }
    }

    pub fn broker(&self) -> MountBroker {
        MountBroker::new(self.hdiutil.clone())
    }

    pub fn expander(&self) -> PackageExpander {
        PackageExpander::new(self.pkgutil.clone())
    }

    /// Full tool log as one string.
    pub fn tool_log(&self) -> String {
        fs::read_to_string(&self.log).unwrap_or_default()
    }

    /// Number of logged invocations whose arguments contain `needle`.
    pub fn count_calls(&self, needle: &str) -> usize {
        self.tool_log()
            .lines()
            .filter(|line| line.contains(needle))
            .count()
    }
}

fn write_script(path: &Path, contents: &str) {
    fs::write(path, contents).expect("Failed to write mock tool");
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .expect("Failed to mark mock tool executable");
}

/// A SystemVersion.plist document.
pub fn system_version_plist(version: &str, build: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>ProductBuildVersion</key>
    <string>{build}</string>
    <key>ProductName</key>
    <string>Mac OS X</string>
    <key>ProductVersion</key>
    <string>{version}</string>
</dict>
</plist>
"#
    )
}

/// One valid `Thunderbolt` array entry for a Config.plist.
pub fn thunderbolt_entry(
    file_name: &str,
    version: &str,
    vendor_id: u32,
    device_id: u32,
    revision: u32,
) -> String {
    format!(
        r#"<dict>
            <key>Firmware</key><string>{file_name}</string>
            <key>Version</key><real>{version}</real>
            <key>Ridge Silicon Vendor ID</key><integer>{vendor_id}</integer>
            <key>Ridge Silicon Device ID</key><integer>{device_id}</integer>
            <key>Ridge Silicon Revision</key><integer>{revision}</integer>
        </dict>"#
    )
}

/// A Config.plist document with the given `Thunderbolt` entries.
pub fn board_config_plist(entries: &[String]) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<plist version="1.0">
<dict>
    <key>Thunderbolt</key>
    <array>{}</array>
</dict>
</plist>
"#,
        entries.join("\n")
    )
}

/// Describes one board directory inside a fixture firmware package.
pub struct BoardFixture {
    pub board: String,
    pub config_plist: String,
    /// Extra payload files written next to Config.plist.
    pub payloads: Vec<(String, Vec<u8>)>,
}

impl BoardFixture {
    pub fn new(board: &str, config_plist: String) -> Self {
        Self {
            board: board.to_string(),
            config_plist,
            payloads: Vec::new(),
        }
    }

    pub fn with_payload(mut self, file_name: &str, contents: &[u8]) -> Self {
        self.payloads.push((file_name.to_string(), contents.to_vec()));
        self
    }
}

/// Build a fake installer app bundle under `parent`.
///
/// The bundle carries an `InstallESD.dmg` directory (the fake container
/// image) holding `FirmwareUpdate.pkg` with one directory per board, and a
/// `BaseSystem.dmg` directory with the version manifest. With `legacy` set,
/// `BaseSystem.dmg` moves inside `InstallESD.dmg` the way pre-10.13
/// installers shipped it.
pub fn build_installer(
    parent: &Path,
    name: &str,
    version: &str,
    build: &str,
    boards: &[BoardFixture],
    legacy: bool,
) -> PathBuf {
    let app = parent.join(format!("{name}.app"));
    let esd = app.join("Contents/SharedSupport/InstallESD.dmg");

    let updater = esd.join("Packages/FirmwareUpdate.pkg/Scripts/Tools/USBCUpdater");
    for fixture in boards {
        let board_dir = updater.join(&fixture.board);
        fs::create_dir_all(&board_dir).expect("Failed to create board dir");
        fs::write(board_dir.join("Config.plist"), &fixture.config_plist)
            .expect("Failed to write Config.plist");
        for (file_name, contents) in &fixture.payloads {
            fs::write(board_dir.join(file_name), contents).expect("Failed to write payload");
        }
    }
    if boards.is_empty() {
        fs::create_dir_all(esd.join("Packages/FirmwareUpdate.pkg/Scripts/Tools/USBCUpdater"))
            .expect("Failed to create updater dir");
    }

    let base_system = if legacy {
        esd.join("BaseSystem.dmg")
    } else {
        app.join("Contents/SharedSupport/BaseSystem.dmg")
    };
    let core_services = base_system.join("System/Library/CoreServices");
    fs::create_dir_all(&core_services).expect("Failed to create CoreServices");
    fs::write(
        core_services.join("SystemVersion.plist"),
        system_version_plist(version, build),
    )
    .expect("Failed to write SystemVersion.plist");

    app
}

/// Build an installer app whose container has no FirmwareUpdate.pkg.
pub fn build_installer_without_package(
    parent: &Path,
    name: &str,
    version: &str,
    build: &str,
) -> PathBuf {
    let app = parent.join(format!("{name}.app"));
    let esd = app.join("Contents/SharedSupport/InstallESD.dmg");
    fs::create_dir_all(esd.join("Packages")).expect("Failed to create Packages dir");

    let core_services = app.join("Contents/SharedSupport/BaseSystem.dmg/System/Library/CoreServices");
    fs::create_dir_all(&core_services).expect("Failed to create CoreServices");
    fs::write(
        core_services.join("SystemVersion.plist"),
        system_version_plist(version, build),
    )
    .expect("Failed to write SystemVersion.plist");

    app
}

/// Plant the marker that makes the mock pkgutil refuse to expand the
/// installer's firmware package.
pub fn damage_firmware_package(app: &Path) {
    let package = app.join("Contents/SharedSupport/InstallESD.dmg/Packages/FirmwareUpdate.pkg");
    fs::write(package.join("damaged"), b"").expect("Failed to mark the package damaged");
}

/// One standard valid board fixture with a payload file.
pub fn standard_board(board: &str) -> BoardFixture {
    BoardFixture::new(
        board,
        board_config_plist(&[thunderbolt_entry("TBT_0x0E_25.75.bin", "25.75", 1, 5558, 2)]),
    )
    .with_payload("TBT_0x0E_25.75.bin", b"firmware-bytes")
}
