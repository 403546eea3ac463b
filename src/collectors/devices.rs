use log::debug;
use std::path::Path;
use std::time::Instant;
use walkdir::WalkDir;

/// File name prefixes of USB-serial (FTDI, CP210x) and USB-ACM (CDC) nodes.
pub const DEVICE_PREFIXES: [&str; 2] = ["ttyUSB", "ttyACM"];

/// Lists candidate serial devices directly under `dev_dir`.
///
/// USB-serial matches come first, then USB-ACM matches, each sorted by name.
/// A missing or unreadable directory yields an empty list; the caller decides
/// whether that is fatal. The result is informational only and is never used
/// to filter the configured sensor ports.
pub fn find_usb_devices<P: AsRef<Path>>(dev_dir: P) -> Vec<String> {
    let start = Instant::now();
    let mut groups: [Vec<String>; 2] = Default::default();

    let entries = WalkDir::new(dev_dir.as_ref())
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok);

    for entry in entries {
        let name = entry.file_name().to_string_lossy();
        if let Some(group) = DEVICE_PREFIXES
            .iter()
            .position(|prefix| name.starts_with(prefix))
        {
            groups[group].push(entry.path().display().to_string());
        }
    }

    let devices = groups.concat();
    debug!(
        "find_usb_devices found {} in {} ms",
        devices.len(),
        start.elapsed().as_millis()
    );
    devices
}
