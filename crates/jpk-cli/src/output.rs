use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::Table;

/// Create a styled table for output
pub fn create_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS);
    table
}

/// Format a byte size into a human-readable string
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    match bytes {
        b if b >= GB => format!("{:.1}G", b as f64 / GB as f64),
        b if b >= MB => format!("{:.1}M", b as f64 / MB as f64),
        b if b >= KB => format!("{:.1}K", b as f64 / KB as f64),
        b => format!("{b}B"),
    }
}

/// Format an entry's flags (gzip/encryption/hmac) as a compact string
pub fn format_flags(gzip: bool, encryption: bool, hmac: bool) -> String {
    let mut flags = Vec::new();
    if gzip {
        flags.push("gzip");
    }
    if encryption {
        flags.push("enc");
    }
    if hmac {
        flags.push("hmac");
    }
    if flags.is_empty() {
        "-".to_string()
    } else {
        flags.join(",")
    }
}

/// Format a millisecond timestamp the way `IndexEntry`/`DirectoryEntry`
/// store mtime/atime.
pub fn format_mtime(millis: f64) -> String {
    let secs = (millis / 1000.0) as i64;
    chrono::DateTime::from_timestamp(secs, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}
