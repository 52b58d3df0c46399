//! Unit name <-> systemd object path encoding.
//!
//! systemd exposes every unit at `/org/freedesktop/systemd1/unit/<label>`,
//! where `<label>` keeps ASCII letters and digits and writes every other
//! byte as `_` plus two lowercase hex digits (`api.service` becomes
//! `api_2eservice`). A leading digit is escaped too since object path
//! elements may not start with one.

pub const UNIT_PATH_PREFIX: &str = "/org/freedesktop/systemd1/unit";

/// Escape a unit name into a single object path element.
pub fn encode(name: &str) -> String {
    if name.is_empty() {
        return "_".to_string();
    }

    let mut label = String::with_capacity(name.len());
    for (i, byte) in name.bytes().enumerate() {
        let plain = byte.is_ascii_alphabetic() || (i > 0 && byte.is_ascii_digit());
        if plain {
            label.push(char::from(byte));
        } else {
            label.push('_');
            label.push_str(&format!("{byte:02x}"));
        }
    }
    label
}

/// Reverse of [`encode`]. Malformed escapes are kept as-is.
pub fn decode(label: &str) -> String {
    if label == "_" {
        return String::new();
    }

    let bytes = label.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'_' && i + 2 < bytes.len() {
            if let Some(byte) = hex_pair(bytes[i + 1], bytes[i + 2]) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Full object path for a unit name.
pub fn unit_path(name: &str) -> String {
    format!("{UNIT_PATH_PREFIX}/{}", encode(name))
}

/// Unit name from a full object path (its last element).
pub fn unit_name(path: &str) -> String {
    let label = path.rsplit('/').next().unwrap_or(path);
    decode(label)
}

fn hex_pair(hi: u8, lo: u8) -> Option<u8> {
    let hi = char::from(hi).to_digit(16)?;
    let lo = char::from(lo).to_digit(16)?;
    u8::try_from(hi * 16 + lo).ok()
}
