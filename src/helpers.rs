use core::num::ParseIntError;

/// Convert a byte slice into a lowercase hex string.
pub fn hexify(buf: &[u8]) -> String {
    let mut hexstr = String::with_capacity(buf.len() * 2);
    for &b in buf {
        hexstr.push_str(&format!("{:02x}", b));
    }
    hexstr
}

/// Convert an even-length hex string into a byte vector.
pub fn unhexify(s: &str) -> Result<Vec<u8>, ParseIntError> {
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16))
        .collect()
}

/// Value of a single hex digit, `None` for anything else.
pub fn hex_nibble(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}
