//! IRC case-mapping for registered names.
//!
//! Account names, nicknames and channel names are compared using the
//! `rfc1459` mapping, where `[]\~` fold onto `{}|^` in addition to the
//! usual ASCII lowercasing. Every name index in the crate keys on the
//! folded form produced by [`irc_to_lower`].

/// Fold a single character using the RFC 1459 case mapping.
#[inline]
pub const fn irc_lower_char(c: char) -> char {
    match c {
        '[' => '{',
        ']' => '}',
        '\\' => '|',
        '~' => '^',
        'A'..='Z' => (c as u8 + 32) as char,
        _ => c,
    }
}

/// Fold a whole name for use as a registry key.
pub fn irc_to_lower(s: &str) -> String {
    s.chars().map(irc_lower_char).collect()
}

/// Case-insensitive name comparison under the RFC 1459 mapping.
pub fn irc_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.chars()
        .zip(b.chars())
        .all(|(ca, cb)| irc_lower_char(ca) == irc_lower_char(cb))
}
