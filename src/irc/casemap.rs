//! RFC 1459 case mapping.
//!
//! Channel names and nicknames compare case-insensitively, with `[]\~`
//! treated as the uppercase forms of `{}|^`.

pub fn lower_char(c: char) -> char {
    match c {
        '[' => '{',
        ']' => '}',
        '\\' => '|',
        '~' => '^',
        _ => c.to_ascii_lowercase(),
    }
}

/// Fold a name to its canonical lowercase key.
pub fn fold(s: &str) -> String {
    s.chars().map(lower_char).collect()
}

pub fn eq(a: &str, b: &str) -> bool {
    a.len() == b.len()
        && a.chars()
            .zip(b.chars())
            .all(|(x, y)| lower_char(x) == lower_char(y))
}
