/// Escape a text value for a content line.
///
/// Backslashes are escaped first so the escapes added for `;`, `,` and
/// newlines are never escaped twice.
pub fn escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace(';', "\\;")
        .replace(',', "\\,")
        .replace('\n', "\\n")
}

/// Reverse [`escape`].
///
/// Scans left to right so an escaped backslash followed by `n` stays a
/// backslash and an `n`. Unknown escape pairs and a trailing lone backslash
/// are kept as they are.
pub fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(',') => out.push(','),
            Some(';') => out.push(';'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }

    out
}
