use std::borrow::Cow;

/// Characters that force a token half into double quotes.
///
/// Line breaks and tabs are included so that a rendered command always
/// stays on one line.
const SPECIAL_CHARS: &[char] = &[' ', ',', '=', '"', '\n', '\r', '\t'];

pub fn needs_quoting(token: &str) -> bool {
    token.contains(SPECIAL_CHARS)
}

/// Append `token` to `out`, quoting it when required.
///
/// Inside quotes `"` is doubled and `\n`/`\r` become the two-character
/// escapes `\n`/`\r`.
pub fn write_token(out: &mut String, token: &str) {
    if !needs_quoting(token) {
        out.push_str(token);
        return;
    }

    out.reserve(token.len() + 2);
    out.push('"');
    for ch in token.chars() {
        match ch {
            '"' => out.push_str("\"\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out.push('"');
}

pub fn quote(token: &str) -> Cow<'_, str> {
    if needs_quoting(token) {
        let mut out = String::with_capacity(token.len() + 2);
        write_token(&mut out, token);
        Cow::Owned(out)
    } else {
        Cow::Borrowed(token)
    }
}
