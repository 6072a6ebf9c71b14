use std::borrow::Cow;

/// Returns true for bytes that must never reach a display surface.
///
/// Tab, newline and carriage return are kept; every other C0 control,
/// ESC and DEL are rejected.
#[inline]
fn is_unsafe_control(b: u8) -> bool {
    b == 0x1b || b == 0x7f || (b < 0x20 && b != 0x09 && b != 0x0a && b != 0x0d)
}

/// Removes markup tags from text.
///
/// Everything from a `<` up to and including the next `>` is dropped. A `<`
/// that is never closed drops the remainder of the string, so a truncated
/// tag cannot leak half an attribute into the output.
///
/// Returns `Cow::Borrowed` when the input contains no `<`.
///
/// # Examples
///
/// ```
/// use feedr::util::strip_tags;
///
/// assert_eq!(strip_tags("<p>Hello <b>world</b></p>"), "Hello world");
/// assert_eq!(strip_tags("plain"), "plain");
/// assert_eq!(strip_tags("cut <a href=\"x"), "cut ");
/// ```
pub fn strip_tags(s: &str) -> Cow<'_, str> {
    if !s.contains('<') {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(open) = rest.find('<') {
        out.push_str(&rest[..open]);
        match rest[open..].find('>') {
            Some(close) => rest = &rest[open + close + 1..],
            None => return Cow::Owned(out),
        }
    }
    out.push_str(rest);

    Cow::Owned(out)
}

/// Drops every character above U+007F.
///
/// This is the "strip high" half of value sanitization: normalized feed
/// values are plain ASCII no matter what the source document carried.
pub fn strip_high(s: &str) -> Cow<'_, str> {
    if s.is_ascii() {
        return Cow::Borrowed(s);
    }
    Cow::Owned(s.chars().filter(char::is_ascii).collect())
}

/// SEC-001: Strip terminal control characters and ANSI escape sequences from text.
///
/// Strips:
/// - ASCII control chars: 0x00-0x08, 0x0B-0x0C, 0x0E-0x1F, 0x7F
/// - ANSI CSI sequences: `\x1b[` ... (terminal byte 0x40-0x7E)
/// - ANSI OSC sequences: `\x1b]` ... (until BEL 0x07 or ST `\x1b\\`)
/// - Bare ESC (0x1b) not followed by `[` or `]`
///
/// Preserves: tab (0x09), newline (0x0A), carriage return (0x0D).
///
/// Returns `Cow::Borrowed` when the input contains no control characters (common case).
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    let bytes = s.as_bytes();

    if !bytes.iter().any(|&b| is_unsafe_control(b)) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut run_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if !is_unsafe_control(b) {
            i += 1;
            continue;
        }

        // Flush the safe run before the control byte. Control bytes are ASCII,
        // so they can never split a multi-byte code point.
        out.push_str(&s[run_start..i]);
        i += 1;

        if b == 0x1b {
            match bytes.get(i) {
                Some(b'[') => {
                    i += 1;
                    while let Some(&c) = bytes.get(i) {
                        i += 1;
                        if (0x40..=0x7e).contains(&c) {
                            break;
                        }
                    }
                }
                Some(b']') => {
                    i += 1;
                    while let Some(&c) = bytes.get(i) {
                        if c == 0x07 {
                            i += 1;
                            break;
                        }
                        if c == 0x1b && bytes.get(i + 1) == Some(&b'\\') {
                            i += 2;
                            break;
                        }
                        i += 1;
                    }
                }
                _ => {}
            }
        }

        run_start = i;
    }
    out.push_str(&s[run_start..]);

    Cow::Owned(out)
}
