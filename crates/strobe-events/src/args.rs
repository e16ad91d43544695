//! Printf-style name formatting over tagged argument values.
//!
//! Instrumentation calls pass a format string plus an ordered sequence of
//! [`Arg`] values instead of native varargs. The walker consumes the sequence
//! positionally and must never fail: missing numeric arguments format as a
//! literal `0`, extra arguments are ignored, and a `%` sequence without a
//! valid conversion character degrades to a literal copy of the remaining
//! format text.

/// One formatting argument. A closed variant over the kinds the conversion
/// specifiers can consume.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Arg<'a> {
    Str(&'a str),
    Int(i64),
    Uint(u64),
    Float(f64),
    Char(char),
    Ptr(u64),
}

/// At most this many arguments are consumed; the rest are ignored.
pub const MAX_FORMAT_ARGS: usize = 16;

impl Arg<'_> {
    /// Integral view, used for `*` width/precision and the integer
    /// conversions. Non-numeric kinds coerce to something sensible rather
    /// than failing.
    fn as_i64(&self) -> i64 {
        match *self {
            Arg::Int(v) => v,
            Arg::Uint(v) => v as i64,
            Arg::Float(v) => v as i64,
            Arg::Char(c) => c as i64,
            Arg::Ptr(v) => v as i64,
            Arg::Str(_) => 0,
        }
    }

    fn as_u64(&self) -> u64 {
        match *self {
            Arg::Int(v) => v as u64,
            Arg::Uint(v) => v,
            Arg::Float(v) => v as u64,
            Arg::Char(c) => c as u64,
            Arg::Ptr(v) => v,
            Arg::Str(_) => 0,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match *self {
            Arg::Float(v) => Some(v),
            Arg::Int(v) => Some(v as f64),
            Arg::Uint(v) => Some(v as f64),
            _ => None,
        }
    }
}

#[derive(Default)]
struct Spec {
    left_align: bool,
    zero_pad: bool,
    width: Option<usize>,
    precision: Option<usize>,
}

struct ArgCursor<'a, 'b> {
    args: &'b [Arg<'a>],
    next: usize,
}

impl<'a> ArgCursor<'a, '_> {
    fn take(&mut self) -> Option<Arg<'a>> {
        if self.next >= self.args.len() || self.next >= MAX_FORMAT_ARGS {
            return None;
        }
        let arg = self.args[self.next];
        self.next += 1;
        Some(arg)
    }
}

/// Expand `fmt` against `args`. This is what gets serialized as the record's
/// name payload.
pub fn format_name(fmt: &str, args: &[Arg]) -> String {
    let mut out = String::with_capacity(fmt.len());
    let mut cursor = ArgCursor { args, next: 0 };
    let mut rest = fmt;

    while let Some(percent) = rest.find('%') {
        out.push_str(&rest[..percent]);
        let spec_start = &rest[percent..];
        let after_percent = &spec_start[1..];

        if let Some(stripped) = after_percent.strip_prefix('%') {
            out.push('%');
            rest = stripped;
            continue;
        }

        match parse_and_format(after_percent, &mut cursor, &mut out) {
            Some(remaining) => rest = remaining,
            None => {
                // Malformed trailing specifier: copy the remainder verbatim,
                // '%' included, and stop.
                out.push_str(spec_start);
                return out;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Parse one conversion after the `%` and append its expansion. Returns the
/// unconsumed tail of the format string, or `None` when no valid conversion
/// character is found.
fn parse_and_format<'f>(
    input: &'f str,
    args: &mut ArgCursor<'_, '_>,
    out: &mut String,
) -> Option<&'f str> {
    let bytes = input.as_bytes();
    let mut pos = 0;
    let mut spec = Spec::default();

    while pos < bytes.len() {
        match bytes[pos] {
            b'-' => spec.left_align = true,
            b'0' => spec.zero_pad = true,
            b'+' | b' ' | b'#' => {}
            _ => break,
        }
        pos += 1;
    }

    if pos < bytes.len() && bytes[pos] == b'*' {
        pos += 1;
        // No argument to consume for `*` degrades to a literal copy.
        spec.width = Some(args.take()?.as_i64().max(0) as usize);
    } else {
        let (value, len) = read_digits(&bytes[pos..]);
        if len > 0 {
            spec.width = Some(value);
        }
        pos += len;
    }

    if pos < bytes.len() && bytes[pos] == b'.' {
        pos += 1;
        if pos < bytes.len() && bytes[pos] == b'*' {
            pos += 1;
            spec.precision = Some(args.take()?.as_i64().max(0) as usize);
        } else {
            let (value, len) = read_digits(&bytes[pos..]);
            // "%.s" means precision zero, like printf.
            spec.precision = Some(if len > 0 { value } else { 0 });
            pos += len;
        }
    }

    let conversion = *bytes.get(pos)?;
    pos += 1;

    let formatted = match conversion {
        b's' | b'S' => {
            let mut text = match args.take() {
                Some(Arg::Str(s)) => s.to_owned(),
                // A non-string (or missing) argument formats as empty rather
                // than reading through a bogus pointer.
                _ => String::new(),
            };
            if let Some(precision) = spec.precision {
                text.truncate(
                    text.char_indices()
                        .nth(precision)
                        .map(|(i, _)| i)
                        .unwrap_or(text.len()),
                );
            }
            text
        }
        b'd' | b'i' => match args.take() {
            Some(arg) => arg.as_i64().to_string(),
            None => "0".to_owned(),
        },
        b'u' => match args.take() {
            Some(arg) => arg.as_u64().to_string(),
            None => "0".to_owned(),
        },
        b'x' => match args.take() {
            Some(arg) => format!("{:x}", arg.as_u64()),
            None => "0".to_owned(),
        },
        b'c' => match args.take() {
            Some(Arg::Char(c)) => c.to_string(),
            Some(arg) => char::from_u32(arg.as_u64() as u32)
                .unwrap_or('\u{FFFD}')
                .to_string(),
            None => "0".to_owned(),
        },
        b'f' => match args.take().and_then(|a| a.as_f64()) {
            Some(value) => format!("{:.*}", spec.precision.unwrap_or(6), value),
            None => "0".to_owned(),
        },
        b'p' => match args.take() {
            Some(arg) => format!("{:016X}", arg.as_u64()),
            None => "0".to_owned(),
        },
        _ => return None,
    };

    push_padded(out, &formatted, &spec);
    Some(&input[pos..])
}

fn read_digits(bytes: &[u8]) -> (usize, usize) {
    let mut value = 0usize;
    let mut len = 0;
    while len < bytes.len() && bytes[len].is_ascii_digit() {
        value = value.saturating_mul(10) + (bytes[len] - b'0') as usize;
        len += 1;
    }
    (value, len)
}

fn push_padded(out: &mut String, text: &str, spec: &Spec) {
    let width = spec.width.unwrap_or(0);
    let chars = text.chars().count();
    if chars >= width {
        out.push_str(text);
        return;
    }
    let pad = width - chars;
    if spec.left_align {
        out.push_str(text);
        out.extend(std::iter::repeat_n(' ', pad));
    } else {
        let fill = if spec.zero_pad { '0' } else { ' ' };
        out.extend(std::iter::repeat_n(fill, pad));
        out.push_str(text);
    }
}
