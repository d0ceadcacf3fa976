//! Parsers for compiler-written dependency files.
//!
//! Two formats are understood: make-rule output (`gcc -MD`) and the JSON
//! written by `cl.exe /sourceDependencies`. The entry point sniffs the format
//! from the content (a leading `{` means JSON). Both parsers unescape paths
//! in place by shifting bytes left, so the callback receives borrowed slices
//! of the buffer with no extra allocation.
//!
//! The parsers are deliberately lenient: a malformed suffix simply yields no
//! further paths. Returning `true` from the callback stops the parse, and the
//! function reports whether it stopped early.

const SPACES: &[u8] = b" \n\r";

fn is_space(byte: u8) -> bool {
    byte == b' ' || byte == b'\n' || byte == b'\r'
}

fn find_first_of(data: &[u8], from: usize, set: &[u8]) -> Option<usize> {
    data.get(from..)?.iter().position(|byte| set.contains(byte)).map(|offset| from + offset)
}

/// Skips whitespace, treating a backslash followed by whitespace as
/// whitespace itself (a make line continuation between tokens).
fn skip_whitespace(data: &[u8], pos: &mut usize) {
    while *pos < data.len() {
        let byte = data[*pos];
        if !is_space(byte) && (byte != b'\\' || *pos == data.len() - 1 || !is_space(data[*pos + 1])) {
            break;
        }
        *pos += 1;
    }
}

fn consume(data: &[u8], pos: &mut usize, expected: u8) -> bool {
    if *pos < data.len() && data[*pos] == expected {
        *pos += 1;
        return true;
    }
    false
}

/// Reads one whitespace-delimited make token starting at `pos`, collapsing
/// `\ ` escapes in place. A backslash directly before a newline terminates
/// the token and is dropped. Returns the token's range within `data`.
fn read_gcc_path(data: &mut [u8], pos: &mut usize) -> (usize, usize) {
    let start = *pos;
    let mut last_break = *pos;
    let mut offset = 0;
    let mut trailing_continuation = false;

    loop {
        let mut escaped_space = false;
        let mut stop = false;
        match find_first_of(data, *pos + 1, SPACES) {
            None => {
                *pos = data.len();
                stop = true;
            }
            Some(found) => {
                *pos = found;
                if data[found - 1] != b'\\' {
                    stop = true;
                } else if data[found] == b' ' {
                    escaped_space = true;
                } else {
                    // Backslash-newline: the token ends here and the stray
                    // backslash does not belong to it.
                    stop = true;
                    trailing_continuation = true;
                }
            }
        }
        if offset > 0 {
            data.copy_within(last_break..*pos, last_break - offset);
        }
        if escaped_space {
            offset += 1;
        }
        last_break = *pos;
        if stop {
            break;
        }
    }

    let mut end = *pos - offset;
    if trailing_continuation {
        end -= 1;
    }
    (start, end)
}

/// Reads one JSON string body starting at `pos`, resolving `\\` and `\"`
/// escapes in place. Stops at the closing quote without consuming it.
fn read_cl_path(data: &mut [u8], pos: &mut usize) -> (usize, usize) {
    let start = *pos;
    let mut last_break = *pos;
    let mut offset = 0;

    loop {
        let mut escape = false;
        let mut stop = false;
        match find_first_of(data, *pos + 1, b"\\\"") {
            None => {
                *pos = data.len();
                stop = true;
            }
            Some(found) => {
                if data[found] == b'"' {
                    *pos = found;
                    stop = true;
                } else {
                    *pos = found + 1;
                    escape = true;
                }
            }
        }
        if offset > 0 {
            data.copy_within(last_break..*pos, last_break - offset);
        }
        if escape {
            offset += 1;
        }
        last_break = *pos;
        if stop {
            break;
        }
    }

    (start, *pos - offset)
}

fn emit<F>(data: &[u8], start: usize, end: usize, on_path: &mut F) -> bool
where
    F: FnMut(&str) -> bool,
{
    match std::str::from_utf8(&data[start..end]) {
        Ok(path) => on_path(path),
        // Non-UTF-8 garbage is dropped; the path simply goes untracked.
        Err(_) => false,
    }
}

/// Parses depfile contents, invoking `on_path` for every dependency path.
/// Returns true if the callback requested a stop (or the content ended in a
/// way that prevents further paths from being read).
pub fn parse_dependency_data<F>(data: &mut [u8], mut on_path: F) -> bool
where
    F: FnMut(&str) -> bool,
{
    let mut pos = 0;
    skip_whitespace(data, &mut pos);

    if pos < data.len() && data[pos] != b'{' {
        // Make rule: everything left of the `:` terminated token is an
        // output, everything after it is a dependency.
        let mut scanning_outputs = true;
        while pos < data.len() {
            skip_whitespace(data, &mut pos);
            let (start, end) = read_gcc_path(data, &mut pos);
            if start == end {
                continue;
            }

            if data[end - 1] == b':' {
                scanning_outputs = false;
                continue;
            }

            if scanning_outputs {
                continue;
            }

            if emit(data, start, end, &mut on_path) {
                return true;
            }
        }
    } else {
        let tag = b"\"Includes\"";
        let found = match data.get(pos..).and_then(|rest| {
            rest.windows(tag.len()).position(|window| window == tag)
        }) {
            Some(found) => pos + found,
            None => return true,
        };
        pos = found + tag.len();

        skip_whitespace(data, &mut pos);
        if !consume(data, &mut pos, b':') {
            return true;
        }
        skip_whitespace(data, &mut pos);
        if !consume(data, &mut pos, b'[') {
            return true;
        }

        while pos < data.len() {
            skip_whitespace(data, &mut pos);

            if consume(data, &mut pos, b']') {
                break;
            }
            if !consume(data, &mut pos, b'"') {
                return true;
            }

            let (start, end) = read_cl_path(data, &mut pos);

            if !consume(data, &mut pos, b'"') {
                return true;
            }

            if start != end && emit(data, start, end, &mut on_path) {
                return true;
            }

            skip_whitespace(data, &mut pos);
            if consume(data, &mut pos, b']') {
                break;
            } else if !consume(data, &mut pos, b',') {
                return true;
            }
        }
    }

    false
}
