//! Field text cleanup applied to every sheet cell before it is stored.

const ZERO_WIDTH_SPACE: char = '\u{200b}';
const BYTE_ORDER_MARK: char = '\u{feff}';

/// Normalise raw cell text.
///
/// Zero-width spaces and byte-order marks are removed and every line break is
/// normalised to `\n`. With `preserve_line_breaks == false` all whitespace runs
/// collapse to one space. Otherwise each line is trimmed, leading and trailing
/// blank lines are dropped and consecutive blank lines collapse to one.
pub fn sanitize(text: &str, preserve_line_breaks: bool) -> String {
    if text.is_empty() {
        return String::new();
    }

    let cleaned: String = text
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .chars()
        .filter(|c| *c != ZERO_WIDTH_SPACE && *c != BYTE_ORDER_MARK)
        .collect();

    if !preserve_line_breaks {
        return cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    }

    let mut lines: Vec<&str> = Vec::new();
    let mut prev_empty = false;
    for line in cleaned.split('\n').map(str::trim) {
        if line.is_empty() {
            // leading blanks are dropped outright
            if !prev_empty && !lines.is_empty() {
                lines.push(line);
            }
            prev_empty = true;
        } else {
            lines.push(line);
            prev_empty = false;
        }
    }
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}

/// Names, relationships, church, gender and age: single line.
pub fn sanitize_name(text: &str) -> String {
    sanitize(text, false)
}

/// Free-text prayer content: paragraph breaks survive.
pub fn sanitize_content(text: &str) -> String {
    sanitize(text, true)
}
