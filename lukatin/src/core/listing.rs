//! Numbered file listings produced by the `Read` tool.

/// Window and width limits for one listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListingWindow {
    /// 1-based first line.
    pub offset: usize,
    pub limit: usize,
    pub max_line_chars: usize,
}

const TRUNCATED_LINE: &str = "... [truncated - line too long]";

/// Renders `text` as a header followed by `%6d\t<line>` rows.
pub fn render_listing(name: &str, size_bytes: usize, text: &str, window: ListingWindow) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let total = lines.len();
    let offset = window.offset.max(1);
    let start = offset - 1;

    if start >= total {
        return format!(
            "No lines in specified range (offset: {offset}, limit: {}). File has {total} total lines.",
            window.limit
        );
    }
    let end = start.saturating_add(window.limit).min(total);

    let mut header = format!(
        "File: {name} | Size: {size_bytes} bytes | Lines: {total} | Showing lines {}-{end}",
        start + 1
    );
    if end < total {
        header.push_str(" | Truncated (use offset/limit for more)");
    }

    let mut out = String::with_capacity(header.len() * 2 + text.len().min(1 << 20));
    out.push_str(&header);
    out.push('\n');
    out.push_str(&"=".repeat(header.chars().count()));
    out.push('\n');
    for (i, line) in lines[start..end].iter().enumerate() {
        out.push_str(&format!("{:>6}\t", start + i + 1));
        push_clipped(&mut out, line, window.max_line_chars);
        out.push('\n');
    }
    out
}

fn push_clipped(out: &mut String, line: &str, max_chars: usize) {
    match line.char_indices().nth(max_chars) {
        Some((cut, _)) => {
            out.push_str(&line[..cut]);
            out.push_str(TRUNCATED_LINE);
        }
        None => out.push_str(line),
    }
}

/// Heuristic: a NUL byte in the first 8 KiB marks the content as binary.
pub fn looks_binary(bytes: &[u8]) -> bool {
    bytes.iter().take(8 * 1024).any(|b| *b == 0)
}
