//! File name and content checks for incoming and exported files.

/// Longest file name (in bytes) most filesystems accept.
const MAX_FILENAME_BYTES: usize = 255;

/// Reduce a user-supplied name to a single safe path component.
///
/// Strips directory parts, replaces characters that are reserved on common
/// filesystems, and truncates to 255 bytes while keeping the extension.
pub fn sanitize_filename(filename: &str) -> String {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);

    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '|' | '?' | '*' | '\0' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let sanitized = sanitized.trim();
    if sanitized.is_empty() || sanitized == "." || sanitized == ".." {
        return "unnamed_file".to_string();
    }

    if sanitized.len() <= MAX_FILENAME_BYTES {
        return sanitized.to_string();
    }

    match sanitized.rfind('.') {
        Some(dot_pos) if sanitized.len() - dot_pos < MAX_FILENAME_BYTES => {
            let ext = &sanitized[dot_pos..];
            let stem = truncate_at_char_boundary(&sanitized[..dot_pos], MAX_FILENAME_BYTES - ext.len());
            format!("{}{}", stem, ext)
        }
        _ => truncate_at_char_boundary(sanitized, MAX_FILENAME_BYTES).to_string(),
    }
}

fn truncate_at_char_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Whether the bytes carry the PDF magic signature.
pub fn is_pdf(data: &[u8]) -> bool {
    infer::get(data).is_some_and(|kind| kind.mime_type() == "application/pdf")
}
