/// Replaces filesystem-unsafe characters in a video title.
///
/// Every one of `/ \ : * ? " < > |` becomes `-`, control characters are dropped and
/// surrounding whitespace is trimmed. The result is safe to embed in a filename or
/// a `Content-Disposition` header value.
///
/// # Example
///
/// ```
/// use vidgrab::core::utils::sanitize_title;
///
/// assert_eq!(sanitize_title("AC/DC: Live?"), "AC-DC- Live-");
/// ```
pub fn sanitize_title(title: &str) -> String {
    let mut result = String::with_capacity(title.len());

    for c in title.trim().chars() {
        match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => result.push('-'),
            c if c.is_control() => {}
            _ => result.push(c),
        }
    }

    result
}

/// Title shown to the user and used as the download filename stem: `"<title> [<quality>p]"`.
pub fn display_title(title: &str, quality_label: &str) -> String {
    format!("{} [{}p]", title, quality_label)
}

/// Builds a `Content-Disposition: attachment` value for `filename`.
///
/// Header values must be visible ASCII, so non-ASCII characters are replaced with `_`
/// in the plain `filename` parameter and the exact name is carried in the RFC 5987
/// `filename*` parameter.
pub fn attachment_disposition(filename: &str) -> String {
    let ascii_fallback: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii() && !c.is_ascii_control() => c,
            _ => '_',
        })
        .collect();

    if ascii_fallback == filename {
        format!("attachment; filename=\"{}\"", ascii_fallback)
    } else {
        format!(
            "attachment; filename=\"{}\"; filename*=UTF-8''{}",
            ascii_fallback,
            urlencoding::encode(filename)
        )
    }
}
