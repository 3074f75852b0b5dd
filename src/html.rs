//! Small helpers for the HTML we emit (emails, documents, confirmation pages)

/// Escape text for inclusion in HTML element content or quoted attributes
pub fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escaped value, or a placeholder when empty
pub fn or_placeholder(value: Option<&str>, placeholder: &str) -> String {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => escape(v),
        None => escape(placeholder),
    }
}
