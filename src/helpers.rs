/// Strips one pair of matching surrounding quotes from a configured value.
///
/// Configuration files sometimes carry allow-list entries as `"music"` or
/// `'music'`; the comparison in the path policy works on the bare value.
pub fn unquote(value: &str) -> &str {
    let trimmed = value.trim();
    if trimmed.len() >= 2 {
        let bytes = trimmed.as_bytes();
        if (bytes[0] == b'"' && bytes[trimmed.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[trimmed.len() - 1] == b'\'')
        {
            return &trimmed[1..trimmed.len() - 1];
        }
    }
    trimmed
}

/// Escapes the characters that would break out of generated HTML text.
pub fn html_escape(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unquote_strips_matching_quotes() {
        assert_eq!(unquote("\"music\""), "music");
        assert_eq!(unquote("'music'"), "music");
        assert_eq!(unquote("music"), "music");
        assert_eq!(unquote(" \"music\" "), "music");
    }

    #[test]
    fn unquote_ignores_unbalanced_quotes() {
        assert_eq!(unquote("\"music"), "\"music");
        assert_eq!(unquote("music'"), "music'");
    }

    #[test]
    fn html_escape_covers_markup_characters() {
        assert_eq!(html_escape("a<b>&\"c\""), "a&lt;b&gt;&amp;&quot;c&quot;");
        assert_eq!(html_escape("plain.mp3"), "plain.mp3");
    }
}
