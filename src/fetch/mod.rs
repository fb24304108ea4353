// src/fetch/mod.rs
pub mod chat;
pub mod finance;
pub mod news;
pub mod trends;
pub mod types;

/// Normalize feed text: decode HTML entities, strip tags, unify quotes,
/// collapse whitespace, cap length.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    // 3) Normalize curly quotes to ASCII
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();
    out = out.trim().to_string();

    // 5) Length cap: 500 chars is plenty for a headline or blurb
    if out.chars().count() > 500 {
        out = out.chars().take(500).collect();
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_decodes_and_strips() {
        let s = "  <b>Markets&nbsp;rally</b> as &amp; when \u{201C}data\u{201D}   lands ";
        assert_eq!(normalize_text(s), "Markets rally as & when \"data\" lands");
    }

    #[test]
    fn normalize_text_caps_length() {
        let s = "x".repeat(900);
        assert_eq!(normalize_text(&s).chars().count(), 500);
    }
}
