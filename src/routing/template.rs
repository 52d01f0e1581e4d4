//! Placeholder substitution for served text files.
//!
//! Only a fixed set of placeholders is recognised; everything else in the
//! file is passed through untouched. Values are HTML-escaped.

/// Values available to a served page.
#[derive(Debug, Clone, Copy)]
pub struct Substitutions<'a> {
    pub csrf_token: &'a str,
    pub identity: &'a str,
    pub app: &'a str,
}

/// Replace `{{csrf_token}}`, `{{identity}}` and `{{app}}` in `text`.
pub fn render(text: &str, subs: &Substitutions<'_>) -> String {
    if !text.contains("{{") {
        return text.to_string();
    }

    text.replace("{{csrf_token}}", &escape_html(subs.csrf_token))
        .replace("{{identity}}", &escape_html(subs.identity))
        .replace("{{app}}", &escape_html(subs.app))
}

pub fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
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
