//! HTML template loading. Templates live under `server/config/` relative to
//! the working directory; a missing file falls back to the compiled-in
//! minimal version so error pages never fail to render.

use std::fs;

pub const ERROR_PAGE_TEMPLATE: &str = "error_page.html";
pub const AUTOINDEX_TEMPLATE: &str = "autoindex.html";
pub const AUTOINDEX_ENTRY_TEMPLATE: &str = "autoindex_entry.html";
pub const AUTOINDEX_PARENT_ENTRY_TEMPLATE: &str = "autoindex_parent_entry.html";

const DEFAULT_ERROR_PAGE: &str = "<!DOCTYPE html>\n<html>\n<head><title>{{STATUS_LINE}}</title></head>\n<body>\n<h1>{{STATUS_LINE}}</h1>\n<p>{{MESSAGE}}</p>\n<hr><p>webhive</p>\n</body>\n</html>\n";

const DEFAULT_AUTOINDEX: &str = "<!DOCTYPE html>\n<html>\n<head><title>{{TITLE}}</title></head>\n<body>\n<h1>{{TITLE}}</h1>\n<ul>\n{{ENTRIES}}</ul>\n<hr><p>webhive</p>\n</body>\n</html>\n";

const DEFAULT_AUTOINDEX_ENTRY: &str = "<li><a href=\"{{HREF}}\">{{LABEL}}</a></li>\n";

const DEFAULT_AUTOINDEX_PARENT_ENTRY: &str = "<li><a href=\"{{HREF}}\">..</a></li>\n";

pub fn load(name: &str) -> String {
    for dir in ["server/config", "config"] {
        let path = format!("{}/{}", dir, name);
        if let Ok(text) = fs::read_to_string(&path) {
            if !text.is_empty() {
                return text;
            }
        }
    }
    builtin(name).to_string()
}

fn builtin(name: &str) -> &'static str {
    match name {
        ERROR_PAGE_TEMPLATE => DEFAULT_ERROR_PAGE,
        AUTOINDEX_TEMPLATE => DEFAULT_AUTOINDEX,
        AUTOINDEX_ENTRY_TEMPLATE => DEFAULT_AUTOINDEX_ENTRY,
        AUTOINDEX_PARENT_ENTRY_TEMPLATE => DEFAULT_AUTOINDEX_PARENT_ENTRY,
        _ => "",
    }
}

pub fn render(template: &str, replacements: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (from, to) in replacements {
        out = out.replace(from, to);
    }
    out
}

pub fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_covers_markup_characters() {
        assert_eq!(html_escape("a<b>&\"c\""), "a&lt;b&gt;&amp;&quot;c&quot;");
    }

    #[test]
    fn render_replaces_all_occurrences() {
        let out = render("{{X}}-{{X}}", &[("{{X}}", "y")]);
        assert_eq!(out, "y-y");
    }
}
