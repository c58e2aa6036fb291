//! Directory listing HTML generation.

use std::fs;
use std::io;

use crate::router::AutoIndexContext;

use super::templates;

/// Builds the listing body: entries sorted lexicographically, `.` and `..`
/// skipped, a parent link first when not at the URI root. Hrefs are
/// percent-encoded per component, labels HTML-escaped, directories get a
/// trailing slash.
pub fn build_autoindex_body(ctx: &AutoIndexContext) -> io::Result<String> {
    let mut names: Vec<String> = Vec::new();
    for entry in fs::read_dir(ctx.directory_path.as_path())? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.is_empty() || name == "." || name == ".." {
            continue;
        }
        names.push(name);
    }
    names.sort();

    let mut uri = ctx.uri_dir_path.clone();
    if !uri.ends_with('/') {
        uri.push('/');
    }

    let entry_template = templates::load(templates::AUTOINDEX_ENTRY_TEMPLATE);
    let parent_template = templates::load(templates::AUTOINDEX_PARENT_ENTRY_TEMPLATE);

    let mut entries_html = String::new();
    if uri != "/" {
        let parent = parent_uri(&uri);
        entries_html.push_str(&templates::render(
            &parent_template,
            &[("{{HREF}}", &templates::html_escape(&parent))],
        ));
    }

    for name in &names {
        let is_dir = fs::metadata(ctx.directory_path.join_segment(name).as_path())
            .map(|m| m.is_dir())
            .unwrap_or(false);

        let mut href = format!("{}{}", uri, percent_encode_component(name));
        let mut label = name.clone();
        if is_dir {
            href.push('/');
            label.push('/');
        }

        entries_html.push_str(&templates::render(
            &entry_template,
            &[
                ("{{HREF}}", &templates::html_escape(&href)),
                ("{{LABEL}}", &templates::html_escape(&label)),
            ],
        ));
    }

    let title = format!("Index of {}", uri);
    let template = templates::load(templates::AUTOINDEX_TEMPLATE);
    Ok(templates::render(
        &template,
        &[
            ("{{TITLE}}", &templates::html_escape(&title)),
            ("{{PATH}}", &templates::html_escape(&uri)),
            ("{{ENTRIES}}", &entries_html),
        ],
    ))
}

fn parent_uri(uri_dir: &str) -> String {
    let trimmed = uri_dir.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(pos) => trimmed[..=pos].to_string(),
    }
}

fn is_unreserved(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~')
}

fn percent_encode_component(s: &str) -> String {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    let mut out = String::with_capacity(s.len());
    for &b in s.as_bytes() {
        if is_unreserved(b) {
            out.push(b as char);
        } else {
            out.push('%');
            out.push(HEX[(b >> 4) as usize] as char);
            out.push(HEX[(b & 0x0f) as usize] as char);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs_path::PhysicalPath;

    #[test]
    fn percent_encoding_keeps_unreserved() {
        assert_eq!(percent_encode_component("a-b_c.txt"), "a-b_c.txt");
        assert_eq!(percent_encode_component("a b"), "a%20b");
        assert_eq!(percent_encode_component("100%"), "100%25");
    }

    #[test]
    fn parent_links() {
        assert_eq!(parent_uri("/a/b/"), "/a/");
        assert_eq!(parent_uri("/a/"), "/");
        assert_eq!(parent_uri("/"), "/");
    }

    #[test]
    fn listing_contains_sorted_entries_and_parent() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), b"x").unwrap();
        std::fs::write(dir.path().join("a txt"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let ctx = AutoIndexContext {
            directory_path: PhysicalPath::resolve(dir.path().to_str().unwrap()).unwrap(),
            uri_dir_path: "/dir/".to_string(),
            index_candidates: Vec::new(),
            autoindex_enabled: true,
        };
        let body = build_autoindex_body(&ctx).unwrap();

        assert!(body.contains("<a href=\"/dir/a%20txt\">a txt</a>"));
        assert!(body.contains("<a href=\"/dir/b.txt\">b.txt</a>"));
        assert!(body.contains("<a href=\"/dir/sub/\">sub/</a>"));
        assert!(body.contains("<a href=\"/\">..</a>"));
        // Sorted: "a txt" before "b.txt" before "sub".
        let a = body.find("a%20txt").unwrap();
        let b = body.find("b.txt").unwrap();
        let s = body.find("sub/").unwrap();
        assert!(a < b && b < s);
    }
}
