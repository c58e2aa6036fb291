//! One location block after inheritance from its virtual server.

use std::collections::HashMap;

use crate::config::LocationConf;
use crate::http::{HttpStatus, Method};

/// Effective per-location settings: the raw [`LocationConf`] with the
/// virtual server's `root`, `index`, `client_max_body_size` and
/// `error_page` entries merged in.
#[derive(Debug, Clone)]
pub struct LocationDirective {
    pattern: String,
    backward_match: bool,
    allowed_methods: Vec<Method>,
    root: String,
    index_pages: Vec<String>,
    client_max_body_size: u64,
    error_pages: HashMap<u16, String>,
    autoindex: bool,
    redirect: Option<(u16, String)>,
    upload_store: Option<String>,
    cgi_interpreters: Vec<(String, String)>,
}

impl LocationDirective {
    pub fn from_conf(
        conf: &LocationConf,
        server_root: &str,
        server_index: &[String],
        server_max_body: u64,
        server_error_pages: &HashMap<u16, String>,
    ) -> Self {
        // error_page merges: server entries as the base, location wins.
        let mut error_pages = server_error_pages.clone();
        for (code, target) in &conf.error_pages {
            error_pages.insert(*code, target.clone());
        }

        LocationDirective {
            pattern: conf.pattern.clone(),
            backward_match: conf.backward_match,
            allowed_methods: conf
                .allowed_methods
                .clone()
                .unwrap_or_else(|| vec![Method::Get]),
            root: conf.root.clone().unwrap_or_else(|| server_root.to_string()),
            index_pages: conf
                .index_pages
                .clone()
                .unwrap_or_else(|| server_index.to_vec()),
            client_max_body_size: conf.client_max_body_size.unwrap_or(server_max_body),
            error_pages,
            autoindex: conf.autoindex.unwrap_or(false),
            redirect: conf.redirect.clone(),
            upload_store: conf.upload_store.clone(),
            cgi_interpreters: conf.cgi_interpreters.clone(),
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn pattern_len(&self) -> usize {
        self.pattern.len()
    }

    pub fn is_match(&self, path: &str) -> bool {
        if self.backward_match {
            path.ends_with(&self.pattern)
        } else {
            path.starts_with(&self.pattern)
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn index_pages(&self) -> &[String] {
        &self.index_pages
    }

    pub fn client_max_body_size(&self) -> u64 {
        self.client_max_body_size
    }

    pub fn is_autoindex_enabled(&self) -> bool {
        self.autoindex
    }

    pub fn redirect(&self) -> Option<(HttpStatus, &str)> {
        self.redirect
            .as_ref()
            .map(|(code, target)| (HttpStatus(*code), target.as_str()))
    }

    pub fn upload_store(&self) -> Option<&str> {
        self.upload_store.as_deref()
    }

    pub fn is_cgi_enabled(&self) -> bool {
        !self.cgi_interpreters.is_empty()
    }

    pub fn is_method_allowed(&self, method: Method) -> bool {
        self.allowed_methods.contains(&method)
    }

    /// `Allow` value for 405 responses (RFC 9110 §10.2.1).
    pub fn allow_header_value(&self) -> String {
        self.allowed_methods
            .iter()
            .map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn error_page_target(&self, status: HttpStatus) -> Option<&str> {
        self.error_pages.get(&status.code()).map(|s| s.as_str())
    }

    /// Strips the matched prefix from `path`, yielding the path under this
    /// location's root (always `/`-prefixed, `/` when nothing remains).
    /// Suffix-matched locations keep the full path.
    pub fn strip_pattern(&self, path: &str) -> String {
        let rest = if self.backward_match {
            path
        } else {
            path.strip_prefix(self.pattern.as_str()).unwrap_or(path)
        };
        if rest.is_empty() {
            "/".to_string()
        } else if rest.starts_with('/') {
            rest.to_string()
        } else {
            format!("/{}", rest)
        }
    }

    /// Finds the CGI script boundary in `path`: the earliest configured
    /// extension occurrence that ends at a `/` or at the end of the path.
    /// Longer extensions win at the same position. Returns
    /// `(interpreter, extension, script_name_end)`.
    pub fn choose_cgi_executor(&self, path: &str) -> Option<(&str, &str, usize)> {
        let bytes = path.as_bytes();
        let mut extensions: Vec<&(String, String)> = self.cgi_interpreters.iter().collect();
        extensions.sort_by_key(|(ext, _)| std::cmp::Reverse(ext.len()));

        for i in 0..bytes.len() {
            for (ext, interpreter) in &extensions {
                let end = i + ext.len();
                if end > bytes.len() {
                    continue;
                }
                if &bytes[i..end] != ext.as_bytes() {
                    continue;
                }
                if end == bytes.len() || bytes[end] == b'/' {
                    return Some((interpreter.as_str(), ext.as_str(), end));
                }
            }
        }
        None
    }

    /// Index candidate URI paths for a directory request, in configured
    /// order. Empty when the request is not a directory URI or no `index`
    /// is configured.
    pub fn index_candidate_uris(&self, request_path: &str) -> Vec<String> {
        if !request_path.ends_with('/') {
            return Vec::new();
        }
        self.index_pages
            .iter()
            .map(|name| format!("{}{}", request_path, name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location(conf: LocationConf) -> LocationDirective {
        LocationDirective::from_conf(&conf, "/srv/www", &[], 1024, &HashMap::new())
    }

    #[test]
    fn prefix_and_suffix_matching() {
        let prefix = location(LocationConf {
            pattern: "/img".to_string(),
            ..LocationConf::default()
        });
        assert!(prefix.is_match("/img/a.png"));
        assert!(!prefix.is_match("/static/img"));

        let suffix = location(LocationConf {
            pattern: ".jpg".to_string(),
            backward_match: true,
            ..LocationConf::default()
        });
        assert!(suffix.is_match("/any/photo.jpg"));
        assert!(!suffix.is_match("/any/photo.png"));
    }

    #[test]
    fn methods_default_to_get() {
        let loc = location(LocationConf {
            pattern: "/".to_string(),
            ..LocationConf::default()
        });
        assert!(loc.is_method_allowed(Method::Get));
        assert!(!loc.is_method_allowed(Method::Post));
        assert_eq!(loc.allow_header_value(), "GET");
    }

    #[test]
    fn strip_pattern_keeps_leading_slash() {
        let loc = location(LocationConf {
            pattern: "/cgi-bin".to_string(),
            ..LocationConf::default()
        });
        assert_eq!(loc.strip_pattern("/cgi-bin/run.py"), "/run.py");
        assert_eq!(loc.strip_pattern("/cgi-bin"), "/");
    }

    #[test]
    fn cgi_extension_must_end_at_boundary() {
        let loc = location(LocationConf {
            pattern: "/".to_string(),
            cgi_interpreters: vec![(".py".to_string(), "/usr/bin/python3".to_string())],
            ..LocationConf::default()
        });

        let (interp, ext, end) = loc.choose_cgi_executor("/cgi/run.py/extra").unwrap();
        assert_eq!(interp, "/usr/bin/python3");
        assert_eq!(ext, ".py");
        assert_eq!(end, "/cgi/run.py".len());

        assert!(loc.choose_cgi_executor("/cgi/run.py").is_some());
        // ".py" embedded mid-segment is not a script boundary.
        assert!(loc.choose_cgi_executor("/cgi/run.pyc").is_none());
    }

    #[test]
    fn longest_extension_wins_at_same_position() {
        let loc = location(LocationConf {
            pattern: "/".to_string(),
            cgi_interpreters: vec![
                (".p".to_string(), "/bin/p".to_string()),
                (".php".to_string(), "/usr/bin/php-cgi".to_string()),
            ],
            ..LocationConf::default()
        });
        let (interp, ext, _) = loc.choose_cgi_executor("/x.php").unwrap();
        assert_eq!(ext, ".php");
        assert_eq!(interp, "/usr/bin/php-cgi");
    }

    #[test]
    fn error_pages_merge_with_location_override() {
        let mut server_pages = HashMap::new();
        server_pages.insert(404, "/err/404.html".to_string());
        server_pages.insert(500, "/err/500.html".to_string());

        let mut conf = LocationConf {
            pattern: "/".to_string(),
            ..LocationConf::default()
        };
        conf.error_pages.insert(404, "/special/404.html".to_string());

        let loc = LocationDirective::from_conf(&conf, "/srv", &[], 0, &server_pages);
        assert_eq!(
            loc.error_page_target(HttpStatus::NOT_FOUND),
            Some("/special/404.html")
        );
        assert_eq!(
            loc.error_page_target(HttpStatus::SERVER_ERROR),
            Some("/err/500.html")
        );
    }
}
