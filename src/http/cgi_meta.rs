//! CGI meta-variables (RFC 3875 §4.1).

use std::collections::BTreeMap;

use super::request::HttpRequest;

/// The environment handed to a CGI child. A sorted map keeps spawn
/// environments deterministic.
#[derive(Debug, Default)]
pub struct CgiMetaVariables {
    variables: BTreeMap<String, String>,
}

impl CgiMetaVariables {
    pub fn new() -> Self {
        let mut v = CgiMetaVariables {
            variables: BTreeMap::new(),
        };
        v.set("GATEWAY_INTERFACE", "CGI/1.1");
        v
    }

    pub fn set(&mut self, name: &str, value: &str) {
        self.variables.insert(name.to_string(), value.to_string());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(|s| s.as_str())
    }

    pub fn all(&self) -> &BTreeMap<String, String> {
        &self.variables
    }

    /// Builds the request-derived portion: method, script/path split, query,
    /// protocol, Content-* and the `HTTP_*` family.
    pub fn from_request(request: &HttpRequest, script_name: &str, path_info: &str) -> Self {
        let mut v = CgiMetaVariables::new();

        v.set("REQUEST_METHOD", &request.method_token);
        v.set("SCRIPT_NAME", script_name);
        v.set("PATH_INFO", path_info);
        v.set("QUERY_STRING", &request.query);
        v.set("SERVER_PROTOCOL", request.http_version());

        if let Some(ct) = request.headers.first("Content-Type") {
            v.set("CONTENT_TYPE", ct);
        }
        if let Some(cl) = request.content_length() {
            v.set("CONTENT_LENGTH", &cl.to_string());
        }

        for (name, values) in request.headers.iter() {
            if values.is_empty() {
                continue;
            }
            let cgi_name = header_to_cgi_name(name);
            // Content-Length / Content-Type have dedicated variables and
            // are not duplicated under HTTP_*.
            if cgi_name == "CONTENT_LENGTH" || cgi_name == "CONTENT_TYPE" {
                continue;
            }
            // Cookie values join per RFC 6265; everything else with commas.
            let separator = if name.eq_ignore_ascii_case("Cookie") {
                "; "
            } else {
                ","
            };
            v.set(&format!("HTTP_{}", cgi_name), &values.join(separator));
        }

        v
    }
}

fn header_to_cgi_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c == '-' {
                '_'
            } else {
                c.to_ascii_uppercase()
            }
        })
        .collect()
}
