//! One virtual server: a `server { }` block with its locations merged.

use std::net::IpAddr;

use crate::config::{Listen, VirtualServerConf};
use crate::http::HttpStatus;

use super::location::LocationDirective;

#[derive(Debug)]
pub struct VirtualServer {
    listens: Vec<Listen>,
    server_names: Vec<String>,
    error_pages: std::collections::HashMap<u16, String>,
    locations: Vec<LocationDirective>,
}

impl VirtualServer {
    pub fn from_conf(conf: &VirtualServerConf) -> Self {
        let locations = conf
            .locations
            .iter()
            .map(|loc| {
                LocationDirective::from_conf(
                    loc,
                    &conf.root,
                    &conf.index_pages,
                    conf.client_max_body_size,
                    &conf.error_pages,
                )
            })
            .collect();

        VirtualServer {
            listens: conf.listens.clone(),
            server_names: conf.server_names.clone(),
            error_pages: conf.error_pages.clone(),
            locations,
        }
    }

    pub fn listens_on(&self, ip: IpAddr, port: u16) -> bool {
        self.listens.iter().any(|l| l.matches(ip, port))
    }

    pub fn has_server_name(&self, name: &str) -> bool {
        self.server_names.iter().any(|n| n == name)
    }

    /// Longest matching location; declaration order breaks ties.
    pub fn find_location(&self, path: &str) -> Option<&LocationDirective> {
        let mut best: Option<&LocationDirective> = None;
        let mut best_len = 0usize;
        for location in &self.locations {
            if !location.is_match(path) {
                continue;
            }
            let len = location.pattern_len();
            if best.is_none() || len > best_len {
                best = Some(location);
                best_len = len;
            }
        }
        best
    }

    pub fn error_page_target(&self, status: HttpStatus) -> Option<&str> {
        self.error_pages.get(&status.code()).map(|s| s.as_str())
    }
}
