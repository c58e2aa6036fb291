//! Post-parse configuration checks. The parser accepts anything
//! syntactically well-formed; this pass rejects configurations the server
//! cannot honor.

use super::{ConfigError, ConfigResult, ServerConfig};

pub fn validate_config(config: &ServerConfig) -> ConfigResult<()> {
    if config.servers.is_empty() {
        return Err(ConfigError::new("no 'server' block defined", None));
    }

    for (i, server) in config.servers.iter().enumerate() {
        let label = format!("server #{}", i + 1);

        if server.listens.is_empty() {
            return Err(ConfigError::new(format!("{}: no listen endpoint", label), None));
        }
        if server.root.is_empty() {
            return Err(ConfigError::new(format!("{}: empty root", label), None));
        }
        for (code, _) in &server.error_pages {
            check_error_page_code(*code, &label)?;
        }

        for location in &server.locations {
            let loc_label = format!("{} location '{}'", label, location.pattern);

            if location.pattern.is_empty() {
                return Err(ConfigError::new(format!("{}: empty pattern", label), None));
            }
            if let Some((code, target)) = &location.redirect {
                if !(300..=399).contains(code) {
                    return Err(ConfigError::new(
                        format!("{}: 'return' status {} is not a 3xx code", loc_label, code),
                        None,
                    ));
                }
                if target.is_empty() {
                    return Err(ConfigError::new(
                        format!("{}: empty 'return' target", loc_label),
                        None,
                    ));
                }
            }
            for (code, _) in &location.error_pages {
                check_error_page_code(*code, &loc_label)?;
            }
            for (ext, interpreter) in &location.cgi_interpreters {
                if ext == "." || interpreter.is_empty() {
                    return Err(ConfigError::new(
                        format!("{}: bad cgi_extension entry", loc_label),
                        None,
                    ));
                }
            }
            if let Some(store) = &location.upload_store {
                if store.is_empty() {
                    return Err(ConfigError::new(
                        format!("{}: empty upload_store", loc_label),
                        None,
                    ));
                }
            }
        }
    }

    Ok(())
}

fn check_error_page_code(code: u16, label: &str) -> ConfigResult<()> {
    if !(300..=599).contains(&code) {
        return Err(ConfigError::new(
            format!("{}: error_page code {} out of range", label, code),
            None,
        ));
    }
    Ok(())
}
