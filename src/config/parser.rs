//! Parser for the nginx-like configuration file.
//!
//! ```text
//! server {
//!     listen 127.0.0.1:8080;
//!     server_name example.test;
//!     root ./www;
//!     error_page 404 /errors/404.html;
//!     location /cgi-bin {
//!         allow_methods GET POST;
//!         cgi_extension .py /usr/bin/python3;
//!     }
//!     location back .jpg {
//!         autoindex off;
//!     }
//! }
//! ```
//!
//! `#` starts a comment; simple directives end with `;`. A single-value
//! directive repeated inside one block is an error.

use std::collections::HashMap;
use std::net::IpAddr;
use std::str::FromStr;

use super::{ConfigError, ConfigResult, Listen, LocationConf, ServerConfig, VirtualServerConf};
use crate::http::Method;

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Word(String),
    OpenBrace,
    CloseBrace,
    Semicolon,
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    line: usize,
}

fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut line = 1usize;
    let mut word = String::new();
    let mut word_line = 1usize;
    let mut in_comment = false;

    let mut push_word = |word: &mut String, line: usize, tokens: &mut Vec<Token>| {
        if !word.is_empty() {
            tokens.push(Token {
                kind: TokenKind::Word(std::mem::take(word)),
                line,
            });
        }
    };

    for c in text.chars() {
        if c == '\n' {
            push_word(&mut word, word_line, &mut tokens);
            line += 1;
            in_comment = false;
            continue;
        }
        if in_comment {
            continue;
        }
        match c {
            '#' => {
                push_word(&mut word, word_line, &mut tokens);
                in_comment = true;
            }
            '{' | '}' | ';' => {
                push_word(&mut word, word_line, &mut tokens);
                let kind = match c {
                    '{' => TokenKind::OpenBrace,
                    '}' => TokenKind::CloseBrace,
                    _ => TokenKind::Semicolon,
                };
                tokens.push(Token { kind, line });
            }
            c if c.is_whitespace() => push_word(&mut word, word_line, &mut tokens),
            c => {
                if word.is_empty() {
                    word_line = line;
                }
                word.push(c);
            }
        }
    }
    push_word(&mut word, word_line, &mut tokens);
    tokens
}

struct Parser {
    tokens: Vec<Token>,
    cursor: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Parser { tokens, cursor: 0 }
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.cursor).cloned();
        if t.is_some() {
            self.cursor += 1;
        }
        t
    }

    fn expect_word(&mut self, context: &str) -> ConfigResult<(String, usize)> {
        match self.next() {
            Some(Token {
                kind: TokenKind::Word(w),
                line,
            }) => Ok((w, line)),
            Some(t) => Err(ConfigError::new(
                format!("expected {} argument", context),
                Some(t.line),
            )),
            None => Err(ConfigError::new(
                format!("unexpected end of file in {}", context),
                None,
            )),
        }
    }

    fn expect_open_brace(&mut self, context: &str) -> ConfigResult<()> {
        match self.next() {
            Some(Token {
                kind: TokenKind::OpenBrace,
                ..
            }) => Ok(()),
            Some(t) => Err(ConfigError::new(
                format!("expected '{{' after {}", context),
                Some(t.line),
            )),
            None => Err(ConfigError::new(
                format!("unexpected end of file after {}", context),
                None,
            )),
        }
    }

    /// Collects the word arguments of a simple directive up to `;`.
    fn directive_args(&mut self, directive: &str, line: usize) -> ConfigResult<Vec<String>> {
        let mut args = Vec::new();
        loop {
            match self.next() {
                Some(Token {
                    kind: TokenKind::Word(w),
                    ..
                }) => args.push(w),
                Some(Token {
                    kind: TokenKind::Semicolon,
                    ..
                }) => return Ok(args),
                _ => {
                    return Err(ConfigError::new(
                        format!("missing ';' after '{}'", directive),
                        Some(line),
                    ))
                }
            }
        }
    }
}

pub fn parse_config(text: &str) -> ConfigResult<ServerConfig> {
    let mut parser = Parser::new(tokenize(text));
    let mut config = ServerConfig::default();

    while let Some(token) = parser.next() {
        match token.kind {
            TokenKind::Word(w) if w == "server" => {
                parser.expect_open_brace("'server'")?;
                config.servers.push(parse_server_block(&mut parser)?);
            }
            _ => {
                return Err(ConfigError::new(
                    "expected 'server' block at top level",
                    Some(token.line),
                ))
            }
        }
    }

    Ok(config)
}

fn parse_server_block(parser: &mut Parser) -> ConfigResult<VirtualServerConf> {
    let mut server = VirtualServerConf::default();
    let mut seen = SeenOnce::default();

    loop {
        let token = parser.next().ok_or_else(|| {
            ConfigError::new("unexpected end of file inside 'server' block", None)
        })?;
        let (name, line) = match token.kind {
            TokenKind::CloseBrace => break,
            TokenKind::Word(w) => (w, token.line),
            _ => {
                return Err(ConfigError::new(
                    "expected directive inside 'server' block",
                    Some(token.line),
                ))
            }
        };

        match name.as_str() {
            "listen" => {
                let args = parser.directive_args("listen", line)?;
                if args.len() != 1 {
                    return Err(ConfigError::new("'listen' takes one argument", Some(line)));
                }
                server.listens.push(parse_listen(&args[0], line)?);
            }
            "server_name" => {
                let args = parser.directive_args("server_name", line)?;
                if args.is_empty() {
                    return Err(ConfigError::new("'server_name' needs a name", Some(line)));
                }
                server.server_names.extend(args);
            }
            "root" => {
                seen.mark("root", line)?;
                let args = parser.directive_args("root", line)?;
                if args.len() != 1 {
                    return Err(ConfigError::new("'root' takes one argument", Some(line)));
                }
                server.root = args.into_iter().next().unwrap_or_default();
            }
            "index" => {
                let args = parser.directive_args("index", line)?;
                server.index_pages.extend(args);
            }
            "client_max_body_size" => {
                seen.mark("client_max_body_size", line)?;
                let args = parser.directive_args("client_max_body_size", line)?;
                if args.len() != 1 {
                    return Err(ConfigError::new(
                        "'client_max_body_size' takes one argument",
                        Some(line),
                    ));
                }
                server.client_max_body_size = parse_size(&args[0], line)?;
            }
            "error_page" => {
                let args = parser.directive_args("error_page", line)?;
                let (code, target) = parse_error_page(&args, line)?;
                server.error_pages.insert(code, target);
            }
            "location" => {
                server.locations.push(parse_location_block(parser, line)?);
            }
            other => {
                return Err(ConfigError::new(
                    format!("unknown server directive '{}'", other),
                    Some(line),
                ))
            }
        }
    }

    if server.listens.is_empty() {
        server.listens.push(Listen::wildcard(super::DEFAULT_PORT));
    }
    Ok(server)
}

fn parse_location_block(parser: &mut Parser, location_line: usize) -> ConfigResult<LocationConf> {
    let mut location = LocationConf::default();
    let mut seen = SeenOnce::default();

    let (first, _) = parser.expect_word("'location' pattern")?;
    if first == "back" {
        location.backward_match = true;
        let (pattern, _) = parser.expect_word("'location back' pattern")?;
        location.pattern = pattern;
    } else {
        location.pattern = first;
    }
    parser.expect_open_brace("'location' pattern")?;

    if !location.backward_match && !location.pattern.starts_with('/') {
        return Err(ConfigError::new(
            "location prefix pattern must start with '/'",
            Some(location_line),
        ));
    }

    loop {
        let token = parser.next().ok_or_else(|| {
            ConfigError::new("unexpected end of file inside 'location' block", None)
        })?;
        let (name, line) = match token.kind {
            TokenKind::CloseBrace => break,
            TokenKind::Word(w) => (w, token.line),
            _ => {
                return Err(ConfigError::new(
                    "expected directive inside 'location' block",
                    Some(token.line),
                ))
            }
        };

        match name.as_str() {
            "allow_methods" => {
                seen.mark("allow_methods", line)?;
                let args = parser.directive_args("allow_methods", line)?;
                if args.is_empty() {
                    return Err(ConfigError::new(
                        "'allow_methods' needs at least one method",
                        Some(line),
                    ));
                }
                let mut methods = Vec::new();
                for arg in &args {
                    let method = Method::from_str(arg).unwrap_or(Method::Unknown);
                    if !matches!(method, Method::Get | Method::Post | Method::Delete) {
                        return Err(ConfigError::new(
                            format!("unsupported method '{}' in allow_methods", arg),
                            Some(line),
                        ));
                    }
                    methods.push(method);
                }
                location.allowed_methods = Some(methods);
            }
            "root" => {
                seen.mark("root", line)?;
                let args = parser.directive_args("root", line)?;
                if args.len() != 1 {
                    return Err(ConfigError::new("'root' takes one argument", Some(line)));
                }
                location.root = args.into_iter().next();
            }
            "index" => {
                let args = parser.directive_args("index", line)?;
                location.index_pages.get_or_insert_with(Vec::new).extend(args);
            }
            "client_max_body_size" => {
                seen.mark("client_max_body_size", line)?;
                let args = parser.directive_args("client_max_body_size", line)?;
                if args.len() != 1 {
                    return Err(ConfigError::new(
                        "'client_max_body_size' takes one argument",
                        Some(line),
                    ));
                }
                location.client_max_body_size = Some(parse_size(&args[0], line)?);
            }
            "error_page" => {
                let args = parser.directive_args("error_page", line)?;
                let (code, target) = parse_error_page(&args, line)?;
                location.error_pages.insert(code, target);
            }
            "autoindex" => {
                seen.mark("autoindex", line)?;
                let args = parser.directive_args("autoindex", line)?;
                match args.as_slice() {
                    [v] if v == "on" => location.autoindex = Some(true),
                    [v] if v == "off" => location.autoindex = Some(false),
                    _ => {
                        return Err(ConfigError::new(
                            "'autoindex' takes 'on' or 'off'",
                            Some(line),
                        ))
                    }
                }
            }
            "return" => {
                seen.mark("return", line)?;
                let args = parser.directive_args("return", line)?;
                if args.len() != 2 {
                    return Err(ConfigError::new(
                        "'return' takes a status code and a target",
                        Some(line),
                    ));
                }
                let code: u16 = args[0].parse().map_err(|_| {
                    ConfigError::new("'return' status must be numeric", Some(line))
                })?;
                location.redirect = Some((code, args[1].clone()));
            }
            "upload_store" => {
                seen.mark("upload_store", line)?;
                let args = parser.directive_args("upload_store", line)?;
                if args.len() != 1 {
                    return Err(ConfigError::new(
                        "'upload_store' takes one argument",
                        Some(line),
                    ));
                }
                location.upload_store = args.into_iter().next();
            }
            "cgi_extension" => {
                let args = parser.directive_args("cgi_extension", line)?;
                if args.len() != 2 {
                    return Err(ConfigError::new(
                        "'cgi_extension' takes an extension and an interpreter path",
                        Some(line),
                    ));
                }
                let ext = if args[0].starts_with('.') {
                    args[0].clone()
                } else {
                    format!(".{}", args[0])
                };
                location.cgi_interpreters.push((ext, args[1].clone()));
            }
            other => {
                return Err(ConfigError::new(
                    format!("unknown location directive '{}'", other),
                    Some(line),
                ))
            }
        }
    }

    Ok(location)
}

fn parse_listen(arg: &str, line: usize) -> ConfigResult<Listen> {
    if let Ok(port) = arg.parse::<u16>() {
        return Ok(Listen::wildcard(port));
    }
    let (ip_str, port_str) = arg.rsplit_once(':').ok_or_else(|| {
        ConfigError::new("'listen' expects PORT or IP:PORT", Some(line))
    })?;
    let ip: IpAddr = ip_str
        .parse()
        .map_err(|_| ConfigError::new(format!("bad listen IP '{}'", ip_str), Some(line)))?;
    let port: u16 = port_str
        .parse()
        .map_err(|_| ConfigError::new(format!("bad listen port '{}'", port_str), Some(line)))?;
    Ok(Listen { ip, port })
}

fn parse_size(arg: &str, line: usize) -> ConfigResult<u64> {
    let (digits, multiplier) = match arg.strip_suffix(['M', 'm']) {
        Some(rest) => (rest, 1024 * 1024),
        None => (arg, 1),
    };
    let n: u64 = digits
        .parse()
        .map_err(|_| ConfigError::new(format!("bad size '{}'", arg), Some(line)))?;
    Ok(n * multiplier)
}

fn parse_error_page(args: &[String], line: usize) -> ConfigResult<(u16, String)> {
    if args.len() != 2 {
        return Err(ConfigError::new(
            "'error_page' takes a status code and a target",
            Some(line),
        ));
    }
    let code: u16 = args[0]
        .parse()
        .map_err(|_| ConfigError::new("'error_page' code must be numeric", Some(line)))?;
    Ok((code, args[1].clone()))
}

/// Tracks single-value directives inside one block.
#[derive(Default)]
struct SeenOnce {
    names: Vec<&'static str>,
}

impl SeenOnce {
    fn mark(&mut self, name: &'static str, line: usize) -> ConfigResult<()> {
        if self.names.contains(&name) {
            return Err(ConfigError::new(
                format!("duplicate '{}' directive", name),
                Some(line),
            ));
        }
        self.names.push(name);
        Ok(())
    }
}
