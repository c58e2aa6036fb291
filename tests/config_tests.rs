use webhive::config::{Listen, ServerConfig};
use webhive::http::Method;

#[test]
fn parses_full_server_block() {
    let text = r#"
# main site
server {
    listen 127.0.0.1:8080;
    listen 9090;
    server_name example.test www.example.test;
    root ./www;
    index index.html index.htm;
    client_max_body_size 2M;
    error_page 404 /errors/404.html;

    location / {
        allow_methods GET POST;
        autoindex on;
    }

    location /cgi-bin {
        cgi_extension .py /usr/bin/python3;
        cgi_extension .sh /bin/sh;
    }

    location back .jpg {
        root ./images;
    }
}
"#;
    let config = ServerConfig::from_str(text).unwrap();
    assert_eq!(config.servers.len(), 1);

    let server = &config.servers[0];
    assert_eq!(server.listens.len(), 2);
    assert_eq!(
        server.listens[0],
        Listen {
            ip: "127.0.0.1".parse().unwrap(),
            port: 8080
        }
    );
    assert!(server.listens[1].is_wildcard());
    assert_eq!(server.listens[1].port, 9090);
    assert_eq!(server.server_names, vec!["example.test", "www.example.test"]);
    assert_eq!(server.root, "./www");
    assert_eq!(server.index_pages, vec!["index.html", "index.htm"]);
    assert_eq!(server.client_max_body_size, 2 * 1024 * 1024);
    assert_eq!(server.error_pages.get(&404).map(String::as_str), Some("/errors/404.html"));

    assert_eq!(server.locations.len(), 3);
    let root_loc = &server.locations[0];
    assert_eq!(root_loc.pattern, "/");
    assert_eq!(
        root_loc.allowed_methods.as_deref(),
        Some(&[Method::Get, Method::Post][..])
    );
    assert_eq!(root_loc.autoindex, Some(true));

    let cgi_loc = &server.locations[1];
    assert_eq!(cgi_loc.cgi_interpreters.len(), 2);
    assert_eq!(cgi_loc.cgi_interpreters[0].0, ".py");

    let jpg_loc = &server.locations[2];
    assert!(jpg_loc.backward_match);
    assert_eq!(jpg_loc.pattern, ".jpg");
}

#[test]
fn server_without_listen_gets_default_endpoint() {
    let config = ServerConfig::from_str("server { root ./www; }").unwrap();
    assert_eq!(config.servers[0].listens, vec![Listen::wildcard(8080)]);
}

#[test]
fn duplicate_single_value_directive_is_rejected() {
    let err = ServerConfig::from_str(
        "server { location / { autoindex on; autoindex off; } }",
    )
    .unwrap_err();
    assert!(err.to_string().contains("duplicate"));
}

#[test]
fn duplicate_root_in_server_is_rejected() {
    let err = ServerConfig::from_str("server { root ./a; root ./b; }").unwrap_err();
    assert!(err.to_string().contains("duplicate"));
}

#[test]
fn return_requires_3xx_code() {
    let err = ServerConfig::from_str(
        "server { location /r { return 200 /elsewhere; } }",
    )
    .unwrap_err();
    assert!(err.to_string().contains("3xx"));
}

#[test]
fn unsupported_allow_method_is_rejected() {
    let err = ServerConfig::from_str(
        "server { location / { allow_methods GET TRACE; } }",
    )
    .unwrap_err();
    assert!(err.to_string().contains("TRACE"));
}

#[test]
fn missing_semicolon_reports_line() {
    let err = ServerConfig::from_str("server {\n    root ./www\n}\n").unwrap_err();
    let text = err.to_string();
    assert!(text.contains("';'"), "unexpected message: {}", text);
}

#[test]
fn empty_config_is_rejected() {
    assert!(ServerConfig::from_str("").is_err());
    assert!(ServerConfig::from_str("# only a comment\n").is_err());
}

#[test]
fn unknown_directive_is_rejected() {
    let err = ServerConfig::from_str("server { worker_processes 4; }").unwrap_err();
    assert!(err.to_string().contains("worker_processes"));
}

#[test]
fn distinct_listens_deduplicate() {
    let text = r#"
server { listen 8081; }
server { listen 8081; server_name other; }
server { listen 8082; }
"#;
    let config = ServerConfig::from_str(text).unwrap();
    assert_eq!(
        config.distinct_listens(),
        vec![Listen::wildcard(8081), Listen::wildcard(8082)]
    );
}

#[test]
fn size_suffix_m_multiplies() {
    let config =
        ServerConfig::from_str("server { client_max_body_size 3M; }").unwrap();
    assert_eq!(config.servers[0].client_max_body_size, 3 * 1024 * 1024);

    let config = ServerConfig::from_str("server { client_max_body_size 512; }").unwrap();
    assert_eq!(config.servers[0].client_max_body_size, 512);
}
