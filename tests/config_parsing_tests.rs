use conf::{Config, Redirect};

fn err_str(input: &str) -> String {
    format!("{}", Config::from_str(input).unwrap_err())
}

#[test]
fn test_valid_server_config() {
    let config_str = "
        server {
            listen 0.0.0.0:8081;
            server_name myserv www.myserv;
            root ./www;
            index index.html index.htm;
            client_max_body_size 2048;
        }
    ";
    let config = Config::from_str(config_str).unwrap();

    assert_eq!(config.servers.len(), 1);
    let server = &config.servers[0];
    assert_eq!(server.host, "0.0.0.0");
    assert_eq!(server.port, 8081);
    assert_eq!(server.server_names, vec!["myserv", "www.myserv"]);
    assert_eq!(server.root, "./www");
    assert_eq!(server.index_files, vec!["index.html", "index.htm"]);
    assert_eq!(server.client_max_body_size, 2048);
}

#[test]
fn test_full_config_with_locations() {
    let config_str = r#"
# main site
server {
    listen 127.0.0.1:8080;
    root ./site;
    error_page 404 /errors/404.html;
    error_page 500 /errors/500.html;

    location / {
        methods GET;
        autoindex on;
    }
    location /upload {
        methods GET POST DELETE;
        upload_store uploads;
        client_max_body_size 10485760;
    }
    location /cgi-bin {
        methods GET POST;
        cgi_pass /usr/bin/python3;
    }
    location /old {
        return 301 /new;
    }
}
"#;
    let config = Config::from_str(config_str).unwrap();
    let server = &config.servers[0];

    assert_eq!(server.error_pages.get(&404).unwrap(), "/errors/404.html");
    assert_eq!(server.error_pages.get(&500).unwrap(), "/errors/500.html");
    assert_eq!(server.locations.len(), 4);

    let root_loc = &server.locations[0];
    assert_eq!(root_loc.route, "/");
    assert!(root_loc.autoindex);
    assert_eq!(root_loc.methods, vec!["GET"]);

    let upload = &server.locations[1];
    assert_eq!(upload.methods, vec!["GET", "POST", "DELETE"]);
    assert_eq!(upload.upload_store.as_deref(), Some("uploads"));
    assert_eq!(upload.client_max_body_size, 10_485_760);

    let cgi = &server.locations[2];
    assert_eq!(cgi.cgi_pass.as_deref(), Some("/usr/bin/python3"));

    let old = &server.locations[3];
    assert_eq!(
        old.redirect,
        Some(Redirect { code: 301, target: "/new".to_string() })
    );
}

#[test]
fn test_location_inherits_server_fields() {
    let config_str = "
        server {
            listen 127.0.0.1:9000;
            root ./base;
            index main.html;
            client_max_body_size 4096;
            location /a { }
            location /b {
                root ./other;
                client_max_body_size 16;
            }
        }
    ";
    let config = Config::from_str(config_str).unwrap();
    let server = &config.servers[0];

    let a = &server.locations[0];
    assert_eq!(a.root, "./base");
    assert_eq!(a.index_files, vec!["main.html"]);
    assert_eq!(a.client_max_body_size, 4096);
    assert_eq!(a.methods, vec!["GET"]);

    let b = &server.locations[1];
    assert_eq!(b.root, "./other");
    assert_eq!(b.client_max_body_size, 16);
    assert_eq!(b.index_files, vec!["main.html"]);
}

#[test]
fn test_defaults() {
    let config = Config::from_str("server { }").unwrap();
    let server = &config.servers[0];
    assert_eq!(server.host, "127.0.0.1");
    assert_eq!(server.port, 8080);
    assert_eq!(server.root, "./www");
    assert_eq!(server.index_files, vec!["index.html"]);
    assert_eq!(server.client_max_body_size, 1_048_576);
    assert!(server.locations.is_empty());
    assert!(server.error_pages.is_empty());
}

#[test]
fn test_multiple_servers() {
    let config_str = "
        server { listen 127.0.0.1:8080; server_name web1; }
        server { listen 127.0.0.1:8080; server_name web2; }
        server { listen 127.0.0.1:9090; server_name web3; }
    ";
    let config = Config::from_str(config_str).unwrap();
    assert_eq!(config.servers.len(), 3);
    assert_eq!(config.servers[0].server_names, vec!["web1"]);
    assert_eq!(config.servers[2].port, 9090);
}

#[test]
fn test_quoted_arguments() {
    let config_str = r#"
        server {
            root "./my www";
            location '/files' { }
        }
    "#;
    let config = Config::from_str(config_str).unwrap();
    assert_eq!(config.servers[0].root, "./my www");
    assert_eq!(config.servers[0].locations[0].route, "/files");
}

#[test]
fn test_tilde_location_form() {
    let config = Config::from_str("server { location ~ /cgi { } }").unwrap();
    assert_eq!(config.servers[0].locations[0].route, "/cgi");
}

#[test]
fn test_unknown_directive() {
    let err = err_str("server {\n    proxy_pass http://x:1;\n}");
    assert!(err.contains("unknown"));
    assert!(err.starts_with("2:5:"), "unexpected location: {}", err);
}

#[test]
fn test_directive_in_wrong_context() {
    let err = err_str("listen 127.0.0.1:80;");
    assert!(err.contains("not allowed in main context"));

    let err = err_str("server { location / { listen 127.0.0.1:80; } }");
    assert!(err.contains("not allowed in location context"));
}

#[test]
fn test_unclosed_block() {
    let err = err_str("server {\n    root ./www;\n");
    assert!(err.contains("unclosed block"));
}

#[test]
fn test_stray_closing_brace() {
    let err = err_str("server { } }");
    assert!(err.contains("unexpected '}'"));
}

#[test]
fn test_missing_semicolon() {
    assert!(Config::from_str("server { root ./www }").is_err());
}

#[test]
fn test_invalid_listen_argument() {
    assert!(Config::from_str("server { listen 8080; }").is_err());
    assert!(Config::from_str("server { listen 127.0.0.1:0; }").is_err());
    assert!(Config::from_str("server { listen 127.0.0.1:99999; }").is_err());
}

#[test]
fn test_invalid_methods() {
    let err = err_str("server { location / { methods GET PATCH; } }");
    assert!(err.contains("PATCH"));
}

#[test]
fn test_path_traversal_rejected() {
    assert!(Config::from_str("server { root ./www/../secret; }").is_err());
    assert!(Config::from_str("server { root ./www//x; }").is_err());
}

#[test]
fn test_error_page_code_range() {
    assert!(Config::from_str("server { error_page 404 /e.html; }").is_ok());
    let err = err_str("server { error_page 99 /e.html; }");
    assert!(err.contains("out of range"));
}

#[test]
fn test_route_must_start_with_slash() {
    let err = err_str("server { location foo { } }");
    assert!(err.contains("must begin with '/'"));
}

#[test]
fn test_arg_count_bounds() {
    assert!(Config::from_str("server { root; }").is_err());
    assert!(Config::from_str("server { root ./a ./b; }").is_err());
    assert!(Config::from_str("server { error_page 404; }").is_err());
}

#[test]
fn test_empty_config_rejected() {
    assert!(Config::from_str("").is_err());
    assert!(Config::from_str("# only a comment\n").is_err());
}

#[test]
fn test_unterminated_quote_reports_location() {
    let err = err_str("server {\n    root \"no end;\n}");
    assert!(err.contains("unterminated"));
    assert!(err.starts_with("2:10:"), "unexpected location: {}", err);
}
