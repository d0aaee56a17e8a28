use std::io::Write;

use super::*;

#[test]
fn defaults_are_valid() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.logging.level, LevelFilter::INFO);
    assert!(matches!(settings.logging.format, LogFormat::Compact));
    assert_eq!(settings.store.backend, StoreBackend::Filesystem);
    assert_eq!(settings.store.root, PathBuf::from(DEFAULT_STORE_ROOT));
    assert_eq!(
        settings.store.timeout,
        Some(Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS))
    );
    assert!(settings.cache.enabled);
    assert!(settings.cache.single_flight);
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.logging.level = Some("info".to_string());
    raw.store.backend = Some("fs".to_string());

    let overrides = GlobalOverrides {
        log_level: Some("debug".to_string()),
        store_backend: Some(StoreBackendArg::Memory),
        ..Default::default()
    };

    raw.apply_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert_eq!(settings.store.backend, StoreBackend::Memory);
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    raw.apply_overrides(&GlobalOverrides {
        log_json: Some(true),
        ..Default::default()
    });
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn zero_store_timeout_disables_deadline() {
    let mut raw = RawSettings::default();
    raw.store.timeout_ms = Some(0);
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.store.timeout, None);
}

#[test]
fn invalid_values_name_their_key() {
    let mut raw = RawSettings::default();
    raw.store.backend = Some("s3".to_string());
    match Settings::from_raw(raw) {
        Err(LoadError::Invalid { key, .. }) => assert_eq!(key, "store.backend"),
        other => panic!("unexpected result: {other:?}"),
    }

    let mut raw = RawSettings::default();
    raw.logging.level = Some("loud".to_string());
    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid {
            key: "logging.level",
            ..
        })
    ));

    let mut raw = RawSettings::default();
    raw.cache.single_flight_wait_ms = Some(0);
    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid {
            key: "cache.single_flight_wait_ms",
            ..
        })
    ));
}

#[test]
fn explicit_config_file_is_loaded() {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp file");
    writeln!(
        file,
        "[store]\nbackend = \"memory\"\n\n[cache]\nsingle_flight = false\n"
    )
    .expect("write config");

    let args = CliArgs::parse_from([
        "tessera",
        "--config-file",
        file.path().to_str().expect("utf-8 path"),
        "purge",
        "--tenant",
        "acme",
    ]);
    let settings = load(&args).expect("settings load");

    assert_eq!(settings.store.backend, StoreBackend::Memory);
    assert!(!settings.cache.single_flight);
}

#[test]
fn parse_key_arguments() {
    let args = CliArgs::parse_from([
        "tessera",
        "key",
        "--fragment",
        "hero",
        "--require",
        "locale=en_us",
        "--require",
        "theme=",
    ]);

    match args.command {
        Command::Key(key) => {
            assert_eq!(key.fragment, "hero");
            assert_eq!(
                key.requirements,
                vec![
                    ("locale".to_string(), "en_us".to_string()),
                    ("theme".to_string(), String::new()),
                ]
            );
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn malformed_requirement_is_rejected() {
    let result =
        CliArgs::try_parse_from(["tessera", "key", "--fragment", "hero", "--require", "locale"]);
    assert!(result.is_err());
}

#[test]
fn parse_evict_arguments_with_global_overrides() {
    let args = CliArgs::parse_from([
        "tessera",
        "evict",
        "--tenant",
        "acme",
        "--dependency",
        "page:home",
        "--store-root",
        "/srv/cache",
        "--log-level",
        "warn",
    ]);

    assert_eq!(
        args.overrides.store_root,
        Some(PathBuf::from("/srv/cache"))
    );
    assert_eq!(args.overrides.log_level.as_deref(), Some("warn"));
    match args.command {
        Command::Evict(evict) => {
            assert_eq!(evict.scope.tenant, "acme");
            assert_eq!(evict.scope.branch, "master");
            assert_eq!(evict.dependency, "page:home");
        }
        other => panic!("unexpected command: {other:?}"),
    }
}
