use agent_relay::AppError;

#[test]
fn display_includes_category_prefix() {
    let cases = [
        (AppError::Config("bad".into()), "config: bad"),
        (AppError::Db("lost".into()), "db: lost"),
        (AppError::Validation("empty title".into()), "validation: empty title"),
        (AppError::Unauthorized("not owner".into()), "unauthorized: not owner"),
        (AppError::InvalidState("cancelled".into()), "invalid state: cancelled"),
        (AppError::NotFound("gone".into()), "not found: gone"),
        (AppError::Spawn("no binary".into()), "spawn: no binary"),
        (AppError::ProcessCrash("died".into()), "process crash: died"),
        (AppError::Notify("hub down".into()), "notify: hub down"),
        (AppError::Io("disk".into()), "io: disk"),
    ];

    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }
}

#[test]
fn toml_errors_convert_to_config() {
    let parse_err = toml::from_str::<toml::Value>("not = = valid").expect_err("invalid toml");
    let err: AppError = parse_err.into();
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn io_errors_convert_to_io() {
    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
    let err: AppError = io_err.into();
    assert!(matches!(err, AppError::Io(_)));
}
