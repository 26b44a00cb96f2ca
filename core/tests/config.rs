//! Config loading against a real file on disk, exercising the path that
//! `load_from_str` alone can't: actual file I/O.

use std::io::Write;
use std::time::Duration;

use rumqttc_core::{load_from_file, ConfigError};

#[test]
fn loads_options_from_a_toml_file_on_disk() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
        client_id = "from-disk"
        host = "broker.example"
        port = 1883
        keep_alive_secs = 45

        [credentials]
        username = "alice"
        password = "hunter2"
        "#
    )
    .unwrap();

    let options = load_from_file(file.path()).unwrap();
    assert_eq!(options.client_id(), "from-disk");
    assert_eq!(options.keep_alive(), Duration::from_secs(45));
}

#[test]
fn missing_file_surfaces_as_file_read_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("does-not-exist.toml");
    let err = load_from_file(&missing).unwrap_err();
    assert!(matches!(err, ConfigError::FileRead { .. }));
}
