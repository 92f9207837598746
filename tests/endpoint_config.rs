#![cfg(feature = "rpc")]

use std::fs;

use mkts::{Client, ClientConfig, Endpoint, Error};
use tempfile::tempdir;

#[test]
fn endpoint_selection() {
    assert_eq!(
        Endpoint::select("http://localhost:5993/rpc", false),
        Endpoint::MsgpackRpc("http://localhost:5993/rpc".to_string())
    );
    assert_eq!(
        Endpoint::select("http://10.0.0.5:5993/rpc", true),
        Endpoint::BinaryRpc("10.0.0.5:5995".to_string())
    );
    assert_eq!(
        Endpoint::select("10.0.0.5:6000", true),
        Endpoint::BinaryRpc("10.0.0.5:6000".to_string())
    );
    assert_eq!(
        Endpoint::MsgpackRpc("http://10.0.0.5:5993/rpc".to_string()).stream_url(),
        "ws://10.0.0.5:5993/ws"
    );
}

#[test]
fn config_file_drives_client() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("client.json");
    fs::write(
        &path,
        r#"{"endpoint": "http://10.0.0.5:5993/rpc", "timeout_secs": 5}"#,
    )
    .expect("write config");

    let config = ClientConfig::load(&path).expect("load");
    assert!(!config.binary);
    assert_eq!(config.timeout_secs, Some(5));

    let client = Client::from_config(&config).expect("client");
    assert_eq!(
        client.endpoint(),
        &Endpoint::MsgpackRpc("http://10.0.0.5:5993/rpc".to_string())
    );
}

#[test]
fn binary_config_needs_stub() {
    let config = ClientConfig {
        binary: true,
        ..ClientConfig::default()
    };
    assert!(matches!(
        Client::from_config(&config),
        Err(Error::Config(_))
    ));
}

#[test]
fn config_round_trips_through_json() {
    let config = ClientConfig {
        endpoint: "db.internal:5995".to_string(),
        binary: true,
        timeout_secs: Some(30),
    };
    let text = serde_json::to_string(&config).expect("serialize");
    let back: ClientConfig = serde_json::from_str(&text).expect("deserialize");
    assert_eq!(back, config);
    assert_eq!(
        back.endpoint(),
        Endpoint::BinaryRpc("db.internal:5995".to_string())
    );
}
