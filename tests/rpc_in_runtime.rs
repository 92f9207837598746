#![cfg(all(feature = "rpc", feature = "stream"))]

use mkts::{Client, Error, ListSymbolsFormat};

// Port 9 has no listener, so every call ends in a transport error.
const UNREACHABLE: &str = "http://127.0.0.1:9/rpc";

#[tokio::test]
async fn blocking_client_inside_runtime() {
    let client = Client::connect(UNREACHABLE).expect("connect");
    assert!(matches!(client.server_version(), Err(Error::Transport(_))));
    assert!(matches!(
        client.list_symbols(ListSymbolsFormat::Symbol),
        Err(Error::Transport(_))
    ));
    drop(client);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn blocking_client_from_spawned_task() {
    let outcome = tokio::spawn(async {
        let client = Client::connect(UNREACHABLE).expect("connect");
        client.server_version()
    })
    .await
    .expect("task");
    assert!(matches!(outcome, Err(Error::Transport(_))));
}
