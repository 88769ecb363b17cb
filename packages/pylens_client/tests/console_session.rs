use std::time::Duration;

use pylens_client::{Console, Effect, EventStream, connect};
use pylens_protocol::{Command, ServerEvent};
use pylens_relay::{Relay, RelayConfig};
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(5);

async fn next(events: &mut EventStream) -> ServerEvent {
    tokio::time::timeout(WAIT, events.next_event())
        .await
        .expect("timed out waiting for an event")
        .unwrap()
        .expect("relay closed the socket")
}

fn sent(effects: Vec<Effect>) -> Command {
    match effects.as_slice() {
        [Effect::Send(command)] => command.clone(),
        other => panic!("expected one command, got {other:?}"),
    }
}

#[tokio::test]
async fn test_console_drives_inspection_through_relay() {
    let relay = Relay::bind(&RelayConfig::ephemeral()).await.unwrap();
    let url = format!("ws://{}/ws", relay.http_addr().unwrap());
    let upstream = relay.upstream_addr().unwrap();
    let shutdown = CancellationToken::new();
    let server = tokio::spawn(relay.run(shutdown.clone()));

    let (mut sink, mut events) = connect(&url).await.unwrap();
    let mut console = Console::new();
    console.handle_event(next(&mut events).await);
    assert!(!console.is_connected());

    let runtime = TcpStream::connect(upstream).await.unwrap();
    let (reader, mut writer) = runtime.into_split();
    let mut reader = BufReader::new(reader).lines();
    console.handle_event(next(&mut events).await);
    assert!(console.is_connected());

    let command = sent(console.handle_input(":modules"));
    sink.send(&command).await.unwrap();
    let line = tokio::time::timeout(WAIT, reader.next_line())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let received: Value = serde_json::from_str(&line).unwrap();
    assert_eq!(received, json!({"type": "inspect", "expression": "sys.modules"}));

    let reply = json!({
        "type": "inspect_result",
        "data": {
            "type": "dict",
            "category": "dictionary",
            "attributes": {
                "json": {"type": "module", "category": "module"},
                "json.decoder": {"type": "module", "category": "module"}
            }
        }
    });
    let mut frame = reply.to_string();
    frame.push('\n');
    writer.write_all(frame.as_bytes()).await.unwrap();

    let effects = console.handle_event(next(&mut events).await);
    match effects.as_slice() {
        [Effect::Print(text)] => assert!(text.contains("[1] json  module")),
        other => panic!("expected the tree, got {other:?}"),
    }

    assert_eq!(
        sent(console.handle_input(":open 1")),
        Command::inspect("sys.modules['json']")
    );

    shutdown.cancel();
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_connect_to_closed_port_is_unavailable() {
    // Bind then drop to get a port with nothing listening.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let url = format!("ws://{addr}/ws");
    let err = connect(&url).await.err().expect("connect should fail");
    assert!(matches!(err, pylens_client::ClientError::Unavailable(_)));
}
