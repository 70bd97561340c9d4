//! Connector behavior against a scripted agent over an in-memory stream.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ghostline_ipc::{Frame, IpcConfig, Processor};
use ghostline_remote::{
    ChannelConfig, EventReceivers, GroupAction, Identifier, RemoteApi, RemoteConnector,
    TapbackType,
};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf};

struct Agent {
    lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
    writer: WriteHalf<DuplexStream>,
}

impl Agent {
    async fn next_frame(&mut self) -> Frame {
        let line = tokio::time::timeout(Duration::from_secs(5), self.lines.next_line())
            .await
            .expect("agent read timed out")
            .expect("agent read failed")
            .expect("bridge closed the stream");
        Frame::decode(&line).expect("bridge wrote a malformed frame")
    }

    async fn write(&mut self, frame: Value) {
        self.writer
            .write_all(format!("{frame}\n").as_bytes())
            .await
            .unwrap();
        self.writer.flush().await.unwrap();
    }

    async fn event(&mut self, command: &str, data: Value) {
        self.write(json!({"command": command, "data": data})).await;
    }

    async fn reply(&mut self, id: u64, data: Value) {
        self.write(json!({"command": "response", "id": id, "data": data}))
            .await;
    }
}

fn connect(channels: ChannelConfig) -> (Arc<RemoteConnector>, EventReceivers, Agent) {
    let (bridge_side, agent_side) = tokio::io::duplex(64 * 1024);
    let (reader, writer) = tokio::io::split(bridge_side);
    let processor = Processor::new(writer, IpcConfig::default());
    let (connector, receivers) = RemoteConnector::new(Arc::clone(&processor), channels);
    connector.start();
    processor.spawn(reader);

    let (agent_reader, agent_writer) = tokio::io::split(agent_side);
    let agent = Agent {
        lines: BufReader::new(agent_reader).lines(),
        writer: agent_writer,
    };
    (connector, receivers, agent)
}

fn chat() -> Identifier {
    Identifier::group("iMessage", "chat4521")
}

#[tokio::test]
async fn incoming_messages_are_postprocessed_before_delivery() {
    let (_connector, mut receivers, mut agent) = connect(ChannelConfig::default());

    agent
        .event(
            "message",
            json!({
                "guid": "m1",
                "timestamp": 1_600_000_000.0,
                "chat_guid": "iMessage;+;chat4521",
                "sender_guid": "iMessage;-;+15551234",
                "text": "renamed",
                "new_group_title": "Climbing",
            }),
        )
        .await;

    let message = tokio::time::timeout(Duration::from_secs(5), receivers.messages.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(message.sender, Some(Identifier::direct("iMessage", "+15551234")));
    assert_eq!(message.group_action, Some(GroupAction::SetName));
    assert_eq!(message.time.timestamp(), 1_600_000_000);
}

#[tokio::test]
async fn full_queue_drops_newest_without_stalling_the_read_loop() {
    let (connector, mut receivers, mut agent) = connect(ChannelConfig {
        message_capacity: 1,
        ..ChannelConfig::default()
    });

    for n in 0..3 {
        agent
            .event("message", json!({"guid": format!("m{n}"), "chat_guid": "iMessage;+;c", "is_from_me": true}))
            .await;
    }
    // Frames are processed in order, so once this arrives all three were offered.
    agent
        .event("typing", json!({"chat_guid": "iMessage;+;c", "typing": true}))
        .await;
    tokio::time::timeout(Duration::from_secs(5), receivers.typing.recv())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(connector.channel_stats().dropped_messages, 2);
    assert_eq!(receivers.messages.try_recv().unwrap().guid, "m0");
    assert!(receivers.messages.try_recv().is_err());
}

#[tokio::test]
async fn undecodable_events_are_dropped() {
    let (connector, mut receivers, mut agent) = connect(ChannelConfig::default());

    agent.event("read_receipt", json!({"nonsense": 1})).await;
    agent
        .event(
            "read_receipt",
            json!({"chat_guid": "iMessage;-;+1555", "read_up_to": "m9", "read_at": 1.5}),
        )
        .await;

    let receipt = tokio::time::timeout(Duration::from_secs(5), receivers.receipts.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(receipt.read_up_to, "m9");
    assert_eq!(connector.channel_stats().dropped_receipts, 0);
}

#[tokio::test]
async fn contact_avatar_is_decoded_from_base64() {
    let (connector, _receivers, mut agent) = connect(ChannelConfig::default());
    let user = Identifier::direct("iMessage", "+15551234");

    let lookup = {
        let connector = Arc::clone(&connector);
        let user = user.clone();
        tokio::spawn(async move { connector.get_contact_info(&user).await })
    };
    let frame = agent.next_frame().await;
    assert_eq!(frame.command, "get_contact");
    assert_eq!(frame.data["user_guid"], json!("iMessage;-;+15551234"));
    agent
        .reply(
            frame.id,
            json!({"first_name": "Alice", "avatar": STANDARD.encode(b"avatar-bytes")}),
        )
        .await;

    let contact = lookup.await.unwrap().unwrap().unwrap();
    assert_eq!(contact.name(), "Alice");
    assert_eq!(contact.avatar.as_deref(), Some(&b"avatar-bytes"[..]));
    assert_eq!(contact.user_guid, "iMessage;-;+15551234");
}

#[tokio::test]
async fn unknown_contact_is_none() {
    let (connector, _receivers, mut agent) = connect(ChannelConfig::default());

    let lookup = {
        let connector = Arc::clone(&connector);
        tokio::spawn(async move {
            connector
                .get_contact_info(&Identifier::direct("iMessage", "nobody@example.com"))
                .await
        })
    };
    let frame = agent.next_frame().await;
    agent.reply(frame.id, Value::Null).await;

    assert_eq!(lookup.await.unwrap().unwrap(), None);
}

#[tokio::test]
async fn tapback_removal_is_offset_on_the_wire() {
    let (connector, _receivers, mut agent) = connect(ChannelConfig::default());

    let sending = {
        let connector = Arc::clone(&connector);
        tokio::spawn(async move {
            connector
                .send_tapback(&chat(), "bp:ABC", TapbackType::Like, true)
                .await
        })
    };
    let frame = agent.next_frame().await;
    assert_eq!(frame.command, "send_tapback");
    assert_eq!(frame.data["type"], json!(3001));
    assert_eq!(frame.data["target_guid"], json!("bp:ABC"));
    agent
        .reply(frame.id, json!({"guid": "t1", "timestamp": 1.0}))
        .await;

    assert_eq!(sending.await.unwrap().unwrap().guid, "t1");
}

#[tokio::test]
async fn send_file_stages_a_temp_file_for_the_agent() {
    let (connector, _receivers, mut agent) = connect(ChannelConfig::default());
    let png = b"\x89PNG\r\n\x1a\nimage-data".to_vec();

    let sending = {
        let connector = Arc::clone(&connector);
        let png = png.clone();
        tokio::spawn(async move { connector.send_file(&chat(), "cat.png", &png).await })
    };
    let frame = agent.next_frame().await;
    assert_eq!(frame.command, "send_media");
    assert_eq!(frame.data["mime_type"], json!("image/png"));
    assert_eq!(frame.data["name"], json!("cat.png"));
    let path = PathBuf::from(frame.data["path"].as_str().unwrap());
    assert_eq!(tokio::fs::read(&path).await.unwrap(), png);

    agent.reply(frame.id, json!({"guid": "f1"})).await;
    assert_eq!(sending.await.unwrap().unwrap().guid, "f1");
    assert!(!path.exists());
}

#[tokio::test]
async fn unnamed_video_is_typed_from_its_content() {
    let (connector, _receivers, mut agent) = connect(ChannelConfig::default());
    let mp4 = b"\0\0\0\x18ftypisom\0\0\x02\0isomiso2\0\0\0\x08free".to_vec();

    let sending = {
        let connector = Arc::clone(&connector);
        tokio::spawn(async move { connector.send_file(&chat(), "", &mp4).await })
    };
    let frame = agent.next_frame().await;
    assert_eq!(frame.data["mime_type"], json!("video/mp4"));
    assert_eq!(frame.data["name"], json!("attachment.mp4"));

    agent.reply(frame.id, json!({"guid": "f2"})).await;
    assert_eq!(sending.await.unwrap().unwrap().guid, "f2");
}

#[tokio::test]
async fn malformed_conversation_ids_are_skipped() {
    let (connector, _receivers, mut agent) = connect(ChannelConfig::default());

    let listing = {
        let connector = Arc::clone(&connector);
        tokio::spawn(async move {
            connector
                .get_chats_with_messages_after(chrono::DateTime::default())
                .await
        })
    };
    let frame = agent.next_frame().await;
    assert_eq!(frame.data["min_timestamp"], json!(0.0));
    agent
        .reply(frame.id, json!(["iMessage;+;chat1", "garbage", "SMS;-;+1555"]))
        .await;

    let chats = listing.await.unwrap().unwrap();
    assert_eq!(
        chats,
        vec![Identifier::group("iMessage", "chat1"), Identifier::direct("SMS", "+1555")]
    );
}

#[tokio::test]
async fn receipts_and_typing_are_fire_and_forget() {
    let (connector, _receivers, mut agent) = connect(ChannelConfig::default());

    connector.send_read_receipt(&chat(), "m7").await.unwrap();
    connector.send_typing_notification(&chat(), true).await.unwrap();

    let receipt = agent.next_frame().await;
    assert_eq!(receipt.command, "send_read_receipt");
    assert!(!receipt.expects_reply());
    let typing = agent.next_frame().await;
    assert_eq!(typing.command, "set_typing");
    assert_eq!(typing.data["typing"], json!(true));

    assert!(connector.capabilities().send_typing_notifications);
}
