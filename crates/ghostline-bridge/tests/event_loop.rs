//! Bridge event loop, with fakes and end to end over an agent stream.

mod common;

use common::{
    config, named_contact, FakeFetcher, FakeMatrix, FakeRemote, Harness, MatrixCall,
    RecordingSink, SinkEvent,
};
use ghostline_bridge::{Bridge, MemoryStore, RoomId};
use ghostline_ipc::Frame;
use ghostline_remote::{
    event_channels, ChannelConfig, Identifier, Message, ReadReceipt, TypingNotification,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

fn message(guid: &str, chat: &str, sender: Option<&str>) -> Message {
    let mut message: Message = serde_json::from_value(json!({
        "guid": guid,
        "chat_guid": chat,
        "sender_guid": sender.unwrap_or_default(),
        "is_from_me": sender.is_none(),
    }))
    .unwrap();
    message.postprocess();
    message
}

async fn next(events: &mut mpsc::UnboundedReceiver<SinkEvent>) -> SinkEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("sink event timed out")
        .expect("sink closed")
}

#[tokio::test]
async fn messages_resolve_portal_and_sync_new_senders_once() {
    let harness = Harness::with(
        FakeRemote::default().with_contact("+15551234", named_contact("Alice")),
        FakeFetcher::default(),
    );
    let (sink_tx, mut sink_rx) = mpsc::unbounded_channel();
    let bridge = Arc::new(Bridge::new(
        harness.ctx.clone(),
        Arc::new(RecordingSink { events: sink_tx }),
    ));
    let (senders, receivers) = event_channels(ChannelConfig::default());
    let running = {
        let bridge = Arc::clone(&bridge);
        tokio::spawn(async move { bridge.run(receivers).await })
    };

    let group = "iMessage;+;chat1";
    senders.offer_message(message("m1", group, Some("iMessage;-;+15551234")));
    senders.offer_message(message("m2", group, Some("iMessage;-;+15551234")));
    senders.offer_message(message("m3", group, None));

    for expected in ["m1", "m2", "m3"] {
        match next(&mut sink_rx).await {
            SinkEvent::Message {
                portal,
                sender,
                guid,
            } => {
                assert_eq!(guid, expected);
                assert_eq!(portal, Identifier::group("iMessage", "chat1"));
                let expected_sender = (expected != "m3").then(|| "+15551234".to_string());
                assert_eq!(sender, expected_sender);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    harness.ctx.tasks.join_all().await;
    assert_eq!(harness.remote.lookups(), 1);
    assert_eq!(
        harness
            .matrix
            .count(|call| matches!(call, MatrixCall::EnsureRegistered(_))),
        1
    );
    let portal = harness
        .ctx
        .portals
        .get_existing(&Identifier::group("iMessage", "chat1"))
        .await
        .unwrap()
        .unwrap();
    assert!(portal.snapshot().await.members.contains("+15551234"));

    drop(senders);
    tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn group_rename_updates_the_portal() {
    let harness = Harness::new();
    let (sink_tx, mut sink_rx) = mpsc::unbounded_channel();
    let bridge = Bridge::new(harness.ctx.clone(), Arc::new(RecordingSink { events: sink_tx }));
    let (senders, receivers) = event_channels(ChannelConfig::default());

    let portal = harness
        .ctx
        .portals
        .get_or_create(&Identifier::group("iMessage", "chat1"))
        .await
        .unwrap();
    portal
        .set_room(RoomId::new("!group:example.org"))
        .await
        .unwrap();

    let mut rename = message("m1", "iMessage;+;chat1", None);
    rename.new_group_name = "Climbing".into();
    rename.postprocess();
    senders.offer_message(rename);
    drop(senders);
    bridge.run(receivers).await;

    assert!(matches!(next(&mut sink_rx).await, SinkEvent::Message { .. }));
    assert_eq!(portal.snapshot().await.name, "Climbing");
    assert!(harness.matrix.calls().contains(&MatrixCall::SetRoomName(
        RoomId::new("!group:example.org"),
        "Climbing".into()
    )));
}

#[tokio::test]
async fn typing_in_direct_chats_is_forwarded_and_tracked() {
    let harness = Harness::new();
    let (sink_tx, mut sink_rx) = mpsc::unbounded_channel();
    let bridge = Bridge::new(harness.ctx.clone(), Arc::new(RecordingSink { events: sink_tx }));
    let (senders, receivers) = event_channels(ChannelConfig::default());

    let room = RoomId::new("!dm:example.org");
    harness
        .ctx
        .portals
        .get_or_create(&Identifier::direct("iMessage", "+15551234"))
        .await
        .unwrap()
        .set_room(room.clone())
        .await
        .unwrap();

    let chat_guid = "iMessage;-;+15551234".to_string();
    senders.offer_typing(TypingNotification {
        chat_guid: chat_guid.clone(),
        typing: true,
    });
    drop(senders);
    bridge.run(receivers).await;
    assert!(matches!(
        next(&mut sink_rx).await,
        SinkEvent::Typing { typing: true, .. }
    ));

    let puppet = bridge.puppets().get_or_create("+15551234").await.unwrap();
    assert_eq!(puppet.typing_state().room, Some(room.clone()));

    let (senders, receivers) = event_channels(ChannelConfig::default());
    senders.offer_typing(TypingNotification {
        chat_guid,
        typing: false,
    });
    drop(senders);
    bridge.run(receivers).await;

    assert_eq!(puppet.typing_state().room, None);
    let user = puppet.user_id().clone();
    let typing_calls: Vec<_> = harness
        .matrix
        .calls()
        .into_iter()
        .filter(|call| matches!(call, MatrixCall::SetTyping(..)))
        .collect();
    assert_eq!(
        typing_calls,
        vec![
            MatrixCall::SetTyping(user.clone(), room.clone(), true),
            MatrixCall::SetTyping(user, room, false),
        ]
    );
}

#[tokio::test]
async fn receipts_carry_their_sender_and_bad_chat_ids_are_dropped() {
    let harness = Harness::new();
    let (sink_tx, mut sink_rx) = mpsc::unbounded_channel();
    let bridge = Bridge::new(harness.ctx.clone(), Arc::new(RecordingSink { events: sink_tx }));
    let (senders, receivers) = event_channels(ChannelConfig::default());

    let receipt = |chat: &str| -> ReadReceipt {
        serde_json::from_value(json!({
            "sender_guid": "iMessage;-;+15551234",
            "chat_guid": chat,
            "read_up_to": "m1",
            "read_at": 1.0,
        }))
        .unwrap()
    };
    senders.offer_receipt(receipt("garbage"));
    senders.offer_receipt(receipt("iMessage;-;+15551234"));
    drop(senders);
    bridge.run(receivers).await;

    match next(&mut sink_rx).await {
        SinkEvent::Receipt { portal, sender } => {
            assert_eq!(portal, Identifier::direct("iMessage", "+15551234"));
            assert_eq!(sender.as_deref(), Some("+15551234"));
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert!(sink_rx.try_recv().is_err());
}

#[tokio::test]
async fn connect_bridges_agent_events_end_to_end() {
    common::init_tracing();
    let (bridge_side, agent_side) = tokio::io::duplex(64 * 1024);
    let (reader, writer) = tokio::io::split(bridge_side);
    let matrix = Arc::new(FakeMatrix::default());
    let store = Arc::new(MemoryStore::new());
    let (sink_tx, mut sink_rx) = mpsc::unbounded_channel();

    let (bridge, events, _read_loop) = Bridge::connect(
        &config(),
        reader,
        writer,
        matrix.clone(),
        store,
        Arc::new(RecordingSink { events: sink_tx }),
    )
    .unwrap();
    let bridge = Arc::new(bridge);
    {
        let bridge = Arc::clone(&bridge);
        tokio::spawn(async move { bridge.run(events).await });
    }

    let (agent_reader, mut agent_writer) = tokio::io::split(agent_side);
    let mut agent_lines = BufReader::new(agent_reader).lines();
    let event = json!({
        "command": "message",
        "data": {
            "guid": "m1",
            "timestamp": 1_600_000_000.0,
            "chat_guid": "iMessage;-;+15551234",
            "sender_guid": "iMessage;-;+15551234",
            "text": "hi",
        }
    });
    agent_writer
        .write_all(format!("{event}\n").as_bytes())
        .await
        .unwrap();

    // The first message from a new sender triggers a contact lookup.
    let line = tokio::time::timeout(Duration::from_secs(5), agent_lines.next_line())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let request = Frame::decode(&line).unwrap();
    assert_eq!(request.command, "get_contact");
    let reply = json!({"command": "response", "id": request.id, "data": {"first_name": "Alice"}});
    agent_writer
        .write_all(format!("{reply}\n").as_bytes())
        .await
        .unwrap();

    match next(&mut sink_rx).await {
        SinkEvent::Message { sender, guid, .. } => {
            assert_eq!(guid, "m1");
            assert_eq!(sender.as_deref(), Some("+15551234"));
        }
        other => panic!("unexpected event {other:?}"),
    }
    bridge.context().tasks.join_all().await;
    assert!(matrix.calls().contains(&MatrixCall::SetDisplayName(
        bridge
            .puppets()
            .get_or_create("+15551234")
            .await
            .unwrap()
            .user_id()
            .clone(),
        "Alice (iMessage)".into()
    )));
    bridge.shutdown();
}

#[tokio::test]
async fn unanswered_contact_lookup_does_not_stall_other_events() {
    let (bridge_side, agent_side) = tokio::io::duplex(64 * 1024);
    let (reader, writer) = tokio::io::split(bridge_side);
    let (sink_tx, mut sink_rx) = mpsc::unbounded_channel();
    let (bridge, events, _read_loop) = Bridge::connect(
        &config(),
        reader,
        writer,
        Arc::new(FakeMatrix::default()),
        Arc::new(MemoryStore::new()),
        Arc::new(RecordingSink { events: sink_tx }),
    )
    .unwrap();
    let bridge = Arc::new(bridge);
    {
        let bridge = Arc::clone(&bridge);
        tokio::spawn(async move { bridge.run(events).await });
    }

    let (agent_reader, mut agent_writer) = tokio::io::split(agent_side);
    let mut agent_lines = BufReader::new(agent_reader).lines();
    let message = json!({
        "command": "message",
        "data": {
            "guid": "m1",
            "chat_guid": "iMessage;-;+15551234",
            "sender_guid": "iMessage;-;+15551234",
        }
    });
    let typing = json!({
        "command": "typing",
        "data": {"chat_guid": "iMessage;+;chat1", "typing": true}
    });
    for frame in [message, typing] {
        agent_writer
            .write_all(format!("{frame}\n").as_bytes())
            .await
            .unwrap();
    }

    // The contact lookup is left unanswered while both events go through.
    let line = tokio::time::timeout(Duration::from_secs(5), agent_lines.next_line())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(Frame::decode(&line).unwrap().command, "get_contact");
    let delivered = [next(&mut sink_rx).await, next(&mut sink_rx).await];
    assert!(delivered
        .iter()
        .any(|event| matches!(event, SinkEvent::Message { .. })));
    assert!(delivered
        .iter()
        .any(|event| matches!(event, SinkEvent::Typing { typing: true, .. })));
    bridge.shutdown();
}
