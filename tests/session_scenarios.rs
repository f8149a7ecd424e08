//! End-to-end call scenarios: sessions talking through an in-process relay
//! over loopback peer connections.

mod utils;

use std::sync::Arc;

use pretty_assertions::assert_eq;
use tokio::sync::mpsc;
use tokio_test::assert_ok;

use roomcall::media::{MediaKind, SourceSelector, SyntheticMediaSource};
use roomcall::models::IceCandidate;
use roomcall::peer::{ConnectionState, LoopbackNetwork, NetworkState};
use roomcall::relay::{ClientHandle, RoomRegistry};
use roomcall::session::SessionSettings;
use roomcall::signaling::{msg_types, ClientSignal};

use utils::{eventually, settle, Observed, TestClient};

const ROOM: &str = "r1@rooms.io";

struct Call {
    registry: Arc<RoomRegistry>,
    network: LoopbackNetwork,
    alice: TestClient,
    bob: TestClient,
}

/// Alice joins first, Bob second; both end up connected.
async fn connected_call() -> Call {
    let registry = Arc::new(RoomRegistry::new());
    let network = LoopbackNetwork::new();

    let alice = TestClient::spawn("alice@example.com", &registry, &network);
    assert_ok!(alice.handle.join(ROOM));
    alice.observer.wait_for_state(ConnectionState::Building).await;

    let bob = TestClient::spawn("bob@example.com", &registry, &network);
    assert_ok!(bob.handle.join(ROOM));

    alice.observer.wait_for_state(ConnectionState::Connected).await;
    bob.observer.wait_for_state(ConnectionState::Connected).await;

    Call {
        registry,
        network,
        alice,
        bob,
    }
}

#[tokio::test]
async fn test_two_clients_negotiate_and_connect() {
    let call = connected_call().await;

    assert_eq!(call.alice.sent_count(msg_types::OFFER), 1);
    assert_eq!(call.alice.sent_count(msg_types::ANSWER), 0);
    assert_eq!(call.bob.sent_count(msg_types::ANSWER), 1);
    assert_eq!(call.bob.sent_count(msg_types::OFFER), 0);

    assert_eq!(
        call.alice.observer.states(),
        vec![
            ConnectionState::Building,
            ConnectionState::Negotiating,
            ConnectionState::Connected
        ]
    );
    assert_eq!(
        call.bob.observer.states(),
        vec![
            ConnectionState::Building,
            ConnectionState::Negotiating,
            ConnectionState::Connected
        ]
    );

    let alice_events = call.alice.observer.events();
    assert!(alice_events.contains(&Observed::LocalLabel("alice@example.com".into())));
    assert!(alice_events.contains(&Observed::RemoteLabel(Some("bob@example.com".into()))));
    assert!(alice_events.contains(&Observed::StreamAttached(MediaKind::Audio)));
    assert!(alice_events.contains(&Observed::StreamAttached(MediaKind::Video)));
    assert!(alice_events.contains(&Observed::Devices(4)));

    let bob_events = call.bob.observer.events();
    assert!(bob_events.contains(&Observed::RemoteLabel(Some("alice@example.com".into()))));
    assert!(bob_events.contains(&Observed::StreamAttached(MediaKind::Video)));

    assert!(call.alice.sent_count(msg_types::ICE) >= 1);
    assert_eq!(call.network.open_link_ids().await.len(), 2);
    assert_eq!(call.registry.member_count(ROOM), 2);
}

#[tokio::test]
async fn test_chat_delivered_exactly_once() {
    let call = connected_call().await;

    assert_ok!(call.alice.handle.send_chat("hello"));
    call.bob
        .observer
        .wait_for("chat from alice", |events| {
            events.contains(&Observed::Chat("hello".into()))
        })
        .await;

    assert_ok!(call.bob.handle.send_chat("hi alice"));
    call.alice
        .observer
        .wait_for("chat from bob", |events| {
            events.contains(&Observed::Chat("hi alice".into()))
        })
        .await;

    settle().await;
    assert_eq!(call.bob.observer.count(&Observed::Chat("hello".into())), 1);
    assert_eq!(call.alice.observer.count(&Observed::Chat("hello".into())), 0);
}

#[tokio::test]
async fn test_peer_leaving_puts_the_other_on_standby() {
    let call = connected_call().await;

    assert_ok!(call.bob.handle.leave());
    call.alice
        .observer
        .wait_for("standby after bye", |events| {
            let states: Vec<_> = events
                .iter()
                .filter_map(|e| match e {
                    Observed::State(s) => Some(*s),
                    _ => None,
                })
                .collect();
            states.ends_with(&[ConnectionState::Closed, ConnectionState::Building])
        })
        .await;

    let alice_events = call.alice.observer.events();
    assert!(alice_events.contains(&Observed::StreamDetached));
    assert!(alice_events.contains(&Observed::RemoteLabel(None)));
    assert_eq!(call.bob.sent_count(msg_types::LEAVE_ROOM), 1);
    assert_eq!(call.bob.observer.last_state(), Some(ConnectionState::Closed));

    eventually("only alice's standby connection left", || async {
        call.network.open_link_ids().await.len() == 1
    })
    .await;
    assert_eq!(call.registry.member_count(ROOM), 1);
}

#[tokio::test]
async fn test_rejoin_after_leave_reconnects() {
    let call = connected_call().await;

    assert_ok!(call.bob.handle.leave());
    call.alice.observer.wait_for_state(ConnectionState::Building).await;
    call.bob.observer.wait_for_state(ConnectionState::Closed).await;

    assert_ok!(call.bob.handle.join(ROOM));
    call.bob
        .observer
        .wait_for("bob connected again", |events| {
            events
                .iter()
                .filter(|e| **e == Observed::State(ConnectionState::Connected))
                .count()
                == 2
        })
        .await;
    call.alice.observer.wait_for_state(ConnectionState::Connected).await;

    assert_eq!(call.alice.sent_count(msg_types::OFFER), 2);
    assert_eq!(call.bob.sent_count(msg_types::ANSWER), 2);
}

#[tokio::test]
async fn test_third_client_gets_room_full() {
    let call = connected_call().await;

    let carol = TestClient::spawn("carol@example.com", &call.registry, &call.network);
    assert_ok!(carol.handle.join(ROOM));
    carol
        .observer
        .wait_for("room full", |events| events.contains(&Observed::RoomFull))
        .await;

    settle().await;
    assert!(carol.observer.states().is_empty());
    assert_eq!(carol.sent_count(msg_types::JOIN_ROOM), 1);
    assert_eq!(carol.sent_count(msg_types::LEAVE_ROOM), 0);
    assert_eq!(call.registry.member_count(ROOM), 2);
    assert_eq!(call.network.open_link_ids().await.len(), 2);
    assert_eq!(
        call.alice.observer.last_state(),
        Some(ConnectionState::Connected)
    );
}

#[tokio::test]
async fn test_network_loss_regenerates_and_alerts() {
    let registry = Arc::new(RoomRegistry::new());
    let network = LoopbackNetwork::new();

    let mut settings = SessionSettings::new("alice@example.com");
    settings.connectivity_alert_threshold = 1;
    let alice = TestClient::spawn_with(
        settings,
        &registry,
        &network,
        Arc::new(SyntheticMediaSource::new()),
    );
    assert_ok!(alice.handle.join(ROOM));
    alice.observer.wait_for_state(ConnectionState::Building).await;
    let alice_link = network.link_ids().await[0];

    let bob = TestClient::spawn("bob@example.com", &registry, &network);
    assert_ok!(bob.handle.join(ROOM));
    alice.observer.wait_for_state(ConnectionState::Connected).await;

    network
        .inject_network_state(alice_link, NetworkState::Disconnected)
        .await;
    alice
        .observer
        .wait_for("regeneration", |events| {
            events.ends_with(&[
                Observed::State(ConnectionState::Closed),
                Observed::State(ConnectionState::Building),
            ])
        })
        .await;

    assert!(alice.observer.events().contains(&Observed::StreamDetached));
    let errors = alice.observer.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("Connectivity lost"));

    // Reports from the discarded connection no longer count
    network
        .inject_network_state(alice_link, NetworkState::Failed)
        .await;
    settle().await;
    assert_eq!(alice.observer.errors().len(), 1);
    assert_eq!(
        alice.observer.last_state(),
        Some(ConnectionState::Building)
    );
}

#[tokio::test]
async fn test_switch_source_replaces_video_without_renegotiation() {
    let call = connected_call().await;
    let alice_link = call.network.link_ids().await[0];

    assert_ok!(call.alice.handle.switch_source(SourceSelector::Screen));
    eventually("screen track on the video sender", || async {
        !call.network.replaced_tracks(alice_link).await.is_empty()
    })
    .await;

    let replaced = call.network.replaced_tracks(alice_link).await;
    assert_eq!(replaced.len(), 1);
    assert_eq!(replaced[0].0, MediaKind::Video);
    assert!(replaced[0].1.starts_with("video-"));

    assert_eq!(call.alice.sent_count(msg_types::OFFER), 1);
    assert_eq!(
        call.alice.observer.last_state(),
        Some(ConnectionState::Connected)
    );
}

#[tokio::test]
async fn test_denied_media_aborts_join() {
    let registry = Arc::new(RoomRegistry::new());
    let network = LoopbackNetwork::new();
    let client = TestClient::spawn_with(
        SessionSettings::new("alice@example.com"),
        &registry,
        &network,
        Arc::new(SyntheticMediaSource::denying()),
    );

    assert_ok!(client.handle.join(ROOM));
    client
        .observer
        .wait_for("media error", |events| {
            events.iter().any(|e| matches!(e, Observed::Error(m) if m.contains("permission denied")))
        })
        .await;

    settle().await;
    assert!(client.transport.sent().is_empty());
    assert_eq!(registry.room_count(), 0);
    assert!(network.link_ids().await.is_empty());

    client.shutdown().await;
}

#[tokio::test]
async fn test_invalid_room_token_is_refused() {
    let registry = Arc::new(RoomRegistry::new());
    let network = LoopbackNetwork::new();
    let client = TestClient::spawn("alice@example.com", &registry, &network);

    assert_ok!(client.handle.join("   "));
    client
        .observer
        .wait_for("token error", |events| {
            events.iter().any(|e| matches!(e, Observed::Error(m) if m.contains("Invalid room token")))
        })
        .await;
    assert!(client.transport.sent().is_empty());
}

#[tokio::test]
async fn test_random_join_pairs_two_clients() {
    let registry = Arc::new(RoomRegistry::new());
    let network = LoopbackNetwork::new();

    let alice = TestClient::spawn("alice@example.com", &registry, &network);
    assert_ok!(alice.handle.join_random());
    alice.observer.wait_for_state(ConnectionState::Building).await;

    let bob = TestClient::spawn("bob@example.com", &registry, &network);
    assert_ok!(bob.handle.join_random());

    alice.observer.wait_for_state(ConnectionState::Connected).await;
    bob.observer.wait_for_state(ConnectionState::Connected).await;

    assert_eq!(alice.sent_count(msg_types::JOIN_RANDOM), 1);
    assert_eq!(registry.room_count(), 1);

    alice.shutdown().await;
    bob.observer
        .wait_for("bye from alice", |events| {
            events.contains(&Observed::StreamDetached)
        })
        .await;
    bob.shutdown().await;
    assert_eq!(registry.room_count(), 0);
}

#[tokio::test]
async fn test_failed_connection_is_rebuilt_at_once() {
    let call = connected_call().await;
    let alice_link = call.network.link_ids().await[0];

    call.network
        .inject_network_state(alice_link, NetworkState::Failed)
        .await;
    call.alice
        .observer
        .wait_for("rebuild after failure", |events| {
            events.ends_with(&[
                Observed::State(ConnectionState::Closed),
                Observed::State(ConnectionState::Building),
            ])
        })
        .await;

    assert_eq!(
        call.alice.observer.states(),
        vec![
            ConnectionState::Building,
            ConnectionState::Negotiating,
            ConnectionState::Connected,
            ConnectionState::Closed,
            ConnectionState::Building
        ]
    );
    assert!(call.alice.observer.events().contains(&Observed::StreamDetached));
    assert!(call.alice.observer.errors().is_empty());

    let links = call.network.link_ids().await;
    assert_eq!(links.len(), 3);
    let open = call.network.open_link_ids().await;
    assert!(!open.contains(&alice_link));
    assert!(open.iter().any(|id| *id > alice_link));
}

#[tokio::test]
async fn test_leave_before_random_assignment_releases_seat() {
    let registry = Arc::new(RoomRegistry::new());
    let network = LoopbackNetwork::new();

    let alice = TestClient::spawn("alice@example.com", &registry, &network);
    assert_ok!(alice.handle.join_random());
    assert_ok!(alice.handle.leave());

    eventually("alice's seat released", || async {
        alice.sent_count(msg_types::LEAVE_ROOM) == 1
    })
    .await;
    settle().await;
    assert_eq!(registry.room_count(), 0);
    assert!(alice.observer.states().is_empty());

    let bob = TestClient::spawn("bob@example.com", &registry, &network);
    assert_ok!(bob.handle.join_random());
    bob.observer.wait_for_state(ConnectionState::Building).await;
    settle().await;
    assert_eq!(registry.room_count(), 1);
    assert_eq!(bob.observer.states(), vec![ConnectionState::Building]);

    let carol = TestClient::spawn("carol@example.com", &registry, &network);
    assert_ok!(carol.handle.join_random());
    bob.observer.wait_for_state(ConnectionState::Connected).await;
    carol.observer.wait_for_state(ConnectionState::Connected).await;
    assert_eq!(registry.room_count(), 1);
}

#[tokio::test]
async fn test_departed_party_candidates_not_applied_to_next_call() {
    let registry = Arc::new(RoomRegistry::new());
    let network = LoopbackNetwork::new();

    let alice = TestClient::spawn("alice@example.com", &registry, &network);
    assert_ok!(alice.handle.join(ROOM));
    alice.observer.wait_for_state(ConnectionState::Building).await;
    let first_link = network.link_ids().await[0];

    // A relay client that joins, never answers and then goes away
    let (ghost_tx, _ghost_rx) = mpsc::unbounded_channel();
    let ghost = ClientHandle::new("ghost".to_string(), ghost_tx);
    registry.handle(
        &ghost,
        ClientSignal::JoinRoom {
            room: ROOM.to_string(),
        },
    );
    eventually("alice offers to the ghost", || async {
        alice.sent_count(msg_types::OFFER) == 1
    })
    .await;

    network
        .inject_network_state(first_link, NetworkState::Failed)
        .await;
    alice
        .observer
        .wait_for("alice back on standby", |events| {
            events.ends_with(&[
                Observed::State(ConnectionState::Closed),
                Observed::State(ConnectionState::Building),
            ])
        })
        .await;
    let standby_link = *network.link_ids().await.last().expect("Should have a standby link");

    registry.handle(
        &ghost,
        ClientSignal::Ice {
            candidate: IceCandidate::new(
                "candidate:9 1 udp 2122252543 10.9.9.9 50009 typ host",
                Some("0"),
                Some(0),
            ),
            room: ROOM.to_string(),
        },
    );
    settle().await;
    registry.handle(
        &ghost,
        ClientSignal::LeaveRoom {
            room: ROOM.to_string(),
        },
    );
    settle().await;

    let carol = TestClient::spawn("carol@example.com", &registry, &network);
    assert_ok!(carol.handle.join(ROOM));
    alice.observer.wait_for_state(ConnectionState::Connected).await;
    carol.observer.wait_for_state(ConnectionState::Connected).await;
    eventually("carol's candidate applied", || async {
        !network.applied_candidates(standby_link).await.is_empty()
    })
    .await;

    let applied = network.applied_candidates(standby_link).await;
    assert!(applied.iter().all(|c| !c.candidate.contains("10.9.9.9")));
}
