use autocoder_rs_config::ServerConfig;
use autocoder_rs_sync::{
    Channel, ConnectionStatus, EffectKind, EntitySnapshot, SubscriptionKey, SyncClient, SyncError,
};
use autocoder_rs_test_utils::{ScriptedConnector, fast_config};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn client(connector: &ScriptedConnector) -> SyncClient {
    SyncClient::with_connector(fast_config(), Arc::new(connector.clone())).expect("client")
}

#[tokio::test(start_paused = true)]
async fn subscribing_twice_shares_one_connection() {
    let connector = ScriptedConnector::new();
    let mut client = client(&connector);

    let first = client.subscribe(Channel::Project, "shop");
    let second = client.subscribe(Channel::Project, "shop");
    first.connect().expect("connect");
    second.connect().expect("connect");
    let _server = connector.accepted().await;
    second
        .wait_for(|s| s.status == ConnectionStatus::Connected)
        .await
        .expect("connected");

    assert_eq!(connector.attempts(), 1);
    assert_eq!(client.subscription_count(), 1);
    assert_eq!(first.snapshot().status, ConnectionStatus::Connected);
}

#[tokio::test(start_paused = true)]
async fn channels_with_same_name_are_distinct() {
    let connector = ScriptedConnector::new();
    let mut client = client(&connector);

    client.subscribe(Channel::Project, "my shop").connect().expect("project");
    let _project = connector.accepted().await;
    client
        .subscribe(Channel::Assistant, "my shop")
        .connect()
        .expect("assistant");
    let _assistant = connector.accepted().await;

    assert_eq!(
        connector.urls(),
        vec![
            "ws://test.local:8888/ws/projects/my%20shop".to_string(),
            "ws://test.local:8888/api/assistant/ws/my%20shop".to_string(),
        ]
    );
    assert_eq!(client.subscription_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn release_closes_transport_and_rejects_commands() {
    let connector = ScriptedConnector::new();
    let mut client = client(&connector);
    let feed = client.subscribe(Channel::Project, "shop");
    feed.connect().expect("connect");
    let server = connector.accepted().await;
    feed.wait_for(|s| s.status == ConnectionStatus::Connected)
        .await
        .expect("connected");

    let key = SubscriptionKey::new(Channel::Project, "shop");
    assert!(client.release(&key).await);
    assert!(!client.release(&key).await);
    assert!(server.client_dropped());
    assert!(matches!(
        feed.pending_timers().await,
        Err(SyncError::SubscriptionClosed)
    ));
    assert_eq!(feed.snapshot().status, ConnectionStatus::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn celebration_is_not_repeated_after_switching_projects() {
    let connector = ScriptedConnector::new();
    let mut client = client(&connector);
    let shop = SubscriptionKey::new(Channel::Project, "shop");

    client.subscribe(Channel::Project, "shop");
    client.observe_features("shop", EntitySnapshot::from_features([], [1], []));
    let effects = client.observe_features("shop", EntitySnapshot::from_features([], [], [1]));
    let kinds: Vec<EffectKind> = effects.iter().map(|effect| effect.kind).collect();
    assert_eq!(
        kinds,
        vec![EffectKind::FeatureCompleted, EffectKind::AllComplete]
    );

    client.release(&shop).await;
    client.subscribe(Channel::Project, "blog");
    client.subscribe(Channel::Project, "shop");
    assert!(
        client
            .observe_features("shop", EntitySnapshot::from_features([], [], [1]))
            .is_empty()
    );
    assert!(client.effects().has_fired("shop", EffectKind::AllComplete));
}

#[tokio::test(start_paused = true)]
async fn secure_server_uses_wss() {
    let connector = ScriptedConnector::new();
    let mut config = fast_config();
    config.server = ServerConfig {
        host: "agents.example.com".to_string(),
        secure: true,
    };
    let mut client =
        SyncClient::with_connector(config, Arc::new(connector.clone())).expect("client");

    client.subscribe(Channel::Project, "shop").connect().expect("connect");
    let server = connector.accepted().await;
    assert_eq!(server.url(), "wss://agents.example.com/ws/projects/shop");
}

#[tokio::test(start_paused = true)]
async fn shutdown_releases_everything() {
    let connector = ScriptedConnector::new();
    let mut client = client(&connector);
    let feed = client.subscribe(Channel::Project, "shop");
    let chat = client.subscribe(Channel::Assistant, "shop");

    client.shutdown().await;
    assert_eq!(client.subscription_count(), 0);
    assert!(feed.pending_timers().await.is_err());
    assert!(chat.pending_timers().await.is_err());
}

#[tokio::test]
async fn zero_keepalive_interval_is_rejected() {
    let connector = ScriptedConnector::new();
    let mut config = fast_config();
    config.keepalive_interval_ms = 0;

    let result = SyncClient::with_connector(config, Arc::new(connector.clone()));
    assert!(matches!(result, Err(SyncError::Config(_))));
    assert_eq!(connector.attempts(), 0);
}

#[tokio::test]
async fn unaddressable_host_is_rejected() {
    let connector = ScriptedConnector::new();
    let mut config = fast_config();
    config.server.host = "bad host".to_string();

    let result = SyncClient::with_connector(config, Arc::new(connector.clone()));
    assert!(matches!(result, Err(SyncError::InvalidEndpoint { .. })));
}
