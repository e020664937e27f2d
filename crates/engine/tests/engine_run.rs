// In crates/engine/tests/engine_run.rs

use api_client::{SimulatedGateway, SimulationParams};
use engine::Engine;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const SETTINGS: &str = r#"
    [app]
    environment = "test"

    [resilience]
    max_live_instruments = 2

    [batch]
    api_delay_ms = 10
    batch_delay_ms = 20

    [[universe.instruments]]
    code = "005930"
    name = "Samsung Electronics"

    [[universe.instruments]]
    code = "000660"
    name = "SK Hynix"

    [[universe.instruments]]
    code = "035420"
    name = "NAVER"
"#;

#[tokio::test(start_paused = true)]
async fn engine_partitions_runs_and_releases_subscriptions() {
    let settings = app_config::settings_from_toml(SETTINGS).unwrap();
    let gateway = Arc::new(SimulatedGateway::new(&settings.instruments(), SimulationParams::default()));
    let engine = Arc::new(Engine::new(settings, gateway.clone()).unwrap());

    assert_eq!(engine.partition().live.len(), 2);
    assert_eq!(engine.partition().poll.len(), 1);

    let token = CancellationToken::new();
    let run = tokio::spawn({
        let engine = engine.clone();
        let token = token.clone();
        async move { engine.run(token).await }
    });

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(gateway.subscriber_count().await, 2);
    // The polled instrument was pre-seeded on its first cycle.
    assert!(engine.pipeline().store().is_seeded(&engine.partition().poll[0].code));

    token.cancel();
    run.await.unwrap().unwrap();
    assert_eq!(gateway.subscriber_count().await, 0);
}
