use crate::*;

#[tokio::test]
async fn test_status_reports_sessions_and_slots() -> Result<()> {
    let daemon = Daemon::start(test_config()).await?;
    daemon.init_session(&small_model()).await?;
    daemon.create_session().await?;

    let status: Value = daemon
        .client
        .get(daemon.url("/status"))
        .send()
        .await?
        .json()
        .await?;

    assert_eq!(status["sessions"]["live"], 2);
    assert_eq!(status["sessions"]["initialized"], 1);
    assert_eq!(status["sessions"]["max"], 500);
    assert!(status["sessions"].get("list").is_none());

    assert_eq!(status["compute"]["max_concurrent"], 2);
    assert_eq!(status["compute"]["available"], 2);
    assert_eq!(status["compute"]["waiting"], 0);
    assert_eq!(status["budget"]["max_budget_units"], 50_000_000);
    assert_eq!(status["budget"]["max_calc_time_secs"], 8.0);

    daemon.stop().await
}

#[tokio::test]
async fn test_status_never_exposes_session_ids() -> Result<()> {
    let mut config = test_config();
    config.compute.max_concurrent = 1;
    let engine = Arc::new(crate::calculate::SlowEngine::new(Duration::from_millis(800)));
    let daemon = Daemon::start_with(config, engine).await?;
    let (id, token) = daemon.init_session(&small_model()).await?;

    let run = tokio::spawn(
        daemon
            .authed(reqwest::Method::POST, "/session/calculate", &id, &token)
            .send(),
    );
    tokio::time::sleep(Duration::from_millis(300)).await;

    let text = daemon.client.get(daemon.url("/status")).send().await?.text().await?;
    let status: Value = serde_json::from_str(&text)?;
    assert_eq!(status["compute"]["in_flight"].as_array().map(Vec::len), Some(1));
    assert!(!text.contains(&id), "status leaked a session id: {text}");

    assert!(run.await??.status().is_success());
    daemon.stop().await
}

#[tokio::test]
async fn test_shutdown_route_is_gone() -> Result<()> {
    let daemon = Daemon::start(test_config()).await?;

    let resp = daemon.client.post(daemon.url("/daemon/shutdown")).send().await?;
    assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
    assert!(!daemon.handle.is_finished());

    daemon.stop().await
}
