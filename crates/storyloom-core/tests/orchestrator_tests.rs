use pretty_assertions::assert_eq;
use std::sync::Arc;
use storyloom_core::{AppPhase, NavigationError, Orchestrator, OrchestratorConfig, Step};
use storyloom_test_utils::ScriptedBackend;

#[tokio::test(start_paused = true)]
async fn durable_directory_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = OrchestratorConfig::default()
        .with_lookahead(1)
        .with_asset_dir(dir.path());
    let backend = Arc::new(ScriptedBackend::new());

    let first = Orchestrator::open(config.clone(), backend.clone()).await.unwrap();
    first.open_story("blue-jackal").await.unwrap();
    first.scheduler().start_reading().unwrap();
    first.scheduler().settle().await;
    assert_eq!(backend.total_calls(), 4);

    let second = Orchestrator::open(config, backend.clone()).await.unwrap();
    second.open_story("blue-jackal").await.unwrap();

    let view = second.session().snapshot();
    assert!(view.scenes[0].image_url().is_some());
    assert!(view.scenes[1].audio_url().is_some());
    assert_eq!(second.scheduler().pending(), 0);
    assert_eq!(backend.total_calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn audit_ledger_is_bounded() {
    let mut config = OrchestratorConfig::default().with_lookahead(5);
    config.audit_capacity = 3;
    let orchestrator = Orchestrator::open(config, Arc::new(ScriptedBackend::new()))
        .await
        .unwrap();

    orchestrator.open_story("monkey-crocodile").await.unwrap();
    orchestrator.scheduler().settle().await;

    assert_eq!(orchestrator.audit().len(), 3);
    let entries = orchestrator.audit().entries();
    assert!(entries
        .windows(2)
        .all(|pair| pair[0].timestamp >= pair[1].timestamp));
}

#[tokio::test(start_paused = true)]
async fn reads_a_builtin_story_to_the_end() {
    let orchestrator = Orchestrator::open(OrchestratorConfig::default(), Arc::new(ScriptedBackend::new()))
        .await
        .unwrap();

    orchestrator.open_story("blue-jackal").await.unwrap();
    let scheduler = orchestrator.scheduler();
    scheduler.start_reading().unwrap();
    while let Step::Moved(_) = scheduler.advance().unwrap() {
        scheduler.settle().await;
    }

    assert_eq!(orchestrator.session().phase(), AppPhase::Finished);
    scheduler.settle().await;
    let view = orchestrator.session().snapshot();
    assert!(view
        .scenes
        .iter()
        .all(|scene| scene.image_url().is_some() && scene.audio_url().is_some()));
}

#[tokio::test(start_paused = true)]
async fn every_classic_story_can_be_opened() {
    let orchestrator = Orchestrator::open(OrchestratorConfig::default(), Arc::new(ScriptedBackend::new()))
        .await
        .unwrap();

    for id in [
        "monkey-crocodile",
        "clever-rabbit",
        "blue-jackal",
        "talkative-turtle",
        "musical-donkey",
    ] {
        orchestrator.open_story(id).await.unwrap();
        assert_eq!(orchestrator.session().snapshot().story_id(), Some(id));
        orchestrator.scheduler().return_to_library();
    }
    orchestrator.scheduler().settle().await;
}

#[tokio::test]
async fn unknown_story_is_rejected() {
    let orchestrator = Orchestrator::open(OrchestratorConfig::default(), Arc::new(ScriptedBackend::new()))
        .await
        .unwrap();

    let err = orchestrator.open_story("missing").await.unwrap_err();
    assert_eq!(err, NavigationError::UnknownStory("missing".into()));
}

#[tokio::test]
async fn invalid_config_is_refused() {
    let config = OrchestratorConfig::default().with_retry(0, 10);
    assert!(Orchestrator::open(config, Arc::new(ScriptedBackend::new()))
        .await
        .is_err());
}
