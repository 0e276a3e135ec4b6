use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use storyloom_assets::AssetKind;
use storyloom_core::{
    builtin_library, AppPhase, AuditKind, AuthoringError, Orchestrator, OrchestratorConfig,
    StoryRequest,
};
use storyloom_test_utils::{generated_story, prompt, RecordingStore, ScriptedAuthor, ScriptedBackend};
use tokio::time::Instant;

fn request() -> StoryRequest {
    StoryRequest::new("turtle", "hare", "a meadow")
}

fn orchestrator(author: Arc<ScriptedAuthor>, backend: Arc<ScriptedBackend>) -> Orchestrator {
    let config = OrchestratorConfig::default().with_lookahead(1);
    Orchestrator::with_store(config, Arc::new(RecordingStore::new()), backend).with_author(author)
}

#[tokio::test(start_paused = true)]
async fn authored_story_is_selected_and_resolved() {
    let author = Arc::new(ScriptedAuthor::returning(generated_story(5)));
    let backend = Arc::new(ScriptedBackend::new());
    let mut orchestrator = orchestrator(author.clone(), backend.clone());

    let story = orchestrator.author_story(request()).await.unwrap();

    assert!(story.is_custom);
    assert!(story.id.starts_with("custom-"));
    assert_eq!(story.scene_count(), 5);
    assert_eq!(orchestrator.library()[0].id, story.id);

    let view = orchestrator.session().snapshot();
    assert_eq!(view.phase, AppPhase::Intro);
    assert_eq!(view.story_id(), Some(story.id.as_str()));
    assert!(view.scenes[0].is_generating_image());

    orchestrator.scheduler().settle().await;
    assert_eq!(backend.total_calls(), 4);
    assert_eq!(backend.calls_for(AssetKind::Image, &prompt(0)), 1);

    let story_entries: Vec<_> = orchestrator
        .audit()
        .entries()
        .into_iter()
        .filter(|entry| entry.kind == AuditKind::Story)
        .collect();
    assert_eq!(story_entries.len(), 1);
    assert_eq!(story_entries[0].detail, "New Story: turtle & hare");
    assert_eq!(author.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn authoring_failure_moves_to_error() {
    let author = Arc::new(ScriptedAuthor::rate_limited());
    let backend = Arc::new(ScriptedBackend::new());
    let mut orchestrator = orchestrator(author.clone(), backend.clone());
    let start = Instant::now();

    let err = orchestrator.author_story(request()).await.unwrap_err();

    assert!(matches!(err, AuthoringError::Generation(_)));
    assert_eq!(author.calls(), 2);
    assert_eq!(start.elapsed(), Duration::from_millis(2000));

    let view = orchestrator.session().snapshot();
    assert!(matches!(view.phase, AppPhase::Error(_)));
    assert!(view.scenes.is_empty());
    assert_eq!(backend.total_calls(), 0);
    assert_eq!(orchestrator.library().len(), builtin_library().len());

    orchestrator.scheduler().dismiss_error().unwrap();
    assert_eq!(orchestrator.session().phase(), AppPhase::Library);
}

#[tokio::test]
async fn story_without_scenes_is_rejected() {
    let author = Arc::new(ScriptedAuthor::returning(generated_story(0)));
    let mut orchestrator = orchestrator(author, Arc::new(ScriptedBackend::new()));

    let err = orchestrator.author_story(request()).await.unwrap_err();

    assert!(matches!(err, AuthoringError::InvalidStory(_)));
    assert!(matches!(orchestrator.session().phase(), AppPhase::Error(_)));
}

#[tokio::test]
async fn incomplete_request_never_reaches_author() {
    let author = Arc::new(ScriptedAuthor::returning(generated_story(3)));
    let mut orchestrator = orchestrator(author.clone(), Arc::new(ScriptedBackend::new()));

    let err = orchestrator
        .author_story(StoryRequest::new("", "hare", "meadow"))
        .await
        .unwrap_err();

    assert_eq!(err, AuthoringError::MissingField("main character"));
    assert_eq!(author.calls(), 0);
    assert_eq!(orchestrator.session().phase(), AppPhase::Library);
}

#[tokio::test]
async fn workshop_requires_an_author() {
    let mut orchestrator = Orchestrator::with_store(
        OrchestratorConfig::default(),
        Arc::new(RecordingStore::new()),
        Arc::new(ScriptedBackend::new()),
    );

    let err = orchestrator.author_story(request()).await.unwrap_err();
    assert_eq!(err, AuthoringError::NoAuthor);
    assert_eq!(orchestrator.session().phase(), AppPhase::Library);
}
