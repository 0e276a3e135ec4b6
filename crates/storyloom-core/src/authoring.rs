//! Custom story authoring
//!
//! Turns a short request (two characters and a setting) into a readable
//! [`Story`] via a [`StoryAuthor`], then opens it like any library story.
//! Failures surface as the application [`AppPhase::Error`] phase; they never
//! touch the asset pipeline.

use crate::audit::{AuditEntry, AuditKind};
use crate::backend::TokenUsage;
use crate::error::{AuthoringError, GenerationError};
use crate::library::{SceneScript, Story};
use crate::retry::RetryPolicy;
use crate::scheduler::LookaheadScheduler;
use crate::session::AppPhase;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;
use tracing::{error, info};
use ulid::Ulid;

/// Credited author of workshop stories
pub const CUSTOM_STORY_AUTHOR: &str = "Storyloom Workshop";

/// What the reader asked for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryRequest {
    /// Hero of the story
    pub main_character: String,
    /// Companion or antagonist
    pub second_character: String,
    /// Where it happens
    pub setting: String,
}

impl StoryRequest {
    /// Create new request
    #[inline]
    #[must_use]
    pub fn new(
        main_character: impl Into<String>,
        second_character: impl Into<String>,
        setting: impl Into<String>,
    ) -> Self {
        Self {
            main_character: main_character.into(),
            second_character: second_character.into(),
            setting: setting.into(),
        }
    }

    fn validate(&self) -> Result<(), AuthoringError> {
        if self.main_character.trim().is_empty() {
            return Err(AuthoringError::MissingField("main character"));
        }
        if self.second_character.trim().is_empty() {
            return Err(AuthoringError::MissingField("second character"));
        }
        if self.setting.trim().is_empty() {
            return Err(AuthoringError::MissingField("setting"));
        }
        Ok(())
    }

    /// Ledger description of this request
    #[must_use]
    pub fn audit_detail(&self) -> String {
        format!("New Story: {} & {}", self.main_character, self.second_character)
    }
}

/// Story structure returned by an author
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedStory {
    /// Title
    pub title: String,
    /// Moral
    pub lesson: String,
    /// Ordered scenes
    pub scenes: Vec<SceneScript>,
}

/// Author response with usage metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authored {
    /// The story structure
    pub story: GeneratedStory,
    /// Provider usage, if reported
    pub usage: Option<TokenUsage>,
}

/// Story text generation
#[async_trait]
pub trait StoryAuthor: Send + Sync + Debug {
    /// Write a story for `request`
    async fn author(&self, request: &StoryRequest) -> Result<Authored, GenerationError>;
}

/// Authoring flow bound to a scheduler
#[derive(Debug)]
pub struct StoryWorkshop {
    author: Arc<dyn StoryAuthor>,
    retry: RetryPolicy,
    scheduler: Arc<LookaheadScheduler>,
}

impl StoryWorkshop {
    /// Create workshop
    #[must_use]
    pub fn new(author: Arc<dyn StoryAuthor>, retry: RetryPolicy, scheduler: Arc<LookaheadScheduler>) -> Self {
        Self {
            author,
            retry,
            scheduler,
        }
    }

    /// Author a story and open it
    ///
    /// The session shows [`AppPhase::GeneratingText`] while the author runs.
    /// On success the new story is selected and its first window submitted.
    ///
    /// # Errors
    /// Missing request fields, author failure after retries, or a story
    /// without scenes. Author failures also move the session to
    /// [`AppPhase::Error`].
    pub async fn author(&self, request: StoryRequest) -> Result<Arc<Story>, AuthoringError> {
        request.validate()?;

        let session = self.scheduler.session();
        let epoch = session.enter_detached(AppPhase::GeneratingText);
        info!(main = %request.main_character, second = %request.second_character, "authoring story");

        let author = self.author.as_ref();
        let request_ref = &request;
        let authored = self
            .retry
            .run("generate_custom_story", move || author.author(request_ref))
            .await;

        let story = authored
            .map_err(AuthoringError::from)
            .and_then(|authored| {
                self.scheduler
                    .pipeline()
                    .audit()
                    .record(AuditEntry::new(AuditKind::Story, request.audit_detail(), authored.usage));
                build_story(authored.story)
            });

        let story = match story {
            Ok(story) => Arc::new(story),
            Err(err) => {
                error!(error = %err, "story authoring failed");
                session.set_phase(epoch, AppPhase::Error(err.to_string()));
                return Err(err);
            }
        };

        if session.epoch() == epoch {
            self.scheduler
                .select_story(Arc::clone(&story))
                .await
                .map_err(|err| AuthoringError::InvalidStory(err.to_string()))?;
        } else {
            info!(story = %story.id, "session moved on during authoring, story not opened");
        }
        Ok(story)
    }
}

fn build_story(generated: GeneratedStory) -> Result<Story, AuthoringError> {
    if generated.scenes.is_empty() {
        return Err(AuthoringError::InvalidStory("story has no scenes".into()));
    }
    if generated.title.trim().is_empty() {
        return Err(AuthoringError::InvalidStory("story has no title".into()));
    }

    let id = format!("custom-{}", Ulid::new().to_string().to_lowercase());
    let mut story = Story::new(id, generated.title)
        .with_author(CUSTOM_STORY_AUTHOR)
        .with_lesson(generated.lesson)
        .custom();
    story.scenes = generated.scenes;
    Ok(story)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generated(scenes: usize) -> GeneratedStory {
        GeneratedStory {
            title: "The Kind Owl".into(),
            lesson: "Be kind".into(),
            scenes: (0..scenes)
                .map(|i| SceneScript::new(format!("n{i}"), format!("p{i}")))
                .collect(),
        }
    }

    #[test]
    fn request_validation() {
        assert!(StoryRequest::new("owl", "mouse", "forest").validate().is_ok());
        assert_eq!(
            StoryRequest::new("owl", " ", "forest").validate(),
            Err(AuthoringError::MissingField("second character"))
        );
        assert_eq!(
            StoryRequest::new("owl", "mouse", "forest").audit_detail(),
            "New Story: owl & mouse"
        );
    }

    #[test]
    fn build_story_marks_custom() {
        let story = build_story(generated(3)).unwrap();
        assert!(story.id.starts_with("custom-"));
        assert!(story.is_custom);
        assert_eq!(story.scene_count(), 3);
        assert_eq!(story.author, CUSTOM_STORY_AUTHOR);
    }

    #[test]
    fn build_story_rejects_empty() {
        assert!(matches!(
            build_story(generated(0)),
            Err(AuthoringError::InvalidStory(_))
        ));
    }

    #[test]
    fn generated_story_parses_provider_json() {
        let json = r#"{"title":"T","lesson":"L","scenes":[{"narrative":"n","imagePrompt":"p"}]}"#;
        let story: GeneratedStory = serde_json::from_str(json).unwrap();
        assert_eq!(story.scenes[0].image_prompt, "p");
    }
}
