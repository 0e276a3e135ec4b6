//! Story library
//!
//! Stories are the ordered scene scripts the scheduler walks. The built-in
//! catalogue ships with the crate; custom stories come from the authoring
//! workshop.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Script for one scene
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneScript {
    /// Narrated text (speech source)
    pub narrative: String,
    /// Illustration prompt (image source)
    pub image_prompt: String,
}

impl SceneScript {
    /// Create new scene script
    #[inline]
    #[must_use]
    pub fn new(narrative: impl Into<String>, image_prompt: impl Into<String>) -> Self {
        Self {
            narrative: narrative.into(),
            image_prompt: image_prompt.into(),
        }
    }
}

/// A readable story
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    /// Stable id; namespaces every asset key
    pub id: String,
    /// Display title
    pub title: String,
    /// Credited author
    pub author: String,
    /// Moral of the story
    pub lesson: String,
    /// Ordered scenes
    pub scenes: Vec<SceneScript>,
    /// Authored by the workshop rather than shipped
    #[serde(default)]
    pub is_custom: bool,
}

impl Story {
    /// Create new story
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            author: String::new(),
            lesson: String::new(),
            scenes: Vec::new(),
            is_custom: false,
        }
    }

    /// With author
    #[inline]
    #[must_use]
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    /// With lesson
    #[inline]
    #[must_use]
    pub fn with_lesson(mut self, lesson: impl Into<String>) -> Self {
        self.lesson = lesson.into();
        self
    }

    /// With scene appended
    #[inline]
    #[must_use]
    pub fn with_scene(mut self, narrative: impl Into<String>, image_prompt: impl Into<String>) -> Self {
        self.scenes.push(SceneScript::new(narrative, image_prompt));
        self
    }

    /// Mark as custom
    #[inline]
    #[must_use]
    pub fn custom(mut self) -> Self {
        self.is_custom = true;
        self
    }

    /// Number of scenes
    #[inline]
    #[must_use]
    pub fn scene_count(&self) -> usize {
        self.scenes.len()
    }
}

/// Built-in catalogue
#[must_use]
pub fn builtin_library() -> Vec<Arc<Story>> {
    vec![
        Arc::new(
            Story::new("monkey-crocodile", "The Monkey & The Crocodile")
                .with_author("Swapan Roy")
                .with_lesson("Quick thinking gets you out of danger, and greed ruins friendship.")
                .with_scene(
                    "A clever monkey lived in a berry tree by the river. He gave sweet fruit to a crocodile who visited every day. They became best friends.",
                    "Cute monkey in a berry tree throwing fruit to a crocodile in the river, colorful 3d animation style, pixar style, soft lighting",
                )
                .with_scene(
                    "The crocodile's wife ate the fruit but wanted more. 'I want to eat the monkey's heart!' she told her husband. The crocodile was sad but had to listen.",
                    "Crocodile talking to his wife in a river cave, wife looks greedy, colorful 3d animation style",
                )
                .with_scene(
                    "The crocodile invited the monkey for dinner. The trusting monkey hopped on the crocodile's back to cross the river.",
                    "Monkey riding on crocodile back in the middle of a river, bright colors, 3d animation style",
                )
                .with_scene(
                    "In the middle of the river, the crocodile said, 'My wife wants to eat your heart!' The monkey was scared but thought fast.",
                    "Crocodile swimming in water, monkey looks scared and surprised, close up, 3d animation style",
                )
                .with_scene(
                    "'Oh no!' said the monkey. 'I left my heart in the tree! Take me back to get it.' The silly crocodile turned around.",
                    "Crocodile swimming back towards the shore with monkey, 3d animation style",
                )
                .with_scene(
                    "The monkey jumped up the tree safely. 'You silly crocodile! Hearts stay in our bodies!' He waved goodbye.",
                    "Monkey safe high in tree laughing at crocodile below in water, 3d animation style",
                ),
        ),
        Arc::new(
            Story::new("clever-rabbit", "The Clever Rabbit & The Lion")
                .with_author("Swapan Roy")
                .with_lesson("Intelligence and quick thinking can defeat even the strongest enemy.")
                .with_scene(
                    "A big, mean lion ate animals every day. The scared animals promised to send one meal a day so he would stop hunting.",
                    "Scared forest animals talking to a big lion in forest, cute 3d animation style",
                )
                .with_scene(
                    "It was the rabbit's turn. He walked very slowly. The lion was hungry and angry. 'Why are you late?' he roared.",
                    "Tiny cute rabbit standing brave before a huge angry lion, 3d animation style",
                )
                .with_scene(
                    "'Another lion stopped me,' said the rabbit. 'He says he is the king!' The lion was furious. 'Show me this other lion!'",
                    "Rabbit talking to angry lion close up, rabbit pointing away, 3d animation style",
                )
                .with_scene(
                    "The rabbit led the lion to a deep well. 'He is inside that cave,' whispered the rabbit.",
                    "Rabbit pointing to a stone well in the forest, lion looking suspicious, 3d animation style",
                )
                .with_scene(
                    "The lion saw his reflection in the water. He roared and jumped in to fight the 'other' lion, but fell into the deep water.",
                    "Lion jumping into a well, seeing reflection in water, dynamic action, 3d animation style",
                )
                .with_scene(
                    "The clever rabbit went back home happily. He had saved all the animals!",
                    "Rabbit cheering with other forest animals, happy celebration, 3d animation style",
                ),
        ),
        Arc::new(
            Story::new("blue-jackal", "The Blue Jackal")
                .with_author("Swapan Roy")
                .with_lesson("You cannot pretend to be someone you're not forever. The truth always comes out.")
                .with_scene(
                    "A jackal fell into a tub of blue dye while running from dogs. When he came out, he was bright blue from head to tail!",
                    "Jackal falling into a bucket of blue paint, funny scene, 3d animation style",
                )
                .with_scene(
                    "The animals in the forest did not know who he was. 'I am a special King sent by the gods!' said the blue jackal.",
                    "Blue jackal standing on a rock, deer and bears looking amazed, 3d animation style",
                )
                .with_scene(
                    "The lion and tiger served him food. The blue jackal was very happy being king and bossing everyone around.",
                    "Blue jackal sitting on a throne, lion bringing fruit, 3d animation style",
                )
                .with_scene(
                    "One night, other jackals howled at the moon. The blue jackal forgot he was pretending and howled back! 'Awoooo!'",
                    "Blue jackal howling at the full moon, 3d animation style",
                )
                .with_scene(
                    "The animals heard him. 'He is just a jackal!' they shouted. They chased the trickster out of the forest.",
                    "Angry animals chasing the blue jackal away, 3d animation style",
                ),
        ),
        Arc::new(
            Story::new("talkative-turtle", "The Talkative Turtle")
                .with_author("Swapan Roy")
                .with_lesson("Sometimes staying quiet and listening is smarter than talking. Think before you speak!")
                .with_scene(
                    "A turtle and two geese were best friends. One summer, their pond dried up, so they had to leave to find water.",
                    "Sad turtle and two geese looking at a dry pond, 3d animation style",
                )
                .with_scene(
                    "The geese had a plan. They held a stick with their beaks and the turtle bit the middle. 'Do not talk!' they warned.",
                    "Geese flying in sky carrying a turtle holding a stick with mouth, 3d animation style",
                )
                .with_scene(
                    "Children in a village saw them. 'Look! A flying turtle!' they laughed. The turtle wanted to say, 'It was my idea!'",
                    "Children pointing at sky laughing, village background, 3d animation style",
                )
                .with_scene(
                    "The turtle opened his mouth to shout. He let go of the stick and fell down to the ground. Bonk!",
                    "Turtle falling from the sky, stick still in geese beaks, funny scene, 3d animation style",
                )
                .with_scene(
                    "The geese looked down sadly. The turtle learned that sometimes it is better to stay quiet.",
                    "Turtle sitting on ground with a bump on head, geese landing next to him, 3d animation style",
                ),
        ),
        Arc::new(
            Story::new("musical-donkey", "The Musical Donkey")
                .with_author("Swapan Roy")
                .with_lesson("There is a right time and place for everything. Think about consequences before acting.")
                .with_scene(
                    "A donkey and a jackal went to a farmer's garden at night to eat yummy carrots and cucumbers.",
                    "Donkey and jackal eating vegetables in a moonlit garden, 3d animation style",
                )
                .with_scene(
                    "The donkey was full and happy. 'I want to sing!' he said. 'No!' said the jackal. 'You are too loud! We will get caught!'",
                    "Donkey looks happy ready to sing, jackal looks scared and waving paws, 3d animation style",
                )
                .with_scene(
                    "The jackal ran away to hide. The donkey started to bray loudly. 'HEE-HAW! HEE-HAW!'",
                    "Donkey braying loudly with mouth open, notes flying, jackal hiding in bushes, 3d animation style",
                )
                .with_scene(
                    "The farmers woke up and ran out with sticks. They chased the loud donkey away.",
                    "Angry farmers running, chasing a donkey out of the gate, 3d animation style",
                ),
        ),
    ]
}

/// Find a built-in story by id
#[must_use]
pub fn find_builtin(id: &str) -> Option<Arc<Story>> {
    builtin_library().into_iter().find(|story| story.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_ids_are_unique() {
        let library = builtin_library();
        let mut ids: Vec<_> = library.iter().map(|s| s.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), library.len());
    }

    #[test]
    fn builtin_stories_have_scenes() {
        for story in builtin_library() {
            assert!(story.scene_count() > 0, "{} is empty", story.id);
            assert!(!story.is_custom);
        }
        assert_eq!(builtin_library().len(), 5);
        assert_eq!(find_builtin("monkey-crocodile").unwrap().scene_count(), 6);
        assert_eq!(find_builtin("talkative-turtle").unwrap().scene_count(), 5);
        assert_eq!(find_builtin("musical-donkey").unwrap().scene_count(), 4);
        assert!(find_builtin("missing").is_none());
    }

    #[test]
    fn story_serializes_camel_case() {
        let story = Story::new("s", "S").with_scene("text", "prompt");
        let json = serde_json::to_value(&story).unwrap();
        assert_eq!(json["scenes"][0]["imagePrompt"], "prompt");
        assert_eq!(json["isCustom"], false);
    }
}
