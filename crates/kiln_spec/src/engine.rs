//! Engine detection from generated source.

use serde::{Deserialize, Serialize};

use crate::models::EngineTag;

/// Substrings that identify one engine in an entry file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineMarkers {
    pub engine: EngineTag,
    pub markers: Vec<String>,
}

impl EngineMarkers {
    pub fn new(engine: EngineTag, markers: &[&str]) -> Self {
        Self {
            engine,
            markers: markers.iter().map(|m| m.to_string()).collect(),
        }
    }

    /// Built-in marker sets for the two supported engines.
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new(
                EngineTag::Phaser,
                &["from 'phaser'", "from \"phaser\"", "Phaser.Game", "Phaser.Scene", "new Phaser."],
            ),
            Self::new(
                EngineTag::Three,
                &[
                    "from 'three'",
                    "from \"three\"",
                    "THREE.",
                    "@react-three/fiber",
                    "WebGLRenderer",
                ],
            ),
        ]
    }

    fn matches(&self, content: &str) -> bool {
        self.markers.iter().any(|m| content.contains(m.as_str()))
    }
}

/// Classify content by engine markers. More than one engine yields `Both`.
pub fn detect_engine(content: &str, markers: &[EngineMarkers]) -> EngineTag {
    markers
        .iter()
        .filter(|set| set.matches(content))
        .fold(EngineTag::None, |acc, set| acc.combine(set.engine))
}
