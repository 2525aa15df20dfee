//! Generation chain collaborator.
//!
//! A chain is a fixed sequence of text-generation stages. Each stage sees the
//! original request and the previous stage's output; the last output is the
//! raw text handed to extraction. Stage text is opaque to the pipeline.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::{SessionError, SessionResult};

/// What a stage is asked to work on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageInput {
    /// The user's prompt
    pub request: String,
    /// Output of the preceding stage, `None` for the first
    pub previous: Option<String>,
    /// Zero-based position in the chain
    pub index: usize,
}

impl StageInput {
    /// Text a stage should send to its generator.
    pub fn render(&self) -> String {
        match &self.previous {
            Some(previous) => format!(
                "Request:\n{}\n\nPrevious stage output:\n{}",
                self.request, previous
            ),
            None => self.request.clone(),
        }
    }
}

/// One text-generation step.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GenerationStage: Send + Sync {
    fn name(&self) -> String;

    async fn generate(&self, input: StageInput) -> SessionResult<String>;
}

/// Stage returning fixed text. Used to replay saved output offline.
#[derive(Debug, Clone)]
pub struct StaticStage {
    name: String,
    text: String,
}

impl StaticStage {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }
}

#[async_trait]
impl GenerationStage for StaticStage {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn generate(&self, _input: StageInput) -> SessionResult<String> {
        Ok(self.text.clone())
    }
}

/// Input and output of one completed stage.
#[derive(Debug, Clone)]
pub struct StageRecord {
    pub index: usize,
    pub stage: String,
    pub input: StageInput,
    pub output: String,
}

/// Ordered stages.
#[derive(Clone, Default)]
pub struct GenerationChain {
    stages: Vec<Arc<dyn GenerationStage>>,
}

impl GenerationChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stage(mut self, stage: Arc<dyn GenerationStage>) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stage_names(&self) -> Vec<String> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run stage `index` on `request` and the previous output.
    ///
    /// Any stage failure becomes [`SessionError::Chain`].
    pub async fn run_stage(
        &self,
        index: usize,
        request: &str,
        previous: Option<String>,
    ) -> SessionResult<StageRecord> {
        let stage = self.stages.get(index).ok_or_else(|| {
            SessionError::InvalidRequest(format!("generation chain has no stage {}", index))
        })?;
        let name = stage.name();
        let input = StageInput {
            request: request.to_string(),
            previous,
            index,
        };

        debug!("Running generation stage {} ({})", index, name);
        let output = stage
            .generate(input.clone())
            .await
            .map_err(|e| SessionError::Chain {
                stage: name.clone(),
                message: e.to_string(),
            })?;
        info!("Stage {} produced {} chars", name, output.len());

        Ok(StageRecord {
            index,
            stage: name,
            input,
            output,
        })
    }

    /// Run every stage in order, returning each record.
    pub async fn run(&self, request: &str) -> SessionResult<Vec<StageRecord>> {
        if self.stages.is_empty() {
            return Err(SessionError::InvalidRequest(
                "generation chain has no stages".into(),
            ));
        }
        let mut records: Vec<StageRecord> = Vec::with_capacity(self.stages.len());
        for index in 0..self.stages.len() {
            let previous = records.last().map(|r| r.output.clone());
            records.push(self.run_stage(index, request, previous).await?);
        }
        Ok(records)
    }
}
