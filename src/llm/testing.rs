//! Scripted generator for tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use crate::conversation::prompt::Turn;
use crate::llm::error::{GenerationError, GenerationResult};
use crate::llm::{GenerateFuture, GenerationParams, Generator};

/// Outcome of one scripted call.
pub(crate) enum Script {
    Reply(String),
    Fail,
    Empty,
    Delay(Duration, String),
}

/// Generator replaying scripted outcomes and recording what it was sent.
#[derive(Default)]
pub(crate) struct ScriptedGenerator {
    script: Mutex<VecDeque<Script>>,
    seen: Mutex<Vec<Vec<Turn>>>,
}

impl ScriptedGenerator {
    pub(crate) fn new(script: impl IntoIterator<Item = Script>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn replying(text: &str) -> Self {
        Self::new([Script::Reply(text.to_string())])
    }

    pub(crate) fn failing() -> Self {
        Self::new([Script::Fail])
    }

    pub(crate) fn calls(&self) -> Vec<Vec<Turn>> {
        self.seen.lock().unwrap().clone()
    }
}

impl Generator for ScriptedGenerator {
    fn generate<'a>(
        &'a self,
        turns: &'a [Turn],
        _params: GenerationParams,
    ) -> GenerateFuture<'a, GenerationResult<String>> {
        self.seen.lock().unwrap().push(turns.to_vec());
        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Script::Reply("ok".to_string()));

        Box::pin(async move {
            match next {
                Script::Reply(text) => Ok(text),
                Script::Fail => Err(GenerationError::Status {
                    status: 500,
                    body: "scripted failure".to_string(),
                }),
                Script::Empty => Err(GenerationError::EmptyResponse),
                Script::Delay(delay, text) => {
                    tokio::time::sleep(delay).await;
                    Ok(text)
                }
            }
        })
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}
