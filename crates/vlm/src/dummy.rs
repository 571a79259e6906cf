use async_trait::async_trait;
use v2t_core::job::VlmAnswer;

use crate::backend::VlmBackend;
use crate::error::VlmError;

/// Frame count above which the dummy backend reports a switch.
const SPLIT_THRESHOLD: usize = 8;

/// Deterministic stand-in that needs no model: one switch halfway through
/// windows longer than eight frames, none otherwise.
#[derive(Debug, Default, Clone, Copy)]
pub struct DummyBackend;

#[async_trait]
impl VlmBackend for DummyBackend {
    fn name(&self) -> &'static str {
        "dummy"
    }

    async fn infer(&self, images: &[String], _prompt: &str) -> Result<Option<VlmAnswer>, VlmError> {
        let n = images.len();
        let (transitions, instructions) = if n > SPLIT_THRESHOLD {
            (vec![(n / 2) as i64], vec!["First task", "Second task"])
        } else {
            (vec![], vec!["Single task"])
        };

        Ok(Some(VlmAnswer {
            transitions,
            instructions: instructions.into_iter().map(String::from).collect(),
            thought: Some(format!(
                "Dummy analysis of {n} frames. No actual inference performed."
            )),
        }))
    }
}
