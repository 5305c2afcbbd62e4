//! Scripted prober for tests.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::probe::{PacketOutcome, ProbeBatch, ProbeError, Prober};

enum Step {
    Replies { received: u32, rtt_ms: f64 },
    PermissionDenied,
    Failed(String),
}

/// Returns pre-recorded results in order; the last one repeats.
#[derive(Default)]
pub struct ScriptedProber {
    steps: Mutex<VecDeque<Step>>,
    calls: Mutex<u32>,
}

impl ScriptedProber {
    pub fn new() -> Self {
        Self::default()
    }

    /// `received` of the requested echoes come back, each after `rtt_ms`.
    pub fn then_replies(self, received: u32, rtt_ms: f64) -> Self {
        self.push(Step::Replies { received, rtt_ms })
    }

    pub fn then_permission_denied(self) -> Self {
        self.push(Step::PermissionDenied)
    }

    pub fn then_failure(self, message: &str) -> Self {
        self.push(Step::Failed(message.to_string()))
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(self, step: Step) -> Self {
        self.steps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(step);
        self
    }
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn probe(
        &self,
        _target: &str,
        _size: u16,
        count: u32,
        _timeout: Duration,
    ) -> Result<ProbeBatch, ProbeError> {
        *self.calls.lock().unwrap_or_else(PoisonError::into_inner) += 1;

        let mut steps = self.steps.lock().unwrap_or_else(PoisonError::into_inner);
        let step = if steps.len() > 1 {
            steps.pop_front()
        } else {
            None
        };
        let current = step.as_ref().or(steps.front());

        match current {
            None => Err(ProbeError::Failed("no scripted result".to_string())),
            Some(Step::PermissionDenied) => Err(ProbeError::PermissionDenied(
                "socket: Operation not permitted".to_string(),
            )),
            Some(Step::Failed(message)) => Err(ProbeError::Failed(message.clone())),
            Some(Step::Replies { received, rtt_ms }) => {
                let outcomes = (0..count)
                    .map(|i| {
                        if i < *received {
                            PacketOutcome::Replied {
                                rtt_ms: Some(*rtt_ms),
                            }
                        } else {
                            PacketOutcome::Lost
                        }
                    })
                    .collect();
                Ok(ProbeBatch::new(outcomes))
            }
        }
    }
}
