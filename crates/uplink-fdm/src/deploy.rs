//! Deployment waiter: submit pending changes and poll until they are live.
//!
//! Staged changes only take effect once a deployment task reaches
//! `DEPLOYED`. Every other state (`QUEUED`, `PENDING`, `DEPLOYING`, ...) is
//! treated as still in progress; the poll budget bounds the wait.

use std::fmt;
use std::time::Duration;

use tracing::{debug, info, warn};

use uplink_core::DeployConfig;

use crate::error::{FdmError, FdmResult};
use crate::model::{DEPLOYED, DeploymentTask, ItemList};
use crate::session::Session;

const DEPLOY_PATH: &str = "/operational/deploy";

/// Poll cadence and budget for one deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeployPolicy {
    /// Sleep before each poll.
    pub poll_interval: Duration,
    /// Polls before giving up.
    pub max_polls: u32,
}

impl Default for DeployPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(8),
            max_polls: 75,
        }
    }
}

impl From<&DeployConfig> for DeployPolicy {
    fn from(config: &DeployConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            max_polls: config.max_polls,
        }
    }
}

/// How a deployment ended, as far as the waiter could tell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployOutcome {
    /// The task reached `DEPLOYED`.
    Deployed,
    /// The task was still listed in a non-terminal state when the budget ran
    /// out.
    TimedOut { polls: u32, last_state: String },
    /// The task disappeared from the task list, or never appeared in it.
    Lost { task_id: String },
}

impl DeployOutcome {
    pub fn is_deployed(&self) -> bool {
        matches!(self, DeployOutcome::Deployed)
    }
}

impl fmt::Display for DeployOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeployOutcome::Deployed => write!(f, "deployed"),
            DeployOutcome::TimedOut { polls, last_state } => write!(
                f,
                "deployment not finished after {polls} polls (last state {last_state})"
            ),
            DeployOutcome::Lost { task_id } => {
                write!(f, "deployment task {task_id} is no longer listed")
            }
        }
    }
}

pub struct DeploymentWaiter<'a> {
    session: &'a Session,
    policy: DeployPolicy,
}

impl<'a> DeploymentWaiter<'a> {
    pub fn new(session: &'a Session, policy: DeployPolicy) -> Self {
        Self { session, policy }
    }

    /// Submit a deployment and wait for it to finish.
    pub async fn deploy(&self) -> FdmResult<DeployOutcome> {
        let task: DeploymentTask = self.session.post_json::<(), _>(DEPLOY_PATH, None).await?;
        if task.id.is_empty() {
            return Err(FdmError::MissingDeploymentId);
        }
        info!(task = %task.id, state = %task.state, "deployment submitted");
        self.wait_for(&task.id).await
    }

    /// Poll the task list until `task_id` is deployed, vanishes, or the
    /// poll budget is spent.
    pub async fn wait_for(&self, task_id: &str) -> FdmResult<DeployOutcome> {
        let mut last_state: Option<String> = None;

        for poll in 1..=self.policy.max_polls {
            tokio::time::sleep(self.policy.poll_interval).await;

            let tasks: ItemList<DeploymentTask> = self.session.get_json(DEPLOY_PATH).await?;
            let Some(task) = tasks.items.into_iter().find(|t| t.id == task_id) else {
                if last_state.is_some() {
                    warn!(task = %task_id, poll, "deployment task disappeared");
                    return Ok(DeployOutcome::Lost {
                        task_id: task_id.to_string(),
                    });
                }
                debug!(task = %task_id, poll, "deployment task not listed yet");
                continue;
            };

            if task.state == DEPLOYED {
                info!(task = %task_id, polls = poll, "deployment finished");
                return Ok(DeployOutcome::Deployed);
            }
            debug!(task = %task_id, poll, state = %task.state, "deployment in progress");
            last_state = Some(task.state);
        }

        match last_state {
            Some(last_state) => {
                warn!(
                    task = %task_id,
                    polls = self.policy.max_polls,
                    %last_state,
                    "deployment did not finish within poll budget"
                );
                Ok(DeployOutcome::TimedOut {
                    polls: self.policy.max_polls,
                    last_state,
                })
            }
            None => {
                warn!(task = %task_id, "deployment task never appeared in task list");
                Ok(DeployOutcome::Lost {
                    task_id: task_id.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::fake::{DeployBehavior, FakeFdm};
    use crate::session::FdmClient;

    fn fast(max_polls: u32) -> DeployPolicy {
        DeployPolicy {
            poll_interval: Duration::from_millis(1),
            max_polls,
        }
    }

    async fn waiter_for(behavior: DeployBehavior) -> (Arc<FakeFdm>, Session) {
        let fake = Arc::new(FakeFdm::new("admin", "pw").with_deploy_behavior(behavior));
        let session = FdmClient::new(fake.clone()).login("admin", "pw").await.unwrap();
        (fake, session)
    }

    #[test]
    fn policy_from_config() {
        let config = DeployConfig {
            poll_interval: "2s".to_string(),
            max_polls: 5,
        };
        let policy = DeployPolicy::from(&config);
        assert_eq!(policy.poll_interval, Duration::from_secs(2));
        assert_eq!(policy.max_polls, 5);
        assert_eq!(DeployPolicy::default().max_polls, 75);
    }

    #[tokio::test]
    async fn pending_then_deployed() {
        let (fake, session) = waiter_for(DeployBehavior::Succeed { pending_polls: 2 }).await;
        let outcome = DeploymentWaiter::new(&session, fast(5)).deploy().await.unwrap();
        assert_eq!(outcome, DeployOutcome::Deployed);
        assert_eq!(fake.deployments_submitted(), 1);
    }

    #[tokio::test]
    async fn stuck_task_times_out() {
        let (_fake, session) = waiter_for(DeployBehavior::Stuck).await;
        let outcome = DeploymentWaiter::new(&session, fast(3)).deploy().await.unwrap();
        assert_eq!(
            outcome,
            DeployOutcome::TimedOut {
                polls: 3,
                last_state: "PENDING".to_string()
            }
        );
    }

    #[tokio::test]
    async fn vanished_task_is_lost() {
        let (_fake, session) = waiter_for(DeployBehavior::Vanish { after_polls: 1 }).await;
        let outcome = DeploymentWaiter::new(&session, fast(5)).deploy().await.unwrap();
        assert!(matches!(outcome, DeployOutcome::Lost { .. }));
    }

    #[tokio::test]
    async fn never_listed_task_is_lost_after_budget() {
        let (fake, session) = waiter_for(DeployBehavior::Unlisted).await;
        let outcome = DeploymentWaiter::new(&session, fast(4)).deploy().await.unwrap();
        assert_eq!(
            outcome,
            DeployOutcome::Lost {
                task_id: "deploy-2".to_string()
            }
        );
        let polls = fake
            .requests()
            .iter()
            .filter(|(m, p)| *m == http::Method::GET && p == DEPLOY_PATH)
            .count();
        assert_eq!(polls, 4);
    }

    #[tokio::test]
    async fn missing_task_id_is_an_error() {
        let (_fake, session) = waiter_for(DeployBehavior::NoId).await;
        let err = DeploymentWaiter::new(&session, fast(2)).deploy().await.unwrap_err();
        assert!(matches!(err, FdmError::MissingDeploymentId));
    }

    #[test]
    fn outcome_display() {
        let outcome = DeployOutcome::TimedOut {
            polls: 75,
            last_state: "DEPLOYING".to_string(),
        };
        assert_eq!(
            outcome.to_string(),
            "deployment not finished after 75 polls (last state DEPLOYING)"
        );
        assert!(!outcome.is_deployed());
        assert!(DeployOutcome::Deployed.is_deployed());
    }
}
