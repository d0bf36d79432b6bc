//! In-process chaining from one stage to the next.

use crate::api::Stage;
use crate::error::HandoffError;

use super::report::StageReport;
use super::PipelineDriver;

/// Completion callback that starts the stage after `from` on the items
/// `from` succeeded for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageHandoff {
    from: Stage,
}

impl StageHandoff {
    pub fn new(from: Stage) -> Self {
        Self { from }
    }

    pub fn from_stage(&self) -> Stage {
        self.from
    }

    /// The stage this handoff starts.
    pub fn target(&self) -> Option<Stage> {
        self.from.next()
    }

    /// Run the next stage for the successes in `completed`.
    ///
    /// # Returns
    /// The report of the next stage when it ran, and the handoff error if
    /// any: `Unavailable` when there is no next stage or nothing to hand off,
    /// `NoSuccess` when the next stage failed for every item.
    pub async fn trigger(
        &self,
        driver: &PipelineDriver,
        completed: &StageReport,
    ) -> (Option<StageReport>, Option<HandoffError>) {
        let to = match self.target() {
            Some(to) => to,
            None => {
                return (
                    None,
                    Some(HandoffError::Unavailable {
                        from: self.from,
                        to: self.from,
                        message: "no stage follows".to_string(),
                    }),
                )
            }
        };
        if completed.stage != self.from {
            return (
                None,
                Some(HandoffError::Unavailable {
                    from: self.from,
                    to,
                    message: format!("received a report for {}", completed.stage),
                }),
            );
        }

        let items = completed.successes();
        if items.is_empty() {
            return (
                None,
                Some(HandoffError::Unavailable {
                    from: self.from,
                    to,
                    message: "no item succeeded".to_string(),
                }),
            );
        }

        tracing::info!(from = %self.from, to = %to, items = items.len(), "Handing off");
        let report = driver.run_stage(to, &items).await;
        let error = (report.summary().success == 0)
            .then_some(HandoffError::NoSuccess { from: self.from, to });
        (Some(report), error)
    }
}
