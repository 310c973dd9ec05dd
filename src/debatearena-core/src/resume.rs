//! Resuming a paused debate at its checkpoint.

use tracing::info;
use uuid::Uuid;

use crate::checkpoint::Checkpoint;
use crate::error::DebateError;
use crate::events::EventEmitter;
use crate::orchestrator::{Orchestrator, RunOutcome};
use crate::session::{Session, SessionStatus};

pub struct ResumeCoordinator<'a> {
    orchestrator: &'a Orchestrator,
}

impl<'a> ResumeCoordinator<'a> {
    pub fn new(orchestrator: &'a Orchestrator) -> Self {
        Self { orchestrator }
    }

    /// Read the stored checkpoint and continue the debate from it.
    ///
    /// The checkpoint is parsed and range-checked before anything changes;
    /// on error the session is left as it was. Once accepted the session is
    /// moved back to `IN_PROGRESS` and the checkpoint is cleared.
    pub async fn resume(
        &self,
        session_id: Uuid,
        emitter: EventEmitter,
    ) -> Result<RunOutcome, DebateError> {
        let session = self.orchestrator.load_session(session_id).await?;
        let raw = session
            .checkpoint
            .as_deref()
            .ok_or_else(|| DebateError::InvalidCheckpoint("no checkpoint stored".to_string()))?;
        let checkpoint: Checkpoint = raw.parse()?;
        if checkpoint.round() < 1 || checkpoint.round() > session.rounds {
            return Err(DebateError::CheckpointOutOfRange {
                round: checkpoint.round(),
                rounds: session.rounds,
            });
        }

        let ctx = self.orchestrator.context(session_id, emitter).await?;

        self.orchestrator
            .store()
            .update_session(
                session_id,
                Box::new(|s: &mut Session| {
                    if s.status == SessionStatus::Paused {
                        s.resume()?;
                    }
                    s.take_checkpoint();
                    Ok(())
                }),
            )
            .await?;

        info!(%session_id, %checkpoint, "resuming debate");
        self.orchestrator
            .run_from(&ctx, checkpoint.round(), checkpoint.entry_step())
            .await
    }
}
