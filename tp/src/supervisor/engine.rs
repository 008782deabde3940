//! Supervisor - drives one planning session to a terminal status
//!
//! Steps run strictly one after another. When a `StateManager` is attached
//! the session is leased for the whole run and checkpointed after every
//! step, so an interrupted run resumes from its last committed status.

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::transition::{self, CritiqueOutcome, ParseOutcome};
use crate::config::SupervisorConfig;
use crate::critique::{Critic, clarification_questions};
use crate::domain::{PlanState, PlanStatus};
use crate::generation::Generator;
use crate::parser::QueryParser;
use crate::state::{StateError, StateManager};

/// Errors that stop `plan` from producing a PlanState at all
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("Session {session_id} is being planned concurrently: {detail}")]
    ConcurrencyConflict { session_id: String, detail: String },

    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl PlanError {
    fn from_state(session_id: &str, err: StateError) -> Self {
        if err.is_conflict() {
            PlanError::ConcurrencyConflict {
                session_id: session_id.to_string(),
                detail: err.to_string(),
            }
        } else {
            PlanError::Persistence(err.to_string())
        }
    }
}

/// Planning control loop
pub struct Supervisor {
    parser: Arc<dyn QueryParser>,
    generator: Arc<dyn Generator>,
    critic: Arc<dyn Critic>,
    policy: SupervisorConfig,
    state: Option<StateManager>,
    owner: String,
}

impl Supervisor {
    pub fn new(
        parser: Arc<dyn QueryParser>,
        generator: Arc<dyn Generator>,
        critic: Arc<dyn Critic>,
        policy: SupervisorConfig,
    ) -> Self {
        let owner = uuid::Uuid::now_v7().to_string();
        debug!(%owner, max_attempts = policy.max_attempts, "Supervisor::new: called");
        Self {
            parser,
            generator,
            critic,
            policy,
            state: None,
            owner,
        }
    }

    /// Persist sessions through `state`
    pub fn with_state(mut self, state: StateManager) -> Self {
        self.state = Some(state);
        self
    }

    /// Run a session to a terminal status and return it
    ///
    /// A persisted terminal session is returned unchanged. Only persistence
    /// failures and concurrent use of the same session id are errors; every
    /// planning failure is a terminal status on the returned state.
    pub async fn plan(&self, session_id: &str, raw_text: &str) -> Result<PlanState, PlanError> {
        debug!(%session_id, "plan: called");
        let Some(manager) = &self.state else {
            let mut state = PlanState::new(session_id, raw_text);
            self.drive(&mut state, None).await?;
            return Ok(state);
        };

        let lease = manager
            .acquire_lease(session_id, &self.owner)
            .await
            .map_err(|e| PlanError::from_state(session_id, e))?;

        let result = self.plan_leased(manager, session_id, raw_text).await;

        if let Err(e) = manager.release_lease(lease).await {
            warn!(%session_id, error = %e, "Failed to release session lease");
        }
        result
    }

    async fn plan_leased(
        &self,
        manager: &StateManager,
        session_id: &str,
        raw_text: &str,
    ) -> Result<PlanState, PlanError> {
        let loaded = manager
            .load(session_id)
            .await
            .map_err(|e| PlanError::from_state(session_id, e))?;

        let (mut state, version) = match loaded {
            Some(envelope) => {
                if envelope.data.raw_text != raw_text && !raw_text.is_empty() {
                    warn!(%session_id, "Resumed session keeps its original request text");
                }
                info!(%session_id, status = %envelope.data.status, version = envelope.version, "Resuming session");
                (envelope.data, envelope.version)
            }
            None => {
                info!(%session_id, "Starting new session");
                (PlanState::new(session_id, raw_text), 0)
            }
        };

        if state.status.is_terminal() {
            info!(%session_id, status = %state.status, "Session already finished");
            return Ok(state);
        }

        let mut checkpoint = Checkpoint { manager, version };
        self.drive(&mut state, Some(&mut checkpoint)).await?;
        Ok(state)
    }

    /// Step until terminal, saving after each step
    async fn drive(&self, state: &mut PlanState, mut checkpoint: Option<&mut Checkpoint<'_>>) -> Result<(), PlanError> {
        while !state.status.is_terminal() {
            self.step(state, checkpoint.as_deref_mut()).await?;
            if let Some(cp) = checkpoint.as_deref_mut() {
                cp.save(state).await?;
            }
        }
        info!(
            session_id = %state.session_id,
            status = %state.status,
            attempts = state.attempt_count,
            "Planning finished"
        );
        Ok(())
    }

    /// Run exactly one state-machine step
    async fn step(&self, state: &mut PlanState, checkpoint: Option<&mut Checkpoint<'_>>) -> Result<(), PlanError> {
        debug!(session_id = %state.session_id, status = %state.status, "step: called");
        match state.status {
            PlanStatus::Pending => {
                state.transition(PlanStatus::Parsing, "parsing request");
            }
            PlanStatus::Parsing => self.parse(state).await,
            PlanStatus::Generating => self.generate(state, checkpoint).await?,
            PlanStatus::Critiquing => self.critique(state),
            terminal => debug!(%terminal, "step: already terminal"),
        }
        Ok(())
    }

    async fn parse(&self, state: &mut PlanState) {
        match self.parser.parse(&state.raw_text).await {
            Ok(trip) => match transition::after_parse(&trip, self.policy.min_parse_confidence) {
                ParseOutcome::Proceed => {
                    let message = format!("parsed trip to {} (confidence {:.2})", trip.destination, trip.confidence);
                    state.trip_request = Some(trip);
                    state.transition(PlanStatus::Generating, message);
                }
                ParseOutcome::ProceedFlagged => {
                    warn!(
                        session_id = %state.session_id,
                        confidence = trip.confidence,
                        "Low-confidence parse, proceeding with defaults"
                    );
                    let message = format!(
                        "parsed trip to {} with low confidence {:.2}",
                        trip.destination, trip.confidence
                    );
                    state.trip_request = Some(trip.flagged_low_confidence());
                    state.transition(PlanStatus::Generating, message);
                }
            },
            Err(e) => {
                info!(session_id = %state.session_id, error = %e, "Parse failed");
                state.fail(PlanStatus::FailedParse, e.to_string());
            }
        }
    }

    async fn generate(&self, state: &mut PlanState, checkpoint: Option<&mut Checkpoint<'_>>) -> Result<(), PlanError> {
        let Some(trip) = state.trip_request.clone() else {
            state.fail(PlanStatus::FailedFatal, "no trip request to generate from");
            return Ok(());
        };

        if !transition::can_generate(state.attempt_count, self.policy.max_attempts) {
            // Only reachable when a run died mid-generation on its last attempt
            self.finish_exhausted(state);
            return Ok(());
        }

        state.attempt_count += 1;
        let attempt = state.attempt_count;
        if let Some(cp) = checkpoint {
            cp.save(state).await?;
        }

        info!(session_id = %state.session_id, attempt, "Generating itinerary");
        let feedback = state.latest_critique().cloned();
        match self.generator.generate(&trip, feedback.as_ref(), attempt).await {
            Ok(itinerary) => {
                state.itinerary_history.push(itinerary.clone());
                state.current_itinerary = Some(itinerary);
                state.transition(PlanStatus::Critiquing, format!("generated attempt {}", attempt));
            }
            Err(e) => {
                warn!(session_id = %state.session_id, attempt, error = %e, "Generation failed");
                state.fail(PlanStatus::FailedFatal, e.to_string());
            }
        }
        Ok(())
    }

    fn critique(&self, state: &mut PlanState) {
        let (Some(trip), Some(itinerary)) = (&state.trip_request, &state.current_itinerary) else {
            state.fail(PlanStatus::FailedFatal, "no itinerary to critique");
            return;
        };

        let result = self.critic.critique(itinerary, trip);
        let outcome = transition::after_critique(&result, state.attempt_count, self.policy.max_attempts);
        let (attempt, score, issues) = (result.attempt, result.overall_score, result.feedback.len());
        state.evaluation_history.push(result);

        match outcome {
            CritiqueOutcome::Accept => {
                if let Some(trip) = state.trip_request.as_ref().filter(|t| t.low_confidence) {
                    state.clarification_questions = clarification_questions(None, trip);
                }
                state.transition(
                    outcome.next_status(),
                    format!("attempt {} passed with score {:.2}", attempt, score),
                );
            }
            CritiqueOutcome::Retry => {
                state.transition(
                    outcome.next_status(),
                    format!("attempt {} scored {:.2}; retrying with {} issues", attempt, score, issues),
                );
            }
            CritiqueOutcome::Exhausted => self.finish_exhausted(state),
        }
    }

    /// Promote the best itinerary seen and end the session degraded
    fn finish_exhausted(&self, state: &mut PlanState) {
        let Some(best) = transition::best_attempt(&state.evaluation_history).cloned() else {
            state.fail(PlanStatus::FailedFatal, "attempt budget spent without any critiqued itinerary");
            return;
        };

        if let Some(itinerary) = state.itinerary_for_attempt(best.attempt).cloned() {
            state.current_itinerary = Some(itinerary);
        }
        if let Some(trip) = &state.trip_request {
            state.clarification_questions = clarification_questions(Some(&best), trip);
        }
        info!(
            session_id = %state.session_id,
            best_attempt = best.attempt,
            best_score = best.overall_score,
            "Attempt budget exhausted, promoting best itinerary"
        );
        state.fail(
            PlanStatus::FailedBudgetExhausted,
            format!(
                "no itinerary passed after {} attempts; best score {:.2} from attempt {}",
                state.attempt_count, best.overall_score, best.attempt
            ),
        );
    }
}

/// Save cursor for one leased run
struct Checkpoint<'a> {
    manager: &'a StateManager,
    version: u64,
}

impl Checkpoint<'_> {
    async fn save(&mut self, state: &PlanState) -> Result<(), PlanError> {
        self.version = self
            .manager
            .save(state, self.version)
            .await
            .map_err(|e| PlanError::from_state(&state.session_id, e))?;
        debug!(session_id = %state.session_id, version = self.version, "Checkpoint saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::critique::RuleCritic;
    use crate::critique::mock::ScriptedCritic;
    use crate::generation::mock::ScriptedGenerator;
    use crate::parser::ParseError;
    use crate::parser::mock::ScriptedParser;
    use crate::domain::TripRequest;
    use chrono::NaiveDate;
    use sessionstore::StoreOptions;
    use tempfile::tempdir;

    fn trip() -> TripRequest {
        TripRequest::new("Tokyo", NaiveDate::from_ymd_opt(2026, 11, 2).unwrap(), 5)
            .with_budget(2500.0)
            .with_preferences(["sightseeing"])
    }

    fn supervisor(parser: ScriptedParser, generator: Arc<ScriptedGenerator>, critic: Arc<dyn Critic>) -> Supervisor {
        Supervisor::new(Arc::new(parser), generator, critic, SupervisorConfig::default())
    }

    #[tokio::test]
    async fn test_first_attempt_passes() {
        let generator = Arc::new(ScriptedGenerator::new());
        let sup = supervisor(ScriptedParser::returning(trip()), generator.clone(), Arc::new(RuleCritic::default()));

        let state = sup.plan("s1", "trip to Tokyo").await.unwrap();

        assert_eq!(state.status, PlanStatus::Succeeded);
        assert_eq!(state.attempt_count, 1);
        assert_eq!(state.evaluation_history.len(), 1);
        assert_eq!(generator.call_count(), 1);
        assert!(state.terminal_reason.is_none());
        let steps: Vec<PlanStatus> = state.trace.iter().map(|t| t.step).collect();
        assert_eq!(
            steps,
            vec![
                PlanStatus::Parsing,
                PlanStatus::Generating,
                PlanStatus::Critiquing,
                PlanStatus::Succeeded
            ]
        );
    }

    #[tokio::test]
    async fn test_retry_carries_feedback() {
        let generator = Arc::new(ScriptedGenerator::new());
        let critic = Arc::new(ScriptedCritic::new(vec![0.6, 0.75]));
        let sup = supervisor(ScriptedParser::returning(trip()), generator.clone(), critic.clone());

        let state = sup.plan("s1", "trip").await.unwrap();

        assert_eq!(state.status, PlanStatus::Succeeded);
        assert_eq!(state.attempt_count, 2);
        assert_eq!(state.evaluation_history.len(), 2);
        assert_eq!(generator.feedback_seen(), vec![None, Some(1)]);
        assert_eq!(state.current_itinerary.as_ref().map(|i| i.generation_attempt()), Some(2));
    }

    #[tokio::test]
    async fn test_exhaustion_promotes_best() {
        let generator = Arc::new(ScriptedGenerator::new());
        let critic = Arc::new(ScriptedCritic::new(vec![0.5, 0.65, 0.6]));
        let sup = supervisor(ScriptedParser::returning(trip()), generator.clone(), critic);

        let state = sup.plan("s1", "trip").await.unwrap();

        assert_eq!(state.status, PlanStatus::FailedBudgetExhausted);
        assert!(state.status.is_degraded());
        assert_eq!(state.attempt_count, 3);
        assert_eq!(generator.call_count(), 3);
        assert_eq!(state.current_itinerary.as_ref().map(|i| i.generation_attempt()), Some(2));
        assert_eq!(state.current_critique().map(|c| c.overall_score), Some(0.65));
        assert!(!state.clarification_questions.is_empty());
        assert!(state.terminal_reason.as_deref().unwrap_or_default().contains("attempt 2"));
    }

    #[tokio::test]
    async fn test_parse_failure_skips_generation() {
        let generator = Arc::new(ScriptedGenerator::new());
        let sup = supervisor(
            ScriptedParser::failing(ParseError::NoDestination),
            generator.clone(),
            Arc::new(RuleCritic::default()),
        );

        let state = sup.plan("s1", "asdkjasd").await.unwrap();

        assert_eq!(state.status, PlanStatus::FailedParse);
        assert_eq!(state.attempt_count, 0);
        assert_eq!(generator.call_count(), 0);
        assert_eq!(state.terminal_reason.as_deref(), Some("no destination found in request"));
    }

    #[tokio::test]
    async fn test_fatal_generation() {
        let generator = Arc::new(ScriptedGenerator::failing_on(2));
        let critic = Arc::new(ScriptedCritic::new(vec![0.3]));
        let sup = supervisor(ScriptedParser::returning(trip()), generator, critic);

        let state = sup.plan("s1", "trip").await.unwrap();
        assert_eq!(state.status, PlanStatus::FailedFatal);
        assert_eq!(state.attempt_count, 2);
        assert_eq!(state.evaluation_history.len(), 1);
    }

    #[tokio::test]
    async fn test_low_confidence_is_flagged_and_questioned() {
        let mut low = trip().with_confidence(0.3);
        low.ambiguities = vec!["budget not stated".to_string()];
        let generator = Arc::new(ScriptedGenerator::new());
        let sup = supervisor(ScriptedParser::returning(low), generator, Arc::new(ScriptedCritic::new(vec![0.9])));

        let state = sup.plan("s1", "trip").await.unwrap();
        assert_eq!(state.status, PlanStatus::Succeeded);
        assert!(state.trip_request.as_ref().is_some_and(|t| t.low_confidence));
        assert_eq!(state.clarification_questions, vec!["Could you clarify: budget not stated?".to_string()]);
    }

    #[tokio::test]
    async fn test_attempts_never_exceed_policy() {
        for max_attempts in 1..5 {
            let generator = Arc::new(ScriptedGenerator::new());
            let sup = Supervisor::new(
                Arc::new(ScriptedParser::returning(trip())),
                generator.clone(),
                Arc::new(ScriptedCritic::new(vec![0.1])),
                SupervisorConfig {
                    max_attempts,
                    ..SupervisorConfig::default()
                },
            );
            let state = sup.plan("s1", "trip").await.unwrap();
            assert_eq!(state.attempt_count, max_attempts);
            assert_eq!(generator.call_count(), max_attempts as usize);
        }
    }

    #[tokio::test]
    async fn test_persisted_session_is_checkpointed_and_not_rerun() {
        let dir = tempdir().unwrap();
        let manager = StateManager::spawn(dir.path(), StoreOptions::default()).unwrap();
        let parser = Arc::new(ScriptedParser::returning(trip()));
        let generator = Arc::new(ScriptedGenerator::new());
        let sup = Supervisor::new(
            parser.clone(),
            generator.clone(),
            Arc::new(RuleCritic::default()),
            SupervisorConfig::default(),
        )
        .with_state(manager.clone());

        let first = sup.plan("s1", "trip").await.unwrap();
        assert_eq!(first.status, PlanStatus::Succeeded);

        let envelope = manager.load("s1").await.unwrap().unwrap();
        assert_eq!(envelope.data, first);
        // pending->parsing, parsing->generating, attempt increment, generating->critiquing, critiquing->succeeded
        assert_eq!(envelope.version, 5);

        let second = sup.plan("s1", "trip").await.unwrap();
        assert_eq!(second, first);
        assert_eq!(parser.call_count(), 1);
        assert_eq!(generator.call_count(), 1);
    }

    #[tokio::test]
    async fn test_resume_continues_from_checkpoint() {
        let dir = tempdir().unwrap();
        let manager = StateManager::spawn(dir.path(), StoreOptions::default()).unwrap();

        // a run that died after its first critique asked for a retry
        let mut state = PlanState::new("s1", "trip");
        state.trip_request = Some(trip());
        state.attempt_count = 1;
        state.evaluation_history.push(crate::domain::CritiqueResult {
            attempt: 1,
            scores: Default::default(),
            overall_score: 0.4,
            passed: false,
            feedback: Vec::new(),
        });
        state.status = PlanStatus::Generating;
        manager.save(&state, 0).await.unwrap();

        let parser = Arc::new(ScriptedParser::returning(trip()));
        let generator = Arc::new(ScriptedGenerator::new());
        let sup = Supervisor::new(
            parser.clone(),
            generator.clone(),
            Arc::new(ScriptedCritic::new(vec![0.9])),
            SupervisorConfig::default(),
        )
        .with_state(manager);

        let resumed = sup.plan("s1", "trip").await.unwrap();
        assert_eq!(resumed.status, PlanStatus::Succeeded);
        assert_eq!(resumed.attempt_count, 2);
        assert_eq!(parser.call_count(), 0);
        assert_eq!(generator.feedback_seen(), vec![Some(1)]);
    }

    #[tokio::test]
    async fn test_leased_session_is_conflict() {
        let dir = tempdir().unwrap();
        let manager = StateManager::spawn(dir.path(), StoreOptions::default()).unwrap();
        manager.acquire_lease("s1", "someone-else").await.unwrap();

        let generator = Arc::new(ScriptedGenerator::new());
        let sup = supervisor(ScriptedParser::returning(trip()), generator.clone(), Arc::new(RuleCritic::default()))
            .with_state(manager);

        let err = sup.plan("s1", "trip").await.unwrap_err();
        assert!(matches!(err, PlanError::ConcurrencyConflict { ref session_id, .. } if session_id == "s1"));
        assert_eq!(generator.call_count(), 0);
    }

    #[tokio::test]
    async fn test_lease_released_after_run() {
        let dir = tempdir().unwrap();
        let manager = StateManager::spawn(dir.path(), StoreOptions::default()).unwrap();
        let sup = supervisor(
            ScriptedParser::returning(trip()),
            Arc::new(ScriptedGenerator::new()),
            Arc::new(RuleCritic::default()),
        )
        .with_state(manager.clone());

        sup.plan("s1", "trip").await.unwrap();
        assert!(manager.acquire_lease("s1", "next-worker").await.is_ok());
    }
}
