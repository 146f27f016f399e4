//! The guard → fetch → evaluate → revise cycle

use super::{ComplianceRequest, Evaluator, Reviser};
use crate::archive::RuleSource;
use crate::diff::unified_diff;
use crate::model::{
    ComplianceTrace, Critique, Identity, Reference, Rule, Severity, TraceIteration, TraceStatus,
};
use crate::{metrics, Result};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Article id of the synthetic critique produced by a guard block
pub const GUARD_BLOCK_ID: &str = "GUARD_BLOCK";

/// Output released in place of content that could not be made compliant
pub const RETRIES_EXHAUSTED_MESSAGE: &str = "Safety Protocol Exception: could not produce \
compliant output within the allowed revision attempts. Content withheld.";

const UNKNOWN_GUARD_REASON: &str = "Unknown Security Protocol Violation";

/// Where the revision loop ended
enum LoopOutcome {
    /// A revision passed re-evaluation
    Compliant(String),
    /// The reviser failed or produced nothing usable
    Aborted,
    /// Every attempt still violated
    Exhausted,
}

/// Orchestrates compliance cycles
///
/// Holds only shared, read-only collaborators, so one engine serves any
/// number of concurrent cycles. Each cycle pins one archive snapshot, so a
/// reload never mixes the guard of one load with the rules of another.
pub struct ComplianceEngine {
    source: Arc<dyn RuleSource>,
    evaluator: Arc<dyn Evaluator>,
    reviser: Arc<dyn Reviser>,
}

impl ComplianceEngine {
    pub fn new(
        source: Arc<dyn RuleSource>,
        evaluator: Arc<dyn Evaluator>,
        reviser: Arc<dyn Reviser>,
    ) -> Self {
        Self {
            source,
            evaluator,
            reviser,
        }
    }

    /// Run one request to a final disposition
    ///
    /// Blocking outcomes are returned as a `Blocked` trace. Only a failure of
    /// the rule source is returned as an error.
    pub async fn run_compliance_cycle(&self, request: &ComplianceRequest) -> Result<ComplianceTrace> {
        let started = Instant::now();
        let trace = self.cycle(request).await?;
        metrics::record_cycle(trace.status, started.elapsed().as_secs_f64());

        info!(
            status = %trace.status,
            article_id = trace.critique.article_id.as_deref(),
            iterations = trace.history.len(),
            "Compliance cycle finished"
        );
        Ok(trace)
    }

    async fn cycle(&self, request: &ComplianceRequest) -> Result<ComplianceTrace> {
        let actor = request.actor.as_ref();
        let snapshot = self.source.current_snapshot()?;

        if let Err(violation) = snapshot.guard.check(&request.input_prompt, actor) {
            let reasoning = violation.to_string();
            let reasoning = if reasoning.trim().is_empty() {
                UNKNOWN_GUARD_REASON.to_string()
            } else {
                reasoning
            };
            let critique = Critique::violation(GUARD_BLOCK_ID, Severity::Critical, reasoning);
            let message = critique.reasoning.clone();
            return Ok(ComplianceTrace::blocked(
                request.draft.clone(),
                critique,
                message,
                Vec::new(),
            ));
        }

        let context = request.context_tags.as_deref();
        let rules = snapshot.rules_for(None, context);
        let references = snapshot.references_for(context);
        debug!(
            rules = rules.len(),
            references = references.len(),
            "Fetched active rules"
        );

        let initial = self
            .evaluator
            .evaluate(&request.draft, &rules, &references, actor)
            .await;
        if !initial.violation {
            return Ok(ComplianceTrace::approved(request.draft.clone(), initial));
        }

        info!(
            article_id = initial.article_id.as_deref(),
            severity = %initial.severity,
            max_retries = request.max_retries,
            "Draft violates a rule; starting revision loop"
        );

        let mut history = Vec::new();
        let outcome = self
            .revision_loop(request, &initial, &rules, &references, actor, &mut history)
            .await;

        Ok(match outcome {
            LoopOutcome::Compliant(revised) => ComplianceTrace {
                status: TraceStatus::Revised,
                input_draft: request.draft.clone(),
                critique: initial,
                delta: unified_diff(&request.draft, &revised),
                revised_output: revised,
                history,
            },
            LoopOutcome::Aborted | LoopOutcome::Exhausted => ComplianceTrace::blocked(
                request.draft.clone(),
                initial,
                RETRIES_EXHAUSTED_MESSAGE,
                history,
            ),
        })
    }

    async fn revision_loop(
        &self,
        request: &ComplianceRequest,
        initial: &Critique,
        rules: &[Rule],
        references: &[Reference],
        actor: Option<&Identity>,
        history: &mut Vec<TraceIteration>,
    ) -> LoopOutcome {
        let mut current_draft = request.draft.clone();
        let mut current_critique = initial.clone();

        for attempt in 1..=request.max_retries {
            metrics::record_revision_attempt();
            let revised = match self
                .reviser
                .revise(&current_draft, &current_critique, rules)
                .await
            {
                Ok(text) if !text.trim().is_empty() => text,
                Ok(_) => {
                    warn!(attempt, "Reviser returned an empty draft; aborting");
                    return LoopOutcome::Aborted;
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Revision failed; aborting");
                    return LoopOutcome::Aborted;
                }
            };

            history.push(TraceIteration {
                input_draft: std::mem::replace(&mut current_draft, revised.clone()),
                critique: current_critique.clone(),
                revised_output: revised,
            });

            let critique = self
                .evaluator
                .evaluate(&current_draft, rules, references, actor)
                .await;
            debug!(
                attempt,
                violation = critique.violation,
                article_id = critique.article_id.as_deref(),
                "Re-evaluated revision"
            );
            if !critique.violation {
                return LoopOutcome::Compliant(current_draft);
            }
            current_critique = critique;
        }

        warn!(
            attempts = request.max_retries,
            "Revision attempts exhausted without compliance"
        );
        LoopOutcome::Exhausted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{ArchiveSnapshot, RuleArchive};
    use crate::ConstitutionError;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Returns queued critiques in order, then compliant ones
    #[derive(Default)]
    struct ScriptedEvaluator {
        script: Mutex<VecDeque<Critique>>,
        calls: AtomicUsize,
        seen_rules: Mutex<Vec<String>>,
        seen_actor: Mutex<Option<String>>,
    }

    impl ScriptedEvaluator {
        fn new(script: Vec<Critique>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                ..Default::default()
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Evaluator for ScriptedEvaluator {
        async fn evaluate(
            &self,
            _draft: &str,
            rules: &[Rule],
            _references: &[Reference],
            actor: Option<&Identity>,
        ) -> Critique {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.seen_rules.lock().unwrap() = rules.iter().map(|r| r.id.clone()).collect();
            *self.seen_actor.lock().unwrap() = actor.map(|a| a.user_id.clone());
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Critique::compliant("ok"))
        }
    }

    /// Returns queued results in order, then "rewrite N"
    #[derive(Default)]
    struct ScriptedReviser {
        script: Mutex<VecDeque<Result<String>>>,
        calls: AtomicUsize,
    }

    impl ScriptedReviser {
        fn new(script: Vec<Result<String>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                ..Default::default()
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Reviser for ScriptedReviser {
        async fn revise(&self, _draft: &str, _critique: &Critique, _rules: &[Rule]) -> Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(format!("rewrite {}", n)))
        }
    }

    struct BrokenSource;

    impl RuleSource for BrokenSource {
        fn current_snapshot(&self) -> Result<Arc<ArchiveSnapshot>> {
            Err(crate::error::ArchiveError::Unavailable("store offline".into()).into())
        }
    }

    fn archive() -> Arc<RuleArchive> {
        let temp = tempfile::TempDir::new().unwrap();
        write_rules(&temp);
        let archive = RuleArchive::new();
        archive.load(temp.path()).unwrap();
        Arc::new(archive)
    }

    fn write_rules(temp: &tempfile::TempDir) {
        std::fs::write(
            temp.path().join("rules.json"),
            r#"{
                "laws": [
                    {"id": "GCP.4", "category": "Domain", "text": "No speculation.", "tags": ["GxP"]},
                    {"id": "U1", "category": "Universal", "text": "Be honest."}
                ],
                "sentinel_rules": [
                    {"id": "SEC.1", "pattern": "delete\\s+database", "description": "Destructive Intent", "exempt_groups": ["db-admins"]}
                ]
            }"#,
        )
        .unwrap();
    }

    fn engine(evaluator: Arc<ScriptedEvaluator>, reviser: Arc<ScriptedReviser>) -> ComplianceEngine {
        ComplianceEngine::new(archive(), evaluator, reviser)
    }

    fn violation(id: &str) -> Critique {
        Critique::violation(id, Severity::High, format!("violates {}", id))
    }

    #[tokio::test]
    async fn test_compliant_draft_is_approved() {
        let evaluator = ScriptedEvaluator::new(vec![]);
        let reviser = ScriptedReviser::new(vec![]);
        let engine = engine(evaluator.clone(), reviser.clone());

        let trace = engine
            .run_compliance_cycle(&ComplianceRequest::new("Summarize", "A fine draft."))
            .await
            .unwrap();

        assert_eq!(trace.status, TraceStatus::Approved);
        assert_eq!(trace.revised_output, "A fine draft.");
        assert!(trace.delta.is_none());
        assert!(trace.history.is_empty());
        assert_eq!(evaluator.calls(), 1);
        assert_eq!(reviser.calls(), 0);
    }

    #[tokio::test]
    async fn test_violation_revised_into_compliance() {
        let evaluator = ScriptedEvaluator::new(vec![violation("GCP.4")]);
        let reviser = ScriptedReviser::new(vec![Ok("A safe rewrite.".to_string())]);
        let engine = engine(evaluator.clone(), reviser.clone());

        let trace = engine
            .run_compliance_cycle(&ComplianceRequest::new("Dose?", "I have a hunch."))
            .await
            .unwrap();

        assert_eq!(trace.status, TraceStatus::Revised);
        assert!(trace.critique.violation);
        assert_eq!(trace.critique.article_id.as_deref(), Some("GCP.4"));
        assert_eq!(trace.revised_output, "A safe rewrite.");
        let delta = trace.delta.as_deref().unwrap();
        assert!(delta.contains("-I have a hunch."));
        assert!(delta.contains("+A safe rewrite."));
        assert_eq!(trace.history.len(), 1);
        assert_eq!(evaluator.calls(), 2);
    }

    #[tokio::test]
    async fn test_guard_block_skips_evaluation() {
        let evaluator = ScriptedEvaluator::new(vec![]);
        let reviser = ScriptedReviser::new(vec![]);
        let engine = engine(evaluator.clone(), reviser.clone());

        let trace = engine
            .run_compliance_cycle(&ComplianceRequest::new(
                "Please DELETE DATABASE prod",
                "secret draft text",
            ))
            .await
            .unwrap();

        assert_eq!(trace.status, TraceStatus::Blocked);
        assert_eq!(trace.critique.article_id.as_deref(), Some(GUARD_BLOCK_ID));
        assert_eq!(trace.critique.severity, Severity::Critical);
        assert!(trace.critique.reasoning.contains("SEC.1"));
        assert_eq!(trace.revised_output, trace.critique.reasoning);
        assert!(!trace.revised_output.contains("secret draft text"));
        assert_eq!(trace.input_draft, "secret draft text");
        assert!(trace.delta.is_none());
        assert!(trace.history.is_empty());
        assert_eq!(evaluator.calls(), 0);
        assert_eq!(reviser.calls(), 0);
    }

    #[tokio::test]
    async fn test_exempt_actor_passes_guard() {
        let evaluator = ScriptedEvaluator::new(vec![]);
        let engine = engine(evaluator.clone(), ScriptedReviser::new(vec![]));
        let admin = Identity::new("ada", "ada@example.com").with_groups(["db-admins"]);

        let trace = engine
            .run_compliance_cycle(
                &ComplianceRequest::new("delete database staging", "Done.").with_actor(admin),
            )
            .await
            .unwrap();

        assert_eq!(trace.status, TraceStatus::Approved);
        assert_eq!(
            evaluator.seen_actor.lock().unwrap().as_deref(),
            Some("ada")
        );
    }

    #[tokio::test]
    async fn test_zero_retries_blocks_after_one_evaluation() {
        let evaluator = ScriptedEvaluator::new(vec![violation("GCP.4")]);
        let reviser = ScriptedReviser::new(vec![]);
        let engine = engine(evaluator.clone(), reviser.clone());

        let trace = engine
            .run_compliance_cycle(&ComplianceRequest::new("q", "bad draft").with_max_retries(0))
            .await
            .unwrap();

        assert_eq!(trace.status, TraceStatus::Blocked);
        assert_eq!(trace.revised_output, RETRIES_EXHAUSTED_MESSAGE);
        assert!(trace.history.is_empty());
        assert_eq!(evaluator.calls(), 1);
        assert_eq!(reviser.calls(), 0);
    }

    #[tokio::test]
    async fn test_oscillating_violations_exhaust_retries() {
        let evaluator = ScriptedEvaluator::new(vec![
            violation("A.1"),
            violation("B.2"),
            violation("A.1"),
            violation("B.2"),
        ]);
        let reviser = ScriptedReviser::new(vec![]);
        let engine = engine(evaluator.clone(), reviser.clone());

        let trace = engine
            .run_compliance_cycle(&ComplianceRequest::new("q", "draft 0").with_max_retries(3))
            .await
            .unwrap();

        assert_eq!(trace.status, TraceStatus::Blocked);
        assert_eq!(trace.history.len(), 3);
        assert_eq!(trace.critique.article_id.as_deref(), Some("A.1"));
        assert!(trace.revised_output.contains("could not produce compliant output"));
        assert!(trace.delta.is_none());
        assert_eq!(evaluator.calls(), 4);
        assert_eq!(reviser.calls(), 3);
    }

    #[tokio::test]
    async fn test_history_records_each_round() {
        let evaluator = ScriptedEvaluator::new(vec![violation("A.1"), violation("B.2")]);
        let reviser = ScriptedReviser::new(vec![]);
        let engine = engine(evaluator, reviser);

        let trace = engine
            .run_compliance_cycle(&ComplianceRequest::new("q", "draft 0"))
            .await
            .unwrap();

        assert_eq!(trace.status, TraceStatus::Revised);
        assert_eq!(trace.history.len(), 2);
        assert_eq!(trace.history[0].input_draft, "draft 0");
        assert_eq!(trace.history[0].critique.article_id.as_deref(), Some("A.1"));
        assert_eq!(trace.history[0].revised_output, "rewrite 1");
        assert_eq!(trace.history[1].input_draft, "rewrite 1");
        assert_eq!(trace.history[1].critique.article_id.as_deref(), Some("B.2"));
        assert_eq!(trace.history[1].revised_output, "rewrite 2");
        assert_eq!(trace.revised_output, "rewrite 2");
        assert_eq!(trace.critique.article_id.as_deref(), Some("A.1"));
    }

    #[tokio::test]
    async fn test_empty_revision_aborts() {
        let evaluator = ScriptedEvaluator::new(vec![violation("GCP.4")]);
        let reviser = ScriptedReviser::new(vec![Ok("   ".to_string())]);
        let engine = engine(evaluator.clone(), reviser.clone());

        let trace = engine
            .run_compliance_cycle(&ComplianceRequest::new("q", "bad draft"))
            .await
            .unwrap();

        assert_eq!(trace.status, TraceStatus::Blocked);
        assert!(trace.history.is_empty());
        assert_eq!(reviser.calls(), 1);
        assert_eq!(evaluator.calls(), 1);
    }

    #[tokio::test]
    async fn test_reviser_error_keeps_earlier_history() {
        let evaluator = ScriptedEvaluator::new(vec![violation("A.1"), violation("A.1")]);
        let reviser = ScriptedReviser::new(vec![
            Ok("first try".to_string()),
            Err(ConstitutionError::Revision("model unavailable".into())),
        ]);
        let engine = engine(evaluator, reviser);

        let trace = engine
            .run_compliance_cycle(&ComplianceRequest::new("q", "bad draft"))
            .await
            .unwrap();

        assert_eq!(trace.status, TraceStatus::Blocked);
        assert_eq!(trace.history.len(), 1);
        assert_eq!(trace.revised_output, RETRIES_EXHAUSTED_MESSAGE);
    }

    #[tokio::test]
    async fn test_unknown_article_id_passes_through() {
        let evaluator = ScriptedEvaluator::new(vec![violation("HALLUCINATED.99")]);
        let engine = engine(evaluator, ScriptedReviser::new(vec![]));

        let trace = engine
            .run_compliance_cycle(&ComplianceRequest::new("q", "draft"))
            .await
            .unwrap();
        assert_eq!(
            trace.critique.article_id.as_deref(),
            Some("HALLUCINATED.99")
        );
    }

    #[tokio::test]
    async fn test_context_tags_filter_rules() {
        let evaluator = ScriptedEvaluator::new(vec![]);
        let engine = engine(evaluator.clone(), ScriptedReviser::new(vec![]));

        engine
            .run_compliance_cycle(&ComplianceRequest::new("q", "d").with_context_tags(["Finance"]))
            .await
            .unwrap();
        assert_eq!(*evaluator.seen_rules.lock().unwrap(), vec!["U1".to_string()]);

        engine
            .run_compliance_cycle(&ComplianceRequest::new("q", "d").with_context_tags(["GxP"]))
            .await
            .unwrap();
        assert_eq!(evaluator.seen_rules.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_rule_source_failure_propagates() {
        let evaluator = ScriptedEvaluator::new(vec![]);
        let engine = ComplianceEngine::new(
            Arc::new(BrokenSource),
            evaluator.clone(),
            ScriptedReviser::new(vec![]),
        );

        let err = engine
            .run_compliance_cycle(&ComplianceRequest::new("q", "d"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("store offline"));
        assert_eq!(evaluator.calls(), 0);
    }

    #[tokio::test]
    async fn test_archive_reload_reaches_guard() {
        let temp = tempfile::TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("guards.json"),
            r#"[{"id": "OLD", "pattern": "alpha", "description": "old"}]"#,
        )
        .unwrap();
        let archive = Arc::new(RuleArchive::new());
        archive.load(temp.path()).unwrap();
        let engine = ComplianceEngine::new(
            archive.clone(),
            ScriptedEvaluator::new(vec![]),
            ScriptedReviser::new(vec![]),
        );

        std::fs::write(
            temp.path().join("guards.json"),
            r#"[{"id": "NEW", "pattern": "beta", "description": "new"}]"#,
        )
        .unwrap();
        archive.load(temp.path()).unwrap();

        let trace = engine
            .run_compliance_cycle(&ComplianceRequest::new("beta please", "d"))
            .await
            .unwrap();
        assert_eq!(trace.status, TraceStatus::Blocked);
        assert!(trace.critique.reasoning.contains("NEW"));

        let trace = engine
            .run_compliance_cycle(&ComplianceRequest::new("alpha please", "d"))
            .await
            .unwrap();
        assert_eq!(trace.status, TraceStatus::Approved);
    }

    #[test]
    fn test_request_defaults_from_json() {
        let request: ComplianceRequest =
            serde_json::from_str(r#"{"input_prompt": "q", "draft": "d"}"#).unwrap();
        assert_eq!(request.max_retries, 3);
        assert!(request.context_tags.is_none());
        assert!(request.actor.is_none());
    }
}
