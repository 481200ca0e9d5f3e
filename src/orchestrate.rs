use std::time::Instant;

use tracing::{debug, debug_span, error, warn};

use crate::{CheckpointIdentifier, Dimensions, EvalError, Outcome, Rulebase, RunReport, StageKind};

pub const RULE_COUNT: &str = "rule_count";
pub const CRITICAL_ERRORS_COUNT: &str = "critical_errors_count";
pub const RULE_EXECUTION_TIME: &str = "rule_execution_time";

impl Rulebase {
    /// Run one record through predicate, cache and projection, then publish
    /// the projected document.
    ///
    /// Nothing is returned as an error: rejections, publish failures and hard
    /// evaluation errors all end up in the [`RunReport`]. When checkpointing
    /// is enabled, every record that is rejected or reaches publish is
    /// acknowledged exactly once; records that fail with a hard error are not.
    pub fn run_rule(&mut self, record: &CheckpointIdentifier) -> RunReport {
        let span = debug_span!("rule", rule = %self.config.name, record = %record.id);
        let _enter = span.enter();

        let start = Instant::now();
        let mut dimensions = Dimensions::new();
        dimensions.insert("shardId".to_owned(), record.shard_id.clone());
        dimensions.insert("rule".to_owned(), self.config.name.clone());

        let payload = match self.run_stages(record) {
            Ok(payload) => payload,
            Err(outcome) => return RunReport::new(outcome, start.elapsed()),
        };

        self.metrics.send_counter(RULE_COUNT, 1, &dimensions);

        let outcome = self.publish(&payload, record, &dimensions);

        let elapsed = start.elapsed();
        // An exhausted publish counts every attempt as a retry.
        let (attempts, retry_count) = match &outcome {
            Outcome::Published { attempts } => (*attempts, attempts.saturating_sub(1)),
            Outcome::PublishExhausted { attempts } => (*attempts, *attempts),
            _ => (0, 0),
        };
        dimensions.insert("retry_count".to_owned(), retry_count.to_string());
        self.metrics
            .send_gauge(RULE_EXECUTION_TIME, elapsed.as_secs_f64(), &dimensions);

        debug!(attempts, "rule run finished");
        RunReport::new(outcome, elapsed)
    }

    /// Gates the record through every stage. `Ok` carries the projected
    /// document; `Err` carries the terminal outcome.
    fn run_stages(&mut self, record: &CheckpointIdentifier) -> Result<Vec<u8>, Outcome> {
        for kind in [StageKind::Predicate, StageKind::Cache] {
            debug!(stage = %kind, "running stage");
            match self.evaluate(kind, &record.payload) {
                Ok(verdict) if verdict.passed() => {}
                Ok(_) => return Err(self.reject(kind, record)),
                Err(error) => return Err(fail(kind, error)),
            }
        }

        debug!(stage = %StageKind::Projection, "running stage");
        match self.evaluate(StageKind::Projection, &record.payload) {
            Ok(verdict) if verdict.passed() => match verdict.into_output() {
                Some(output) if !output.is_empty() => Ok(output),
                _ => Err(self.reject(StageKind::Projection, record)),
            },
            Ok(_) => Err(self.reject(StageKind::Projection, record)),
            Err(error) => Err(fail(StageKind::Projection, error)),
        }
    }

    fn reject(&self, stage: StageKind, record: &CheckpointIdentifier) -> Outcome {
        debug!(stage = %stage, "record rejected");
        if self.config.checkpoint {
            record.acknowledge();
        }
        Outcome::Rejected(stage)
    }

    fn publish(
        &self,
        payload: &[u8],
        record: &CheckpointIdentifier,
        dimensions: &Dimensions,
    ) -> Outcome {
        let max_attempts = self.config.publish_attempts.max(1);
        let destination = self.destination.name();

        for attempt in 1..=max_attempts {
            debug!(attempt, destination, "publishing");
            let error = match self.destination.publish(payload, dimensions) {
                Ok(true) => {
                    if self.config.checkpoint {
                        record.acknowledge();
                    }
                    debug!(attempt, destination, "published");
                    return Outcome::Published { attempts: attempt };
                }
                Ok(false) => "publish returned false".to_owned(),
                Err(err) => err.to_string(),
            };

            if attempt == max_attempts && self.config.checkpoint {
                error!(critical = true, attempt, destination, %error, "publish retries exhausted");
                self.metrics
                    .send_counter(CRITICAL_ERRORS_COUNT, 1, dimensions);
            } else {
                warn!(attempt, destination, %error, "unsuccessful publish");
            }
        }

        if self.config.checkpoint {
            record.acknowledge();
        }
        Outcome::PublishExhausted {
            attempts: max_attempts,
        }
    }
}

fn fail(stage: StageKind, error: EvalError) -> Outcome {
    error!(fatal = true, stage = %stage, %error, "rule evaluation failed");
    Outcome::Failed { stage, error }
}
