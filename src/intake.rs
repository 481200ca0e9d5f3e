use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
    CheckpointIdentifier, EvalError, FailurePolicy, IoPlugin, Outcome, PluginError,
    RecordSender, Rulebase, StageKind,
};

/// Default capacity of each rule's record queue.
pub const DEFAULT_QUEUE_DEPTH: usize = 1024;

/// Failures surfaced to whoever supervises the running rules.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("source of rule '{rule}' failed")]
    Source {
        rule: String,
        #[source]
        source: PluginError,
    },

    #[error("rule '{rule}' halted on record '{record}' at {stage}")]
    Halted {
        rule: String,
        record: String,
        stage: StageKind,
        #[source]
        source: EvalError,
    },
}

impl Rulebase {
    /// Run the destination's blocking consume loop. Records it reads go onto
    /// `records`; unrecoverable source errors go onto `fatal`.
    ///
    /// # Errors
    ///
    /// Returns the error the consume loop terminated with.
    pub fn run_record_generation(
        &self,
        records: &RecordSender,
        fatal: &Sender<PluginError>,
    ) -> Result<(), PluginError> {
        self.intake().run(records, fatal)
    }

    /// A detached handle to this rule's consume loop, for running it on
    /// another thread while records are processed.
    #[must_use]
    pub fn intake(&self) -> RecordIntake {
        RecordIntake {
            rule: self.config.name.clone(),
            plugin: Arc::clone(&self.destination),
        }
    }
}

/// Keeps a rule's destination plugin consuming for the rule's lifetime,
/// feeding whatever it reads to the rule's record queue.
pub struct RecordIntake {
    rule: String,
    plugin: Arc<dyn IoPlugin>,
}

impl RecordIntake {
    #[must_use]
    pub fn rule(&self) -> &str {
        &self.rule
    }

    /// # Errors
    ///
    /// Returns the error the consume loop terminated with.
    pub fn run(
        &self,
        records: &RecordSender,
        fatal: &Sender<PluginError>,
    ) -> Result<(), PluginError> {
        debug!(rule = %self.rule, plugin = self.plugin.name(), "running consume");
        self.plugin.consume(records, fatal)
    }
}

/// Feeds records to one [`Rulebase`], strictly one at a time.
#[derive(Debug)]
pub struct RuleWorker {
    rulebase: Rulebase,
    processed: u64,
}

impl RuleWorker {
    #[must_use]
    pub fn new(rulebase: Rulebase) -> Self {
        Self {
            rulebase,
            processed: 0,
        }
    }

    /// Process records until the channel closes. Returns the number of
    /// records processed by this worker so far.
    ///
    /// # Errors
    ///
    /// With [`FailurePolicy::Halt`], the first hard evaluation error stops the
    /// worker and is returned.
    pub fn run(&mut self, records: &Receiver<CheckpointIdentifier>) -> Result<u64, SupervisorError> {
        for record in records {
            let report = self.rulebase.run_rule(&record);
            self.processed += 1;
            debug!(rule = %self.rulebase.name(), record = %record.id, %report, "record done");

            if let Outcome::Failed { stage, error } = report.into_outcome() {
                match self.rulebase.failure_policy() {
                    FailurePolicy::Halt => {
                        return Err(SupervisorError::Halted {
                            rule: self.rulebase.name().to_owned(),
                            record: record.id.clone(),
                            stage,
                            source: error,
                        });
                    }
                    FailurePolicy::DropRecord => {
                        warn!(rule = %self.rulebase.name(), record = %record.id, "record dropped");
                    }
                }
            }
        }
        Ok(self.processed)
    }

    #[must_use]
    pub fn processed(&self) -> u64 {
        self.processed
    }

    #[must_use]
    pub fn into_inner(self) -> Rulebase {
        self.rulebase
    }
}

/// How a rule worker ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// The record channel closed.
    Drained,
    /// A hard error stopped the worker; details went to the fatal conduit.
    Halted,
    Panicked,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerExit {
    pub rule: String,
    pub processed: u64,
    pub status: ExitStatus,
}

struct Running {
    rule: String,
    worker: JoinHandle<(u64, ExitStatus)>,
}

/// Runs many rules concurrently: one worker thread and one consume thread
/// per rule, joined by a bounded record queue. All fatal conditions arrive on
/// a single conduit.
pub struct Supervisor {
    fatal_tx: Sender<SupervisorError>,
    fatal_rx: Receiver<SupervisorError>,
    queue_depth: usize,
    running: Vec<Running>,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Supervisor {
    #[must_use]
    pub fn new() -> Self {
        Self::with_queue_depth(DEFAULT_QUEUE_DEPTH)
    }

    /// A supervisor whose record queues hold at most `depth` pending records
    /// per rule (at least one).
    #[must_use]
    pub fn with_queue_depth(depth: usize) -> Self {
        let (fatal_tx, fatal_rx) = mpsc::channel();
        Self {
            fatal_tx,
            fatal_rx,
            queue_depth: depth.max(1),
            running: Vec::new(),
        }
    }

    /// Start a rule. The destination's consume loop and the returned sender
    /// both feed the same bounded queue, and records are processed in the
    /// order they enter it. The worker finishes once every sender is gone:
    /// the returned one dropped and the consume loop returned.
    ///
    /// Consume threads are detached: a consume loop may block for the life
    /// of the process.
    ///
    /// # Errors
    ///
    /// Returns an error if a thread cannot be spawned.
    pub fn spawn(&mut self, rulebase: Rulebase) -> std::io::Result<RecordSender> {
        let rule = rulebase.name().to_owned();
        let (record_tx, record_rx) = mpsc::sync_channel(self.queue_depth);
        let intake = rulebase.intake();

        let fatal = self.fatal_tx.clone();
        let worker = thread::Builder::new()
            .name(format!("rule-{rule}"))
            .spawn(move || {
                let mut worker = RuleWorker::new(rulebase);
                match worker.run(&record_rx) {
                    Ok(processed) => (processed, ExitStatus::Drained),
                    Err(err) => {
                        error!(%err, "rule worker halted");
                        let _ = fatal.send(err);
                        (worker.processed(), ExitStatus::Halted)
                    }
                }
            })?;

        info!(rule = %rule, queue_depth = self.queue_depth, "rule started");
        self.running.push(Running { rule, worker });

        self.spawn_intake(intake, record_tx.clone())?;
        Ok(record_tx)
    }

    fn spawn_intake(&self, intake: RecordIntake, records: RecordSender) -> std::io::Result<()> {
        let rule = intake.rule().to_owned();
        let (source_tx, source_rx) = mpsc::channel::<PluginError>();

        let fatal = self.fatal_tx.clone();
        let forward_rule = rule.clone();
        thread::Builder::new()
            .name(format!("rule-{rule}-errors"))
            .spawn(move || {
                for source in source_rx {
                    error!(rule = %forward_rule, %source, "source error");
                    let _ = fatal.send(SupervisorError::Source {
                        rule: forward_rule.clone(),
                        source,
                    });
                }
            })?;

        let fatal = self.fatal_tx.clone();
        thread::Builder::new()
            .name(format!("rule-{rule}-intake"))
            .spawn(move || {
                if let Err(source) = intake.run(&records, &source_tx) {
                    let _ = fatal.send(SupervisorError::Source {
                        rule: intake.rule().to_owned(),
                        source,
                    });
                }
            })?;
        Ok(())
    }

    /// The conduit carrying every fatal condition.
    #[must_use]
    pub fn errors(&self) -> &Receiver<SupervisorError> {
        &self.fatal_rx
    }

    /// Wait for every worker to finish. Callers must drop the record senders
    /// first, and each rule's consume loop must have returned.
    #[must_use]
    pub fn join(self) -> Vec<WorkerExit> {
        self.running
            .into_iter()
            .map(|running| {
                let (processed, status) = running
                    .worker
                    .join()
                    .unwrap_or((0, ExitStatus::Panicked));
                WorkerExit {
                    rule: running.rule,
                    processed,
                    status,
                }
            })
            .collect()
    }
}
