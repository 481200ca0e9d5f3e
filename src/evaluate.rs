use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::{ComputePlugin, EvalError, Line, Stage, StageKind, Step, StepKind, Value, Verdict};

/// Called after each step's result has been written back into its line.
pub(crate) trait PostStepHook {
    fn after_step(&self, line: &Line, index: usize);
}

/// Stores every non-leading step's result through the line's first plugin,
/// keyed by the step id. Failures are logged and otherwise ignored.
pub(crate) struct CacheWrite;

impl PostStepHook for CacheWrite {
    fn after_step(&self, line: &Line, index: usize) {
        if index == 0 {
            return;
        }
        let Some(store) = line.steps[0].plugin.as_deref() else {
            return;
        };
        let step = &line.steps[index];
        let (Some(id), Some(result)) = (step.id.as_deref(), step.result.as_ref()) else {
            debug!(step = index, "cache write skipped, step has no id or result");
            return;
        };
        let args = [Value::from(id), Value::from(result.as_text().into_owned())];
        if let Err(err) = store.run(&args) {
            debug!(step = index, %err, "cache write failed");
        }
    }
}

enum Gate {
    Open,
    Closed,
}

/// Result of a single step.
enum Flow {
    /// Write the result back and carry on.
    Write(Option<Value>),
    /// Leave the step untouched and move to the next one.
    Skip,
    Reject,
}

pub(crate) fn evaluate(
    stage: &mut Stage,
    kind: StageKind,
    record: &str,
    hook: Option<&dyn PostStepHook>,
) -> Result<Verdict, EvalError> {
    let mut downstream: BTreeMap<String, Option<Value>> = BTreeMap::new();
    let mut send_all = false;

    'lines: for (line_idx, line) in stage.lines.iter_mut().enumerate() {
        for step_idx in 0..line.steps.len() {
            match eval_step(line, line_idx, step_idx, kind, record)? {
                Flow::Reject => {
                    debug!(stage = %kind, line = line_idx, step = step_idx, "condition is false");
                    return Ok(Verdict::reject(kind));
                }
                Flow::Skip => continue,
                Flow::Write(result) => line.steps[step_idx].result = result,
            }

            if let Some(hook) = hook {
                hook.after_step(line, step_idx);
            }

            if kind == StageKind::Projection {
                let step = &line.steps[step_idx];
                if step.kind == StepKind::SendAll {
                    send_all = true;
                    break 'lines;
                }
                let id = step.id.clone().ok_or(EvalError::MissingStepId {
                    line: line_idx,
                    step: step_idx,
                })?;
                downstream.insert(id, step.result.clone());
            }
        }
    }

    if kind != StageKind::Projection {
        debug!(stage = %kind, "stage passed");
        return Ok(Verdict::pass(kind));
    }

    if send_all {
        debug!("sending whole record");
        return Ok(Verdict::with_output(kind, record.as_bytes().to_vec()));
    }

    let output = serde_json::to_vec(&downstream)?;
    debug!(fields = downstream.len(), "projection built");
    Ok(Verdict::with_output(kind, output))
}

fn eval_step(
    line: &mut Line,
    line_idx: usize,
    step_idx: usize,
    kind: StageKind,
    record: &str,
) -> Result<Flow, EvalError> {
    let (before, rest) = line.steps.split_at_mut(step_idx);
    let prev: Option<&Step> = before.last();
    let step = &mut rest[0];
    let mut args = Vec::new();

    if step.get_prev {
        let Some(prev) = prev else {
            return Err(EvalError::PreviousOfFirstStep {
                line: line_idx,
                step: step_idx,
            });
        };
        let text = match &prev.result {
            Some(Value::String(s)) => s.clone(),
            other => {
                return Err(EvalError::PreviousNotText {
                    line: line_idx,
                    step: step_idx,
                    found: other.as_ref().map_or("unset", Value::type_name),
                })
            }
        };
        debug!(line = line_idx, step = step_idx, value = %text, "previous step value");
        step.value = Some(text.clone());
        args.push(Value::String(text));
    }

    if step.args.is_empty() {
        // Cache steps take their literal after the arguments instead.
        if kind != StageKind::Cache {
            if let Some(value) = &step.value {
                args.push(Value::from(value.as_str()));
            }
        }
    } else if let Gate::Closed = collect_args(step, record, line_idx, step_idx, &mut args)? {
        return Ok(Flow::Reject);
    }

    if kind == StageKind::Cache {
        if let Some(value) = &step.value {
            args.push(Value::from(value.as_str()));
        }
    }
    args.push(Value::from(record));

    if kind != StageKind::Cache {
        if let (StepKind::Operator, Some(plugin)) = (step.kind, step.plugin.as_deref()) {
            let Some(prev) = prev else {
                warn!(line = line_idx, step = step_idx, "operator step has no predecessor, skipping");
                return Ok(Flow::Skip);
            };
            let (Some(left), Some(right)) = (prev.result.clone(), step.result.clone()) else {
                return Err(EvalError::UnsetOperand {
                    line: line_idx,
                    step: step_idx,
                });
            };
            return if operator_gate(plugin, &[left, right], line_idx, step_idx)? {
                Ok(Flow::Skip)
            } else {
                Ok(Flow::Reject)
            };
        }
    }

    let result = match step.plugin.as_deref() {
        Some(plugin) => Some(plugin.run(&args).map_err(|source| EvalError::Plugin {
            line: line_idx,
            step: step_idx,
            source,
        })?),
        None => None,
    };
    debug!(line = line_idx, step = step_idx, id = ?step.id, ?result, "step evaluated");
    Ok(Flow::Write(result))
}

/// Evaluates the multi-argument children of `step` into `args`. A trailing
/// operator child gates the whole stage.
fn collect_args(
    step: &Step,
    record: &str,
    line: usize,
    index: usize,
    args: &mut Vec<Value>,
) -> Result<Gate, EvalError> {
    for child in &step.args {
        if let (StepKind::Operator, Some(plugin)) = (child.kind, child.plugin.as_deref()) {
            let value = step
                .value
                .as_deref()
                .ok_or(EvalError::MissingValue { line, step: index })?;
            let operand = child
                .result
                .clone()
                .ok_or(EvalError::UnsetOperand { line, step: index })?;
            if !operator_gate(plugin, &[Value::from(value), operand], line, index)? {
                return Ok(Gate::Closed);
            }
            break;
        }

        let Some(plugin) = child.plugin.as_deref() else {
            if let Some(value) = &child.value {
                args.push(Value::from(value.as_str()));
            }
            continue;
        };
        let mut child_args = Vec::with_capacity(2);
        if let Some(value) = &child.value {
            child_args.push(Value::from(value.as_str()));
        }
        child_args.push(Value::from(record));
        let value = plugin
            .run(&child_args)
            .map_err(|source| EvalError::Argument {
                line,
                step: index,
                source,
            })?;
        debug!(line, step = index, %value, "argument value");
        args.push(value);
    }
    Ok(Gate::Open)
}

fn operator_gate(
    plugin: &dyn ComputePlugin,
    operands: &[Value],
    line: usize,
    step: usize,
) -> Result<bool, EvalError> {
    match plugin.run(operands) {
        Ok(Value::Bool(passed)) => {
            debug!(line, step, operator = plugin.name(), passed, "operator result");
            Ok(passed)
        }
        Ok(other) => Err(EvalError::NonBooleanOperator {
            plugin: plugin.name().to_owned(),
            line,
            step,
            found: other.type_name(),
        }),
        Err(source) => Err(EvalError::Plugin { line, step, source }),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::{FnPlugin, PluginError, SendAll};

    fn echo_first() -> Arc<dyn ComputePlugin> {
        FnPlugin::shared("FIRST", |args| Ok(args[0].clone()))
    }

    fn equals() -> Arc<dyn ComputePlugin> {
        FnPlugin::shared("EQ", |args| Ok(Value::Bool(args[0] == args[1])))
    }

    fn run(stage: &mut Stage, kind: StageKind, record: &str) -> Result<Verdict, EvalError> {
        evaluate(stage, kind, record, None)
    }

    #[test]
    fn empty_predicate_passes() {
        let mut stage = Stage::new();
        let verdict = run(&mut stage, StageKind::Predicate, "{}").unwrap();
        assert_eq!(verdict, Verdict::pass(StageKind::Predicate));
    }

    #[test]
    fn empty_projection_is_empty_object() {
        let mut stage = Stage::new();
        let verdict = run(&mut stage, StageKind::Projection, "{}").unwrap();
        assert_eq!(verdict.output(), Some(&b"{}"[..]));
    }

    #[test]
    fn plain_step_gets_value_then_record() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let plugin = FnPlugin::shared("SPY", move |args| {
            sink.lock().unwrap().extend_from_slice(args);
            Ok(Value::Int(1))
        });
        let mut stage = Stage::new().line(|l| l.step(Step::call(plugin).value("lit")));
        run(&mut stage, StageKind::Predicate, "rec").unwrap();
        assert_eq!(*seen.lock().unwrap(), [Value::from("lit"), Value::from("rec")]);
    }

    #[test]
    fn cache_step_appends_value_after_arguments() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let plugin = FnPlugin::shared("SPY", move |args| {
            sink.lock().unwrap().push(args.to_vec());
            Ok(Value::Int(1))
        });
        let mut stage = Stage::new().line(|l| {
            l.step(Step::call(plugin).value("key").arg(Step::literal("extra")))
        });
        run(&mut stage, StageKind::Cache, "rec").unwrap();
        assert_eq!(
            seen.lock().unwrap()[0],
            [Value::from("extra"), Value::from("key"), Value::from("rec")]
        );
    }

    #[test]
    fn result_is_written_in_place() {
        let mut stage = Stage::new().line(|l| l.step(Step::call(echo_first()).value("v")));
        run(&mut stage, StageKind::Predicate, "rec").unwrap();
        assert_eq!(stage.lines()[0].steps()[0].result(), Some(&Value::from("v")));
    }

    #[test]
    fn get_prev_replaces_value_and_keeps_flags() {
        let mut stage = Stage::new().line(|l| {
            l.step(Step::call(echo_first()).value("from-prev"))
                .step(Step::call(echo_first()).get_prev())
        });
        run(&mut stage, StageKind::Predicate, "rec").unwrap();
        let second = &stage.lines()[0].steps()[1];
        assert_eq!(second.literal_value(), Some("from-prev"));
        assert_eq!(second.result(), Some(&Value::from("from-prev")));
        assert!(second.reads_previous());
    }

    #[test]
    fn get_prev_requires_text() {
        let int = FnPlugin::shared("INT", |_| Ok(Value::Int(5)));
        let mut stage = Stage::new()
            .line(|l| l.step(Step::call(int)).step(Step::call(echo_first()).get_prev()));
        let err = run(&mut stage, StageKind::Predicate, "rec").unwrap_err();
        assert!(matches!(
            err,
            EvalError::PreviousNotText { found: "int", .. }
        ));
    }

    #[test]
    fn operator_child_false_rejects() {
        let mut stage = Stage::new().line(|l| {
            l.step(
                Step::call(echo_first())
                    .value("left")
                    .arg(Step::operator(equals(), "right")),
            )
        });
        let verdict = run(&mut stage, StageKind::Predicate, "rec").unwrap();
        assert!(!verdict.passed());
    }

    #[test]
    fn operator_child_stops_argument_scan() {
        let boom = FnPlugin::shared("BOOM", |_| Err(PluginError::new("BOOM", "called")));
        let mut stage = Stage::new().line(|l| {
            l.step(
                Step::literal("same")
                    .arg(Step::operator(equals(), "same"))
                    .arg(Step::call(boom)),
            )
        });
        assert!(run(&mut stage, StageKind::Predicate, "rec").unwrap().passed());
    }

    #[test]
    fn operator_child_without_value_fails() {
        let mut stage = Stage::new().line(|l| {
            l.step(Step::call(echo_first()).arg(Step::operator(equals(), "x")))
        });
        let err = run(&mut stage, StageKind::Predicate, "rec").unwrap_err();
        assert!(matches!(err, EvalError::MissingValue { line: 0, step: 0 }));
    }

    #[test]
    fn non_boolean_operator_fails() {
        let mut stage = Stage::new().line(|l| {
            l.step(Step::call(echo_first()).value("a"))
                .step(Step::operator(echo_first(), "b"))
        });
        let err = run(&mut stage, StageKind::Predicate, "rec").unwrap_err();
        assert!(matches!(err, EvalError::NonBooleanOperator { found: "string", .. }));
    }

    #[test]
    fn argument_error_aborts() {
        let failing = FnPlugin::shared("LOOKUP", |_| Err(PluginError::new("LOOKUP", "down")));
        let mut stage = Stage::new().line(|l| {
            l.step(Step::call(echo_first()).arg(Step::call(failing).value("k")))
        });
        let err = run(&mut stage, StageKind::Projection, "rec").unwrap_err();
        assert!(matches!(err, EvalError::Argument { line: 0, step: 0, .. }));
    }

    #[test]
    fn projection_without_id_fails() {
        let mut stage = Stage::new().line(|l| l.step(Step::call(echo_first()).value("v")));
        let err = run(&mut stage, StageKind::Projection, "rec").unwrap_err();
        assert!(matches!(err, EvalError::MissingStepId { line: 0, step: 0 }));
    }

    #[test]
    fn send_all_stops_remaining_lines() {
        let boom = FnPlugin::shared("BOOM", |_| Err(PluginError::new("BOOM", "called")));
        let mut stage = Stage::new()
            .line(|l| l.step(Step::call(Arc::new(SendAll)).id("all")))
            .line(|l| l.step(Step::call(boom).id("never")));
        let verdict = run(&mut stage, StageKind::Projection, "raw bytes").unwrap();
        assert_eq!(verdict.output(), Some(&b"raw bytes"[..]));
    }

    #[test]
    fn cache_write_hook_stores_non_leading_results() {
        let stored = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&stored);
        let store = FnPlugin::shared("STORE", move |args| {
            sink.lock().unwrap().push(args.to_vec());
            Ok(Value::Bool(true))
        });
        let count = FnPlugin::shared("COUNT", |_| Ok(Value::Int(7)));
        let mut stage = Stage::new().line(|l| l.step(Step::call(store)).step(Step::call(count).id("hits")));
        evaluate(&mut stage, StageKind::Cache, "rec", Some(&CacheWrite)).unwrap();

        let stored = stored.lock().unwrap();
        // the first call is the leading step's own evaluation
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[1], [Value::from("hits"), Value::from("7")]);
    }

    #[test]
    fn cache_write_skips_steps_without_id_or_result() {
        let stored = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&stored);
        let store = FnPlugin::shared("STORE", move |args| {
            sink.lock().unwrap().push(args.to_vec());
            Ok(Value::Bool(true))
        });
        let count = FnPlugin::shared("COUNT", |_| Ok(Value::Int(7)));
        let mut stage = Stage::new().line(|l| {
            l.step(Step::call(store))
                .step(Step::call(Arc::clone(&count)))
                .step(Step::literal("lit").id("lit"))
                .step(Step::call(count).id("hits"))
        });
        evaluate(&mut stage, StageKind::Cache, "rec", Some(&CacheWrite)).unwrap();

        let stored = stored.lock().unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0], [Value::from("rec")]);
        assert_eq!(stored[1], [Value::from("hits"), Value::from("7")]);
    }

    #[test]
    fn cross_step_operator_with_unset_predecessor_fails() {
        let mut stage = Stage::new()
            .line(|l| l.step(Step::literal("x")).step(Step::operator(equals(), "x")));
        let err = run(&mut stage, StageKind::Predicate, "rec").unwrap_err();
        assert!(matches!(err, EvalError::UnsetOperand { line: 0, step: 1 }));
    }

    #[test]
    fn get_prev_of_unset_result_fails() {
        let mut stage = Stage::new()
            .line(|l| l.step(Step::literal("x")).step(Step::call(echo_first()).get_prev()));
        let err = run(&mut stage, StageKind::Predicate, "rec").unwrap_err();
        assert!(matches!(
            err,
            EvalError::PreviousNotText {
                line: 0,
                step: 1,
                found: "unset"
            }
        ));
    }

    #[test]
    fn cache_write_failure_is_ignored() {
        let store = FnPlugin::shared("STORE", |args| {
            if args.len() == 2 && args[0] == Value::from("hits") {
                Err(PluginError::new("STORE", "unavailable"))
            } else {
                Ok(Value::Bool(true))
            }
        });
        let count = FnPlugin::shared("COUNT", |_| Ok(Value::Int(7)));
        let mut stage = Stage::new().line(|l| l.step(Step::call(store)).step(Step::call(count).id("hits")));
        let verdict = evaluate(&mut stage, StageKind::Cache, "rec", Some(&CacheWrite)).unwrap();
        assert!(verdict.passed());
    }
}
