use std::sync::mpsc::Sender;
use std::sync::Arc;

use stagerule::{
    CheckpointIdentifier, ComputePlugin, Dimensions, FnPlugin, IoPlugin, PluginError,
    RecordSender, RulebaseBuilder, SendAll, Step, Supervisor, Value,
};

const EVENTS: [&str; 5] = [
    r#"{"color":"red","n":1}"#,
    r#"{"color":"blue","n":2}"#,
    r#"{"color":"green","n":3}"#,
    r#"{"color":"red","n":4}"#,
    r#"{"color":"blue","n":5}"#,
];

/// Reads a fixed batch of events and prints whatever gets published.
struct Feed;

impl IoPlugin for Feed {
    fn name(&self) -> &str {
        "feed"
    }

    fn consume(&self, records: &RecordSender, _: &Sender<PluginError>) -> Result<(), PluginError> {
        for (i, payload) in EVENTS.iter().enumerate() {
            let (record, _acks) = CheckpointIdentifier::new(format!("seq-{i}"), "shard-0", *payload);
            if records.send(record).is_err() {
                break;
            }
        }
        Ok(())
    }

    fn publish(&self, payload: &[u8], dimensions: &Dimensions) -> Result<bool, PluginError> {
        println!("[{}] {}", dimensions["rule"], String::from_utf8_lossy(payload));
        Ok(true)
    }
}

fn get_field() -> Arc<dyn ComputePlugin> {
    FnPlugin::shared("GETFIELD", |args| {
        let doc: serde_json::Value = serde_json::from_str(&args[1].as_text())
            .map_err(|e| PluginError::new("GETFIELD", e.to_string()))?;
        match doc.get(&*args[0].as_text()) {
            Some(serde_json::Value::String(s)) => Ok(Value::from(s.as_str())),
            Some(other) => Ok(Value::from(other.to_string())),
            None => Err(PluginError::new("GETFIELD", "missing field")),
        }
    })
}

/// Forwards whole records whose `color` field matches.
fn color_rule(color: &str) -> RulebaseBuilder {
    let equals = FnPlugin::shared("EQ", |args| Ok(Value::Bool(args[0] == args[1])));
    let echo = FnPlugin::shared("ECHO", |args| Ok(args[0].clone()));
    let color = color.to_owned();
    RulebaseBuilder::new(color.as_str())
        .predicate(move |s| {
            s.line(|l| {
                l.step(Step::call(get_field()).value("color"))
                    .step(Step::call(echo).get_prev().arg(Step::operator(equals, color)))
            })
        })
        .projection(|s| s.line(|l| l.step(Step::call(Arc::new(SendAll)).id("all"))))
        .destination(Arc::new(Feed))
}

fn main() {
    stagerule::logging::init("info");

    let mut supervisor = Supervisor::with_queue_depth(2);
    for color in ["red", "blue"] {
        let rule = color_rule(color).build().expect("failed to build rule");
        // Records arrive only through each rule's consume loop.
        drop(supervisor.spawn(rule).expect("failed to spawn rule"));
    }

    for exit in supervisor.join() {
        println!("{}: {:?} after {} record(s)", exit.rule, exit.status, exit.processed);
    }
}
