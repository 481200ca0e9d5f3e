use std::sync::mpsc::Sender;
use std::sync::Arc;

use stagerule::{
    CheckpointIdentifier, ComputePlugin, Dimensions, FnPlugin, IoPlugin, PluginError,
    RecordSender, RulebaseBuilder, Step, Value,
};

/// Prints every published document.
struct Stdout;

impl IoPlugin for Stdout {
    fn name(&self) -> &str {
        "stdout"
    }

    fn consume(&self, _: &RecordSender, _: &Sender<PluginError>) -> Result<(), PluginError> {
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

fn main() {
    stagerule::logging::init("info");

    let equals = FnPlugin::shared("EQ", |args| Ok(Value::Bool(args[0] == args[1])));
    let echo = FnPlugin::shared("ECHO", |args| Ok(args[0].clone()));

    // Publish the user and country of every active account.
    let mut rule = RulebaseBuilder::new("active_users")
        .predicate(|s| {
            s.line(|l| {
                l.step(Step::call(get_field()).value("status")).step(
                    Step::call(echo)
                        .get_prev()
                        .arg(Step::operator(equals, "active")),
                )
            })
        })
        .projection(|s| {
            s.line(|l| {
                l.step(Step::call(get_field()).value("user").id("user"))
                    .step(Step::call(get_field()).value("country").id("country"))
            })
        })
        .destination(Arc::new(Stdout))
        .checkpoint(true)
        .build()
        .expect("failed to build rule");

    println!("{rule}");

    let records = [
        r#"{"user":"ada","status":"active","country":"uk"}"#,
        r#"{"user":"bob","status":"suspended","country":"fr"}"#,
    ];
    for (i, payload) in records.iter().enumerate() {
        let (record, acks) = CheckpointIdentifier::new(format!("seq-{i}"), "shard-0", *payload);
        let report = rule.run_rule(&record);
        println!("{}: {report} (acknowledged: {})", record.id, acks.try_recv().is_ok());
    }
}
