#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Mutex};

use stagerule::{
    CheckpointIdentifier, ComputePlugin, Dimensions, FnPlugin, IoPlugin, PluginError,
    RecordSender, Value,
};

/// `GETFIELD(name, record)`: top-level JSON field of the record.
pub fn get_field() -> Arc<dyn ComputePlugin> {
    FnPlugin::shared("GETFIELD", |args| {
        let (Some(name), Some(record)) = (args.first(), args.last()) else {
            return Err(PluginError::new("GETFIELD", "expected field name and record"));
        };
        let doc: serde_json::Value = serde_json::from_str(&record.as_text())
            .map_err(|e| PluginError::new("GETFIELD", e.to_string()))?;
        let key = name.as_text();
        match doc.get(&*key) {
            Some(serde_json::Value::String(s)) => Ok(Value::from(s.as_str())),
            Some(serde_json::Value::Bool(b)) => Ok(Value::Bool(*b)),
            Some(serde_json::Value::Number(n)) => Ok(n
                .as_i64()
                .map_or_else(|| Value::Float(n.as_f64().unwrap_or_default()), Value::Int)),
            Some(other) => Ok(Value::from(other.to_string())),
            None => Err(PluginError::new("GETFIELD", format!("missing field '{key}'"))),
        }
    })
}

/// `EQ(a, b)`: equality operator.
pub fn equals() -> Arc<dyn ComputePlugin> {
    FnPlugin::shared("EQ", |args| Ok(Value::Bool(args.len() == 2 && args[0] == args[1])))
}

/// Returns its first argument.
pub fn echo() -> Arc<dyn ComputePlugin> {
    FnPlugin::shared("ECHO", |args| Ok(args[0].clone()))
}

/// A plugin that counts its invocations and returns a constant.
pub struct Counting {
    name: String,
    result: Value,
    calls: AtomicUsize,
}

impl Counting {
    pub fn new(name: &str, result: impl Into<Value>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_owned(),
            result: result.into(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ComputePlugin for Counting {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, _args: &[Value]) -> Result<Value, PluginError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.result.clone())
    }
}

/// A destination whose publish outcomes follow a script. Once the script is
/// exhausted every publish succeeds.
pub struct ScriptedSink {
    script: Mutex<Vec<bool>>,
    attempts: AtomicUsize,
    published: Mutex<Vec<Vec<u8>>>,
    consume_error: Option<String>,
    source: Vec<String>,
    trackers: Mutex<Vec<Receiver<u8>>>,
}

impl ScriptedSink {
    pub fn new(script: &[bool]) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.iter().rev().copied().collect()),
            attempts: AtomicUsize::new(0),
            published: Mutex::new(Vec::new()),
            consume_error: None,
            source: Vec::new(),
            trackers: Mutex::new(Vec::new()),
        })
    }

    /// A healthy sink whose consume loop emits one record per payload, then
    /// returns.
    pub fn feeding(payloads: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            published: Mutex::new(Vec::new()),
            consume_error: None,
            source: payloads.iter().map(|p| (*p).to_owned()).collect(),
            trackers: Mutex::new(Vec::new()),
        })
    }

    pub fn healthy() -> Arc<Self> {
        Self::new(&[])
    }

    pub fn always_failing() -> Arc<Self> {
        Self::new(&[false; 64])
    }

    /// A sink whose consume loop reports an unrecoverable error and exits.
    pub fn broken_source(message: &str) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            published: Mutex::new(Vec::new()),
            consume_error: Some(message.to_owned()),
            source: Vec::new(),
            trackers: Mutex::new(Vec::new()),
        })
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn published(&self) -> Vec<Vec<u8>> {
        self.published.lock().unwrap().clone()
    }

    /// Acknowledgements received for the records this sink's consume loop
    /// emitted, one entry per record.
    pub fn source_acks(&self) -> Vec<usize> {
        self.trackers.lock().unwrap().iter().map(acks).collect()
    }
}

impl IoPlugin for ScriptedSink {
    fn name(&self) -> &str {
        "scripted"
    }

    fn consume(
        &self,
        records: &RecordSender,
        fatal: &Sender<PluginError>,
    ) -> Result<(), PluginError> {
        if let Some(message) = &self.consume_error {
            let _ = fatal.send(PluginError::new("scripted", message.clone()));
        }
        for (i, payload) in self.source.iter().enumerate() {
            let (rec, tracker) =
                CheckpointIdentifier::new(format!("src-{i}"), "shard-0", payload.as_str());
            self.trackers.lock().unwrap().push(tracker);
            if records.send(rec).is_err() {
                break;
            }
        }
        Ok(())
    }

    fn publish(&self, payload: &[u8], _dimensions: &Dimensions) -> Result<bool, PluginError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let ok = self.script.lock().unwrap().pop().unwrap_or(true);
        if ok {
            self.published.lock().unwrap().push(payload.to_vec());
            Ok(true)
        } else {
            Err(PluginError::new("scripted", "destination unavailable"))
        }
    }
}

pub fn record(payload: &str) -> (CheckpointIdentifier, Receiver<u8>) {
    CheckpointIdentifier::new("seq-1", "shard-0", payload)
}

/// Number of acknowledgements waiting on the conduit.
pub fn acks(rx: &Receiver<u8>) -> usize {
    rx.try_iter().count()
}
