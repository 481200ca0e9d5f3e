use std::fmt;
use std::sync::mpsc::{Sender, SyncSender};
use std::sync::Arc;

use thiserror::Error;

use super::checkpoint::CheckpointIdentifier;
use super::metrics::Dimensions;
use super::value::Value;

/// Reserved compute plugin name that switches a projection into passthrough mode.
pub const SEND_ALL: &str = "SENDALL";

/// Error returned by a plugin invocation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("plugin '{plugin}' failed: {message}")]
pub struct PluginError {
    plugin: String,
    message: String,
}

impl PluginError {
    pub fn new(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A compute capability invoked by steps.
///
/// Implementations should be cheap to call and free of hidden ordering
/// requirements; the evaluator may call them several times per record.
pub trait ComputePlugin: Send + Sync {
    /// Stable identifier. [`SEND_ALL`] is reserved.
    fn name(&self) -> &str;

    /// Map the argument list to a result.
    ///
    /// # Errors
    ///
    /// Any error is a hard failure for the current record.
    fn run(&self, args: &[Value]) -> Result<Value, PluginError>;
}

/// Bounded queue feeding records to the rule that owns the plugin. A full
/// queue blocks the sender until the rule catches up.
pub type RecordSender = SyncSender<CheckpointIdentifier>;

/// A destination capability: publishes projected documents and runs the
/// blocking consume loop that feeds the rule its records.
///
/// The plugin value owns its destination handle; it is shared with the
/// registry that built it, so mutation goes through `&self`.
pub trait IoPlugin: Send + Sync {
    fn name(&self) -> &str;

    /// Blocking read loop. Every record read from the source goes onto
    /// `records`; unrecoverable errors are pushed onto `fatal`. The loop
    /// should return once `records` is disconnected.
    ///
    /// # Errors
    ///
    /// Returns an error if the loop terminates abnormally.
    fn consume(&self, records: &RecordSender, fatal: &Sender<PluginError>)
        -> Result<(), PluginError>;

    /// Publish one payload. `Ok(false)` and `Err(_)` are both failed attempts.
    ///
    /// # Errors
    ///
    /// Returns an error describing why the publish failed.
    fn publish(&self, payload: &[u8], dimensions: &Dimensions) -> Result<bool, PluginError>;
}

type PluginFn = dyn Fn(&[Value]) -> Result<Value, PluginError> + Send + Sync;

/// A [`ComputePlugin`] backed by a closure.
///
/// # Example
///
/// ```
/// use stagerule::{ComputePlugin, FnPlugin, Value};
///
/// let upper = FnPlugin::new("UPPER", |args| {
///     Ok(Value::from(args[0].as_text().to_uppercase()))
/// });
/// assert_eq!(upper.run(&[Value::from("abc")]).unwrap(), Value::from("ABC"));
/// ```
pub struct FnPlugin {
    name: String,
    func: Box<PluginFn>,
}

impl FnPlugin {
    pub fn new(
        name: impl Into<String>,
        func: impl Fn(&[Value]) -> Result<Value, PluginError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            func: Box::new(func),
        }
    }

    /// Convenience for building a shared plugin handle.
    pub fn shared(
        name: impl Into<String>,
        func: impl Fn(&[Value]) -> Result<Value, PluginError> + Send + Sync + 'static,
    ) -> Arc<dyn ComputePlugin> {
        Arc::new(Self::new(name, func))
    }
}

impl ComputePlugin for FnPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, args: &[Value]) -> Result<Value, PluginError> {
        (self.func)(args)
    }
}

impl fmt::Debug for FnPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnPlugin").field("name", &self.name).finish()
    }
}

/// The passthrough plugin. A projection step using it emits the raw record.
#[derive(Debug, Clone, Copy, Default)]
pub struct SendAll;

impl ComputePlugin for SendAll {
    fn name(&self) -> &str {
        SEND_ALL
    }

    fn run(&self, _args: &[Value]) -> Result<Value, PluginError> {
        Ok(Value::Bool(true))
    }
}
