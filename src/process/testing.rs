//! Scripted process runner for unit tests

use super::runner::{ProcessOptions, ProcessOutput, ProcessRunner, Stdio};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

/// A recorded call
#[derive(Debug, Clone)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: HashMap<String, String>,
    pub stdio: Stdio,
}

impl Invocation {
    /// Program and arguments joined by spaces
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(|a| a.as_str()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

type Handler = dyn Fn(&Invocation) -> Result<ProcessOutput> + Send + Sync;

/// Runner that records invocations and answers from a handler
pub struct ScriptedRunner {
    handler: Box<Handler>,
    delay: Option<Duration>,
    calls: Mutex<Vec<Invocation>>,
}

impl ScriptedRunner {
    /// Answer every call with `handler`
    pub fn new(handler: impl Fn(&Invocation) -> Result<ProcessOutput> + Send + Sync + 'static) -> Self {
        Self {
            handler: Box::new(handler),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every call exits 0 with no output
    pub fn succeeding() -> Self {
        Self::new(|_| Ok(ProcessOutput::exited(0, "", "")))
    }

    /// Sleep before answering each call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Recorded calls in order
    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    /// Recorded command lines in order
    pub fn command_lines(&self) -> Vec<String> {
        self.calls().iter().map(Invocation::command_line).collect()
    }

    /// Number of recorded calls
    pub fn count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ProcessRunner for ScriptedRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        options: &ProcessOptions,
    ) -> Result<ProcessOutput> {
        let invocation = Invocation {
            program: program.to_string(),
            args: args.to_vec(),
            cwd: options.cwd.clone(),
            env: options.env.clone(),
            stdio: options.stdio,
        };
        self.calls.lock().unwrap().push(invocation.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        (self.handler)(&invocation)
    }
}
