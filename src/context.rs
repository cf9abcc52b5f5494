//! Process-wide engine lifetime.
//!
//! External engines (modelers, mesh databases, log sinks) must start in a
//! fixed order and stop in exactly the reverse order. [`EngineContext`] owns
//! every started engine and stops them from its `Drop`, so teardown runs on
//! every exit path, including early returns through `?`.

use crate::loop_error::LoopError;

/// An engine with an explicit start/stop lifecycle.
pub trait Engine {
    fn name(&self) -> &str;
    fn start(&mut self) -> Result<(), LoopError>;
    /// Release the engine; must not fail.
    fn stop(&mut self);
}

/// Owner of all started engines.
#[derive(Default)]
pub struct EngineContext {
    started: Vec<Box<dyn Engine>>,
}

impl EngineContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `engine` and take ownership of it.
    ///
    /// On failure the engine is dropped without `stop`; engines started
    /// earlier remain owned and are stopped when the context drops.
    pub fn start(&mut self, mut engine: Box<dyn Engine>) -> Result<(), LoopError> {
        engine.start()?;
        log::debug!("engine `{}` started", engine.name());
        self.started.push(engine);
        Ok(())
    }

    /// Names of the running engines in start order.
    pub fn names(&self) -> Vec<&str> {
        self.started.iter().map(|e| e.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.started.len()
    }

    pub fn is_empty(&self) -> bool {
        self.started.is_empty()
    }
}

impl Drop for EngineContext {
    fn drop(&mut self) {
        while let Some(mut engine) = self.started.pop() {
            engine.stop();
            log::debug!("engine `{}` stopped", engine.name());
        }
    }
}
