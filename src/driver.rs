use std::{sync::Arc, thread};

use crate::{
    element::ElementType,
    queue::CommandQueue,
    release::{FlushStats, ReleaseQueue},
    stream::{CommandStream, DebugLevel, MarkerSink, TracingSink},
};

/// Configuration read once when a [`Driver`] is constructed.
pub struct DriverConfig {
    /// Instrumentation emitted by the command stream
    pub debug: DebugLevel,
    /// Name given to the execution thread
    pub thread_name: String,
    /// Marker receiver used when `debug` is [`DebugLevel::Markers`]; defaults to
    /// [`TracingSink`]
    pub sink: Option<Arc<dyn MarkerSink>>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            debug: DebugLevel::Off,
            thread_name: "moraine-exec".into(),
            sink: None,
        }
    }
}

/// Top-level entry point: the command stream, its dedicated execution thread, and the
/// deferred-release registry, owned together.
///
/// Dropping the driver drains the queue to completion and flushes the registry until empty,
/// so no command or release callback is ever abandoned.
pub struct Driver {
    cmds: Option<CommandStream>,
    releases: Arc<ReleaseQueue>,
    exec: Option<thread::JoinHandle<()>>,
}

impl Driver {
    pub fn new(config: DriverConfig) -> Self {
        let (queue, executor) = CommandQueue::new();
        let exec = thread::Builder::new()
            .name(config.thread_name)
            .spawn(move || executor.run())
            .unwrap();
        let sink = config
            .sink
            .unwrap_or_else(|| Arc::new(TracingSink));
        Self {
            cmds: Some(CommandStream::new(queue, config.debug, sink)),
            releases: Arc::new(ReleaseQueue::new()),
            exec: Some(exec),
        }
    }

    /// Queue `command` for ordered execution on the execution thread.
    pub fn enqueue(&self, name: &'static str, command: impl FnOnce() + Send + 'static) {
        self.cmds().enqueue(name, command);
    }

    /// Run `f` immediately on the calling thread.
    ///
    /// Reserved for work that needs no ordering relative to queued commands, e.g. trivial
    /// platform-default paths.
    pub fn call<R>(&self, name: &'static str, f: impl FnOnce() -> R) -> R {
        self.cmds().call(name, f)
    }

    /// Size in bytes of a single vertex element of type `ty`
    #[inline]
    pub fn element_size(&self, ty: ElementType) -> usize {
        ty.size()
    }

    /// Registry commands hand finished resources to.
    ///
    /// Clone the `Arc` into commands that need to schedule releases from the execution
    /// thread.
    #[inline]
    pub fn releases(&self) -> &Arc<ReleaseQueue> {
        &self.releases
    }

    /// Notify the owners of everything scheduled for release so far.
    ///
    /// Call once per logical frame from the submission thread.
    pub fn flush_releases(&self) -> FlushStats {
        self.releases.flush()
    }

    fn cmds(&self) -> &CommandStream {
        // Only `drop` takes the stream
        self.cmds.as_ref().unwrap()
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        // Dropping the stream drops the queue's last producer handle; the executor exits
        // once everything already queued has run.
        drop(self.cmds.take());
        if let Some(exec) = self.exec.take() {
            // A command panic is fatal; propagate it.
            exec.join().unwrap();
        }
        // Drained commands and release callbacks may themselves have scheduled releases.
        while !self.releases.flush().is_empty() {}
        tracing::debug!(target: "moraine::driver", "driver torn down");
    }
}
