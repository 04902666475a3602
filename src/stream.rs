use std::{str::FromStr, sync::Arc};

use crate::queue::CommandQueue;

/// How much instrumentation a [`CommandStream`] emits.
///
/// Read once at construction; there is no compile-time switch. [`Off`](Self::Off) costs a
/// single branch per call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DebugLevel {
    #[default]
    Off,
    /// Log each operation name as it is submitted
    Log,
    /// Emit begin/end markers bracketing each operation's execution window
    Markers,
}

impl DebugLevel {
    /// Environment variable consulted by [`from_env`](Self::from_env)
    pub const ENV: &'static str = "MORAINE_DEBUG";

    /// Read the level from [`ENV`](Self::ENV); unset means [`Off`](Self::Off).
    pub fn from_env() -> Result<Self, ParseDebugLevelError> {
        match std::env::var(Self::ENV) {
            Ok(value) => value.parse(),
            Err(_) => Ok(Self::Off),
        }
    }
}

impl FromStr for DebugLevel {
    type Err = ParseDebugLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "log" => Ok(Self::Log),
            "markers" => Ok(Self::Markers),
            _ => Err(ParseDebugLevelError(s.to_owned())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown debug level {0:?}, expected \"off\", \"log\" or \"markers\"")]
pub struct ParseDebugLevelError(String);

/// Receiver for begin/end instrumentation markers.
///
/// Markers arrive on whichever thread performs the instrumented work: the calling thread for
/// synchronous operations, the execution thread for queued ones.
pub trait MarkerSink: Send + Sync {
    fn begin(&self, name: &'static str);
    fn end(&self, name: &'static str);
}

/// Sink forwarding markers to `tracing` events
#[derive(Debug, Default)]
pub struct TracingSink;

impl MarkerSink for TracingSink {
    fn begin(&self, name: &'static str) {
        tracing::trace!(target: "moraine::markers", name, "begin");
    }

    fn end(&self, name: &'static str) {
        tracing::trace!(target: "moraine::markers", name, "end");
    }
}

/// Per-call-site façade over a [`CommandQueue`] that brackets operations with markers.
///
/// For queued commands the markers are themselves enqueued immediately around the command, so
/// that the execution thread observes them bracketing the command's actual run rather than
/// its much earlier submission. Marker adjacency on the queue assumes a single submission
/// role, per the driver's threading model.
pub struct CommandStream {
    queue: CommandQueue,
    level: DebugLevel,
    sink: Arc<dyn MarkerSink>,
}

impl CommandStream {
    pub fn new(queue: CommandQueue, level: DebugLevel, sink: Arc<dyn MarkerSink>) -> Self {
        Self { queue, level, sink }
    }

    /// Queue `command` for asynchronous, ordered execution.
    ///
    /// Returns false if the executor is gone, like [`CommandQueue::submit`].
    pub fn enqueue(&self, name: &'static str, command: impl FnOnce() + Send + 'static) -> bool {
        match self.level {
            DebugLevel::Off => self.queue.submit(command),
            DebugLevel::Log => {
                tracing::debug!(target: "moraine::commands", name, "enqueue");
                self.queue.submit(command)
            }
            DebugLevel::Markers => {
                // Bracket the submission window inline and the execution window on the queue
                self.sink.begin(name);
                let sink = self.sink.clone();
                self.queue.submit(move || sink.begin(name));
                let submitted = self.queue.submit(command);
                let sink = self.sink.clone();
                self.queue.submit(move || sink.end(name));
                self.sink.end(name);
                submitted
            }
        }
    }

    /// Run `f` immediately on the calling thread, markers and all.
    ///
    /// Never touches the queue, and so provides no ordering relative to queued commands.
    pub fn call<R>(&self, name: &'static str, f: impl FnOnce() -> R) -> R {
        match self.level {
            DebugLevel::Off => f(),
            DebugLevel::Log => {
                tracing::debug!(target: "moraine::commands", name, "call");
                f()
            }
            DebugLevel::Markers => {
                self.sink.begin(name);
                let result = f();
                self.sink.end(name);
                result
            }
        }
    }

    #[inline]
    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    #[inline]
    pub fn level(&self) -> DebugLevel {
        self.level
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<(&'static str, &'static str)>>,
    }

    impl Recorder {
        fn record(&self, kind: &'static str, name: &'static str) {
            self.events.lock().unwrap().push((kind, name));
        }

        fn take(&self) -> Vec<(&'static str, &'static str)> {
            std::mem::take(&mut *self.events.lock().unwrap())
        }
    }

    impl MarkerSink for Recorder {
        fn begin(&self, name: &'static str) {
            self.record("begin", name);
        }

        fn end(&self, name: &'static str) {
            self.record("end", name);
        }
    }

    fn stream(level: DebugLevel) -> (CommandStream, crate::queue::Executor, Arc<Recorder>) {
        let (queue, exec) = CommandQueue::new();
        let recorder = Arc::new(Recorder::default());
        (
            CommandStream::new(queue, level, recorder.clone()),
            exec,
            recorder,
        )
    }

    #[test]
    fn parse() {
        assert_eq!("off".parse::<DebugLevel>().unwrap(), DebugLevel::Off);
        assert_eq!("Log".parse::<DebugLevel>().unwrap(), DebugLevel::Log);
        assert_eq!(
            "MARKERS".parse::<DebugLevel>().unwrap(),
            DebugLevel::Markers
        );
        assert!("verbose".parse::<DebugLevel>().is_err());
    }

    #[test]
    fn off_touches_neither_sink_nor_log() {
        let (stream, mut exec, recorder) = stream(DebugLevel::Off);
        assert!(stream.enqueue("op", || {}));
        stream.call("op", || {});
        assert_eq!(exec.drain(), 1);
        assert!(recorder.take().is_empty());
    }

    #[test]
    fn log_level_emits_no_markers() {
        let (stream, mut exec, recorder) = stream(DebugLevel::Log);
        assert!(stream.enqueue("op", || {}));
        assert_eq!(exec.drain(), 1);
        assert!(recorder.take().is_empty());
    }

    #[test]
    fn log_level_smoke() {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_test_writer()
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            let (stream, mut exec, _recorder) = stream(DebugLevel::Log);
            stream.enqueue("clear", || {});
            stream.call("present", || {});
            exec.drain();
        });
    }

    #[test]
    fn synchronous_markers_skip_the_queue() {
        let (stream, mut exec, recorder) = stream(DebugLevel::Markers);
        let out = stream.call("blit", || 7);
        assert_eq!(out, 7);
        assert_eq!(recorder.take(), vec![("begin", "blit"), ("end", "blit")]);
        // No marker commands were enqueued
        assert_eq!(exec.drain(), 0);
    }

    #[test]
    fn asynchronous_markers_bracket_execution() {
        let (stream, mut exec, recorder) = stream(DebugLevel::Markers);
        let run_recorder = recorder.clone();
        stream.enqueue("upload", move || run_recorder.record("run", "upload"));
        // Submission-side bracket is already complete before the command has run
        assert_eq!(
            recorder.take(),
            vec![("begin", "upload"), ("end", "upload")]
        );
        assert_eq!(exec.drain(), 3);
        // Execution-side markers bracket the command's actual run
        assert_eq!(
            recorder.take(),
            vec![
                ("begin", "upload"),
                ("run", "upload"),
                ("end", "upload"),
            ]
        );
    }
}
