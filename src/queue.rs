use std::{
    collections::VecDeque,
    mem,
    sync::{Arc, Condvar, Mutex},
};

/// A unit of work queued for ordered execution on the execution thread.
///
/// Commands own their captured operands exclusively until they run, then discard them.
pub type Command = Box<dyn FnOnce() + Send>;

/// Producer handle for submitting commands to the execution thread.
///
/// Cheap to clone; all clones feed the same ordered stream. Submissions from a single handle
/// are never reordered relative to each other.
pub struct CommandQueue {
    shared: Arc<Shared>,
}

impl CommandQueue {
    /// Construct a queue, returning the producer handle and the sole consumer.
    pub fn new() -> (Self, Executor) {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                pending: VecDeque::new(),
                producers: 1,
                executor_alive: true,
            }),
            ready: Condvar::new(),
        });
        (
            Self {
                shared: shared.clone(),
            },
            Executor { shared },
        )
    }

    /// Append `command` to the stream, to be run after everything submitted before it.
    ///
    /// May block briefly on the queue's internal lock, never on command execution. Returns
    /// false if the [`Executor`] has already been dropped, in which case `command` is
    /// discarded unexecuted.
    pub fn submit(&self, command: impl FnOnce() + Send + 'static) -> bool {
        let mut state = self.shared.state.lock().unwrap();
        if !state.executor_alive {
            return false;
        }
        state.pending.push_back(Box::new(command));
        drop(state);
        self.shared.ready.notify_one();
        true
    }
}

impl Clone for CommandQueue {
    fn clone(&self) -> Self {
        self.shared.state.lock().unwrap().producers += 1;
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl Drop for CommandQueue {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock().unwrap();
        state.producers -= 1;
        let last = state.producers == 0;
        drop(state);
        if last {
            // Wake the executor so `run` can observe shutdown
            self.shared.ready.notify_one();
        }
    }
}

/// Exclusive consumer of a [`CommandQueue`].
///
/// Not `Clone`: exactly one execution role may drain the stream, and everything downstream
/// (marker bracketing, release ordering) depends on that.
pub struct Executor {
    shared: Arc<Shared>,
}

impl Executor {
    /// Run every command currently queued, in submission order, and return how many ran.
    ///
    /// The pending list is swapped out whole under the lock and executed only after the lock
    /// is released, so producers are never blocked behind a running command. A command that
    /// panics is a programming error; the panic unwinds through this call and the queue must
    /// not be used afterwards.
    pub fn drain(&mut self) -> usize {
        let batch = {
            let mut state = self.shared.state.lock().unwrap();
            mem::take(&mut state.pending)
        };
        let count = batch.len();
        for command in batch {
            command();
        }
        if count != 0 {
            tracing::trace!(target: "moraine::queue", count, "drained");
        }
        count
    }

    /// Block until work is available, then [`drain`](Self::drain).
    ///
    /// Returns false once the queue is finished: every producer handle has been dropped and
    /// nothing remains pending.
    pub fn park_drain(&mut self) -> bool {
        {
            let mut state = self.shared.state.lock().unwrap();
            while state.pending.is_empty() && state.producers != 0 {
                state = self.shared.ready.wait(state).unwrap();
            }
            if state.pending.is_empty() {
                return false;
            }
        }
        self.drain();
        true
    }

    /// Drain until every producer handle has been dropped and the queue is empty.
    ///
    /// Convenient for use on a dedicated execution thread.
    pub fn run(mut self) {
        while self.park_drain() {}
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        self.shared.state.lock().unwrap().executor_alive = false;
    }
}

struct Shared {
    state: Mutex<State>,
    ready: Condvar,
}

struct State {
    pending: VecDeque<Command>,
    /// Number of live `CommandQueue` handles
    producers: usize,
    executor_alive: bool,
}
