//! Tools for asynchronous graphics-driver command execution
//!
//! Two logical roles share a driver: a submission role that queues commands and schedules
//! resource releases, and a single execution role that drains the queue in submission order
//! and hands finished resources back through the release registry. [`Driver`] wires the two
//! together and tears them down without abandoning work.

pub mod driver;
pub mod element;
pub mod queue;
pub mod release;
pub mod stream;

pub use driver::{Driver, DriverConfig};
pub use element::ElementType;
pub use queue::{Command, CommandQueue, Executor};
pub use release::{AcquiredImage, FlushStats, ImageHandle, ReleaseQueue, TransientBuffer};
pub use stream::{CommandStream, DebugLevel, MarkerSink, ParseDebugLevelError, TracingSink};
