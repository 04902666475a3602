use std::{fmt, mem, sync::Mutex};

/// Raw handle to an externally owned image, e.g. one borrowed from a platform compositor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageHandle(pub u64);

/// CPU-side byte storage whose owner is notified once the execution thread is done with it.
///
/// The release callback receives the storage back and fires exactly once: on an explicit
/// [`release`](Self::release), or when the buffer is otherwise disposed of. Whatever user
/// data the owner needs travels in the callback's captures.
pub struct TransientBuffer {
    storage: Box<[u8]>,
    release: Option<Box<dyn FnOnce(Box<[u8]>) + Send>>,
}

impl TransientBuffer {
    pub fn new(
        storage: impl Into<Box<[u8]>>,
        release: impl FnOnce(Box<[u8]>) + Send + 'static,
    ) -> Self {
        Self {
            storage: storage.into(),
            release: Some(Box::new(release)),
        }
    }

    /// A buffer whose owner does not need to be notified
    pub fn unmanaged(storage: impl Into<Box<[u8]>>) -> Self {
        Self {
            storage: storage.into(),
            release: None,
        }
    }

    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.storage
    }

    #[inline]
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.storage
    }

    /// Hand the storage back to its owner now.
    pub fn release(mut self) {
        self.fire();
    }

    fn fire(&mut self) {
        if let Some(release) = self.release.take() {
            release(mem::take(&mut self.storage));
        }
    }
}

impl Drop for TransientBuffer {
    fn drop(&mut self) {
        self.fire();
    }
}

impl fmt::Debug for TransientBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransientBuffer")
            .field("len", &self.storage.len())
            .field("managed", &self.release.is_some())
            .finish()
    }
}

/// An externally sourced image borrowed for GPU use, returned to its producer via callback.
///
/// The callback fires exactly once, with the same guarantees as [`TransientBuffer`]'s.
pub struct AcquiredImage {
    handle: ImageHandle,
    release: Option<Box<dyn FnOnce(ImageHandle) + Send>>,
}

impl AcquiredImage {
    pub fn new(handle: ImageHandle, release: impl FnOnce(ImageHandle) + Send + 'static) -> Self {
        Self {
            handle,
            release: Some(Box::new(release)),
        }
    }

    #[inline]
    pub fn handle(&self) -> ImageHandle {
        self.handle
    }

    /// Return the image to its producer now.
    pub fn release(mut self) {
        self.fire();
    }

    fn fire(&mut self) {
        if let Some(release) = self.release.take() {
            release(self.handle);
        }
    }
}

impl Drop for AcquiredImage {
    fn drop(&mut self) {
        self.fire();
    }
}

impl fmt::Debug for AcquiredImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AcquiredImage").field(&self.handle).finish()
    }
}

/// Numbers of resources released by a [`ReleaseQueue::flush`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
    pub buffers: usize,
    pub images: usize,
}

impl FlushStats {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffers == 0 && self.images == 0
    }
}

/// Holding area for resources the execution thread has finished with, until the submission
/// thread is ready to notify their owners.
///
/// Scheduling is cheap and callable from any thread; the typical producer is the execution
/// thread, roughly zero or one scheduling per frame. [`flush`](Self::flush) is the matching
/// consumer, called once per frame (or on demand) from the submission thread.
#[derive(Default)]
pub struct ReleaseQueue {
    pending: Mutex<Pending>,
}

#[derive(Default)]
struct Pending {
    buffers: Vec<TransientBuffer>,
    images: Vec<AcquiredImage>,
}

impl ReleaseQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park `buffer` until the next [`flush`](Self::flush).
    pub fn schedule_buffer_release(&self, buffer: TransientBuffer) {
        self.pending.lock().unwrap().buffers.push(buffer);
    }

    /// Park `image` until the next [`flush`](Self::flush).
    pub fn schedule_image_release(&self, image: AcquiredImage) {
        self.pending.lock().unwrap().images.push(image);
    }

    /// Numbers of buffers and images currently awaiting release
    pub fn pending(&self) -> (usize, usize) {
        let pending = self.pending.lock().unwrap();
        (pending.buffers.len(), pending.images.len())
    }

    /// Invoke the release callback of everything scheduled so far, in scheduling order.
    ///
    /// The lock is held only for the list swap; no callback ever runs under it. A callback may
    /// therefore schedule further releases on this queue without deadlocking; they land in
    /// the emptied live lists and are picked up by the next flush, not this one. Callbacks of
    /// arbitrary cost never block concurrent scheduling for longer than the swap.
    pub fn flush(&self) -> FlushStats {
        let (buffers, images) = {
            let mut pending = self.pending.lock().unwrap();
            (
                mem::take(&mut pending.buffers),
                mem::take(&mut pending.images),
            )
        };
        // Lock released above; only now is it safe to touch the elements.
        let stats = FlushStats {
            buffers: buffers.len(),
            images: images.len(),
        };
        for image in images {
            image.release();
        }
        for buffer in buffers {
            buffer.release();
        }
        if !stats.is_empty() {
            tracing::trace!(
                target: "moraine::release",
                buffers = stats.buffers,
                images = stats.images,
                "flushed",
            );
        }
        stats
    }
}
