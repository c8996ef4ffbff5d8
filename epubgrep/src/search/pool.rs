use parking_lot::Mutex;

/// Free-list pool of scratch buffers for the scanners.
///
/// A buffer is checked out for the duration of one entry scan and returned
/// by the guard on every exit path. Returned buffers keep their allocated
/// capacity but have their logical length reset, so nothing observable
/// leaks between files.
pub(crate) struct ScratchPool<T> {
    free: Mutex<Vec<T>>,
}

/// Starting capacity of a newly created scan buffer.
const INITIAL_BUF_CAPACITY: usize = 16 * 1024;

impl<T: Scratch> ScratchPool<T> {
    pub(crate) const fn new() -> Self {
        ScratchPool {
            free: Mutex::new(Vec::new()),
        }
    }

    /// Checks out a buffer, creating one when the free list is empty.
    pub(crate) fn acquire(&self) -> Pooled<'_, T> {
        let item = self.free.lock().pop().unwrap_or_else(T::fresh);
        Pooled { pool: self, item }
    }
}

/// Scratch state that can be emptied without releasing its allocations.
pub(crate) trait Scratch: Default {
    /// New buffer with its working capacity preallocated.
    fn fresh() -> Self;

    fn reset(&mut self);
}

/// RAII checkout of one pooled buffer.
pub(crate) struct Pooled<'a, T: Scratch> {
    pool: &'a ScratchPool<T>,
    item: T,
}

impl<T: Scratch> std::ops::Deref for Pooled<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.item
    }
}

impl<T: Scratch> std::ops::DerefMut for Pooled<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.item
    }
}

impl<T: Scratch> Drop for Pooled<'_, T> {
    fn drop(&mut self) {
        let mut item = std::mem::take(&mut self.item);
        item.reset();
        self.pool.free.lock().push(item);
    }
}

/// Working memory for the plain-text scanner.
#[derive(Default)]
pub(crate) struct ScanScratch {
    /// Raw bytes of the line currently being read.
    pub line_buf: Vec<u8>,
    /// Buffered lines for the context path.
    pub lines: Vec<String>,
}

impl Scratch for ScanScratch {
    fn fresh() -> Self {
        ScanScratch {
            line_buf: Vec::with_capacity(INITIAL_BUF_CAPACITY),
            lines: Vec::new(),
        }
    }

    fn reset(&mut self) {
        self.line_buf.clear();
        self.lines.clear();
    }
}

/// Working memory for the markup scanner.
#[derive(Default)]
pub(crate) struct TokenScratch {
    /// Parser event buffer, reused across events.
    pub event_buf: Vec<u8>,
    /// Flushed logical lines.
    pub lines: Vec<String>,
    /// Text accumulated since the last block-level flush.
    pub current: String,
}

impl Scratch for TokenScratch {
    fn fresh() -> Self {
        TokenScratch {
            event_buf: Vec::with_capacity(INITIAL_BUF_CAPACITY),
            lines: Vec::new(),
            current: String::new(),
        }
    }

    fn reset(&mut self) {
        self.event_buf.clear();
        self.lines.clear();
        self.current.clear();
    }
}

/// Process-wide pools shared by all concurrent searches.
pub(crate) static SCANNER_POOL: ScratchPool<ScanScratch> = ScratchPool::new();
pub(crate) static TOKENIZER_POOL: ScratchPool<TokenScratch> = ScratchPool::new();
