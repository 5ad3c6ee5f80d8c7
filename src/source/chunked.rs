//! Chunked reading shared by the streaming accessors
//!
//! A [`ChunkScanner`] turns arbitrary byte chunks into completed items while
//! carrying partial state across chunk boundaries. [`ChunkedStream`] drives a
//! scanner from any reader and yields items lazily.

use std::collections::VecDeque;
use std::io::{self, Read};

/// Incremental scanner over a byte stream.
pub trait ChunkScanner {
    /// Consume one chunk, pushing every item it completes onto `out`.
    fn feed(&mut self, chunk: &[u8], out: &mut VecDeque<String>);

    /// Flush whatever is still open at end of input.
    fn finish(&mut self, out: &mut VecDeque<String>);
}

/// Lazy iterator feeding a reader into a scanner one chunk at a time.
///
/// The reader is dropped as soon as input is exhausted or a read fails, so
/// the underlying handle is released on every exit path, including early
/// drop of the iterator itself.
pub struct ChunkedStream<R, S> {
    reader: Option<R>,
    scanner: S,
    pending: VecDeque<String>,
    buf: Vec<u8>,
}

impl<R: Read, S: ChunkScanner> ChunkedStream<R, S> {
    pub fn new(reader: R, scanner: S, chunk_size: usize) -> Self {
        Self {
            reader: Some(reader),
            scanner,
            pending: VecDeque::new(),
            buf: vec![0; chunk_size.max(1)],
        }
    }

    /// Whether the reader has been released.
    #[cfg(test)]
    pub fn is_exhausted(&self) -> bool {
        self.reader.is_none()
    }
}

impl<R: Read, S: ChunkScanner> Iterator for ChunkedStream<R, S> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.pending.pop_front() {
                return Some(Ok(item));
            }

            let reader = self.reader.as_mut()?;
            match reader.read(&mut self.buf) {
                Ok(0) => {
                    self.reader = None;
                    self.scanner.finish(&mut self.pending);
                }
                Ok(n) => self.scanner.feed(&self.buf[..n], &mut self.pending),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.reader = None;
                    self.pending.clear();
                    return Some(Err(e));
                }
            }
        }
    }
}

/// Run a scanner over a single in-memory buffer.
pub fn scan_all<S: ChunkScanner>(mut scanner: S, bytes: &[u8]) -> Vec<String> {
    let mut out = VecDeque::new();
    scanner.feed(bytes, &mut out);
    scanner.finish(&mut out);
    out.into()
}

#[cfg(test)]
pub(crate) mod testing {
    //! Readers used to exercise chunk boundaries and handle release.

    use std::io::{self, Read};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    /// Serves `data` in chunks of the given sizes (cycling), never more
    /// than the caller's buffer.
    pub struct SplitReader {
        data: Vec<u8>,
        pos: usize,
        sizes: Vec<usize>,
        turn: usize,
    }

    impl SplitReader {
        pub fn new(data: &[u8], sizes: &[usize]) -> Self {
            let sizes = if sizes.is_empty() {
                vec![1]
            } else {
                sizes.iter().map(|s| (*s).max(1)).collect()
            };
            Self {
                data: data.to_vec(),
                pos: 0,
                sizes,
                turn: 0,
            }
        }
    }

    impl Read for SplitReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.pos >= self.data.len() {
                return Ok(0);
            }
            let want = self.sizes[self.turn % self.sizes.len()];
            self.turn += 1;
            let n = want.min(buf.len()).min(self.data.len() - self.pos);
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    /// Reader that flips a flag when dropped.
    pub struct TrackedReader<R> {
        inner: R,
        released: Arc<AtomicBool>,
    }

    impl<R> TrackedReader<R> {
        pub fn new(inner: R) -> (Self, Arc<AtomicBool>) {
            let released = Arc::new(AtomicBool::new(false));
            (
                Self {
                    inner,
                    released: released.clone(),
                },
                released,
            )
        }
    }

    impl<R: Read> Read for TrackedReader<R> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.inner.read(buf)
        }
    }

    impl<R> Drop for TrackedReader<R> {
        fn drop(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    /// Reader that fails after serving its prefix.
    pub struct FailingReader {
        pub prefix: Vec<u8>,
        pub served: bool,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if !self.served {
                self.served = true;
                let n = self.prefix.len().min(buf.len());
                buf[..n].copy_from_slice(&self.prefix[..n]);
                return Ok(n);
            }
            Err(io::Error::new(io::ErrorKind::Other, "disk went away"))
        }
    }
}
