//! Ordered concatenation of lazy sources
//!
//! [`StreamAssembler`] collects one factory per registered resource;
//! [`BlobStream`] drains them back-to-back as a single [`AsyncRead`].

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use blobpack_core::error::BlobpackError;
use tokio::io::{AsyncRead, ReadBuf};
use tracing::trace;

use crate::source::{ByteSource, SourceFactory};

struct Segment {
    key: String,
    length: u64,
    factory: SourceFactory,
}

/// Ordered list of pending resource sources
#[derive(Default)]
pub struct StreamAssembler {
    segments: VecDeque<Segment>,
}

impl StreamAssembler {
    /// Create an empty assembler
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the source for `key`, which must yield exactly `length` bytes
    pub fn append<K: Into<String>>(&mut self, key: K, length: u64, factory: SourceFactory) {
        self.segments.push_back(Segment {
            key: key.into(),
            length,
            factory,
        });
    }

    /// Number of queued sources
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Check if nothing has been queued
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Sum of the promised lengths of every queued source
    pub fn total_length(&self) -> u64 {
        self.segments.iter().map(|segment| segment.length).sum()
    }

    /// Turn the queued sources into a single-pass byte stream
    pub fn drain(self) -> BlobStream {
        BlobStream {
            pending: self.segments,
            current: None,
            failed: None,
        }
    }
}

impl std::fmt::Debug for StreamAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamAssembler")
            .field("segments", &self.segments.len())
            .field("total_length", &self.total_length())
            .finish()
    }
}

struct ActiveSegment {
    key: String,
    length: u64,
    remaining: u64,
    source: ByteSource,
}

impl ActiveSegment {
    fn open(segment: Segment) -> Self {
        trace!("Opening source for {} ({} bytes)", segment.key, segment.length);
        let source = (segment.factory)();
        Self {
            key: segment.key,
            length: segment.length,
            remaining: segment.length,
            source,
        }
    }

    fn mismatch(&self, actual: u64, kind: io::ErrorKind) -> io::Error {
        io::Error::new(
            kind,
            BlobpackError::LengthMismatch {
                key: self.key.clone(),
                expected: self.length,
                actual,
            },
        )
    }
}

/// Concatenated blob bytes, produced on demand.
///
/// Each source is opened only once the previous one is exhausted and the
/// reader asks for more. A source yielding fewer or more bytes than were
/// registered for it fails the read, and every read after a failure fails
/// too.
pub struct BlobStream {
    pending: VecDeque<Segment>,
    current: Option<ActiveSegment>,
    failed: Option<String>,
}

impl BlobStream {
    /// Sources not yet opened
    pub fn remaining_sources(&self) -> usize {
        self.pending.len()
    }
}

impl BlobStream {
    fn poll_segments(&mut self, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        loop {
            let active = match self.current {
                Some(ref mut active) => active,
                None => {
                    let Some(segment) = self.pending.pop_front() else {
                        return Poll::Ready(Ok(()));
                    };
                    self.current.insert(ActiveSegment::open(segment))
                },
            };

            if active.remaining == 0 {
                // the source must be at EOF once its promised length is consumed
                let mut extra = [0u8; 1];
                let mut extra_buf = ReadBuf::new(&mut extra);
                ready!(active.source.as_mut().poll_read(cx, &mut extra_buf))?;
                if !extra_buf.filled().is_empty() {
                    let actual = active.length + 1;
                    return Poll::Ready(Err(active.mismatch(actual, io::ErrorKind::InvalidData)));
                }
                self.current = None;
                continue;
            }

            let limit = usize::try_from(active.remaining)
                .unwrap_or(usize::MAX)
                .min(buf.remaining());
            let dst = buf.initialize_unfilled_to(limit);
            let mut limited = ReadBuf::new(dst);
            ready!(active.source.as_mut().poll_read(cx, &mut limited))?;
            let read = limited.filled().len();

            if read == 0 {
                let actual = active.length - active.remaining;
                return Poll::Ready(Err(active.mismatch(actual, io::ErrorKind::UnexpectedEof)));
            }

            active.remaining -= read as u64;
            buf.advance(read);
            return Poll::Ready(Ok(()));
        }
    }
}

impl AsyncRead for BlobStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if let Some(reason) = &this.failed {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::Other,
                format!("blob stream already failed: {}", reason),
            )));
        }
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        let result = ready!(this.poll_segments(cx, buf));
        if let Err(err) = &result {
            this.failed = Some(err.to_string());
            this.current = None;
            this.pending.clear();
        }
        Poll::Ready(result)
    }
}
