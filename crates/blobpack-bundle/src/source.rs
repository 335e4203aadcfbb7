//! Lazy byte sources
//!
//! A [`SourceFactory`] is called at most once, when the blob stream reaches
//! its resource, and yields a fresh [`ByteSource`] for that resource's bytes.

use std::future::Future;
use std::io::{self, Cursor};
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use tokio::fs::File;
use tokio::io::{AsyncRead, ReadBuf};

/// Single-use reader over one resource's bytes
pub type ByteSource = Pin<Box<dyn AsyncRead + Send>>;

/// Deferred constructor for a [`ByteSource`]
pub type SourceFactory = Box<dyn FnOnce() -> ByteSource + Send>;

/// Factory replaying in-memory content
pub fn memory_factory(content: Vec<u8>) -> SourceFactory {
    Box::new(move || Box::pin(Cursor::new(content)) as ByteSource)
}

/// Factory opening `path` when first read
pub fn file_factory(path: PathBuf) -> SourceFactory {
    Box::new(move || Box::pin(LazyFile::new(path)) as ByteSource)
}

type OpenFuture = Pin<Box<dyn Future<Output = io::Result<File>> + Send>>;

enum LazyState {
    Pending(PathBuf),
    Opening(OpenFuture),
    Open(File),
    Failed,
}

/// Reader that does not open its file until the first poll.
pub struct LazyFile {
    state: LazyState,
}

impl LazyFile {
    /// Create a reader for `path` without touching the file system
    pub fn new(path: PathBuf) -> Self {
        Self {
            state: LazyState::Pending(path),
        }
    }
}

impl AsyncRead for LazyFile {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            match &mut this.state {
                LazyState::Pending(path) => {
                    let path = path.clone();
                    let open = async move {
                        File::open(&path).await.map_err(|e| {
                            io::Error::new(e.kind(), format!("{}: {}", path.display(), e))
                        })
                    };
                    this.state = LazyState::Opening(Box::pin(open));
                },
                LazyState::Opening(open) => match ready!(open.as_mut().poll(cx)) {
                    Ok(file) => this.state = LazyState::Open(file),
                    Err(e) => {
                        this.state = LazyState::Failed;
                        return Poll::Ready(Err(e));
                    },
                },
                LazyState::Open(file) => return Pin::new(file).poll_read(cx, buf),
                LazyState::Failed => {
                    return Poll::Ready(Err(io::Error::new(
                        io::ErrorKind::Other,
                        "source already failed to open",
                    )))
                },
            }
        }
    }
}
