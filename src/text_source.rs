//! Uniform text sources
//!
//! [`TextSource`] lets a transformation read its input the same way whether the
//! caller handed it a string or an open, seekable stream. The handle is scoped:
//! when it is dropped (normal return, `?`, or a panic unwinding through it) a
//! wrapped stream is seeked back to the position it had when the handle was
//! opened. A string input is copied into a private buffer and never touched.
//!
//! Output produced by the transformation is staged in the handle and can be
//! retrieved with [`TextSource::output`], [`TextSource::into_output`] or
//! [`TextSource::close`]. Anything not retrieved is discarded with the handle.
//!
//! ```rust
//! use std::io::{Cursor, Seek, SeekFrom};
//! use bpc_utils::text_source::TextSource;
//!
//! let mut stream = Cursor::new(b"print('hi')\n".to_vec());
//! stream.seek(SeekFrom::Start(5)).unwrap();
//!
//! let upper = TextSource::with(&mut stream, |source| {
//!     source.snapshot().map(|text| text.to_uppercase())
//! })
//! .unwrap()
//! .unwrap();
//!
//! assert_eq!(upper, "PRINT('HI')\n");
//! assert_eq!(stream.position(), 5);
//! ```

use crate::error::SourceError;
use std::fmt;
use std::io::{self, Cursor, Read, Seek, SeekFrom};

/// Any readable, seekable stream.
pub trait SeekRead: Read + Seek {}

impl<T: Read + Seek + ?Sized> SeekRead for T {}

/// The input kinds accepted by [`TextSource::open`].
pub enum SourceInput<'a> {
    Text(&'a str),
    Stream(&'a mut (dyn SeekRead + 'a)),
}

impl<'a> From<&'a str> for SourceInput<'a> {
    fn from(text: &'a str) -> Self {
        SourceInput::Text(text)
    }
}

impl<'a> From<&'a String> for SourceInput<'a> {
    fn from(text: &'a String) -> Self {
        SourceInput::Text(text.as_str())
    }
}

impl<'a, S: Read + Seek + 'a> From<&'a mut S> for SourceInput<'a> {
    fn from(stream: &'a mut S) -> Self {
        SourceInput::Stream(stream)
    }
}

impl fmt::Debug for SourceInput<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceInput::Text(text) => f.debug_tuple("Text").field(&text.len()).finish(),
            SourceInput::Stream(_) => f.write_str("Stream"),
        }
    }
}

enum Inner<'a> {
    Buffer(Cursor<Vec<u8>>),
    Stream {
        stream: &'a mut (dyn SeekRead + 'a),
        origin: u64,
        restored: bool,
    },
}

/// Scoped handle over a string or a seekable stream.
pub struct TextSource<'a> {
    inner: Inner<'a>,
    output: String,
}

impl<'a> TextSource<'a> {
    /// Wrap `input`, recording a stream's position and rewinding it to the start.
    pub fn open(input: impl Into<SourceInput<'a>>) -> Result<Self, SourceError> {
        let inner = match input.into() {
            SourceInput::Text(text) => Inner::Buffer(Cursor::new(text.as_bytes().to_vec())),
            SourceInput::Stream(stream) => {
                let origin = stream.stream_position().map_err(|e| {
                    SourceError::UnsupportedSourceKind(format!("stream is not seekable: {e}"))
                })?;
                stream.seek(SeekFrom::Start(0)).map_err(|e| {
                    SourceError::UnsupportedSourceKind(format!("stream cannot be rewound: {e}"))
                })?;
                Inner::Stream {
                    stream,
                    origin,
                    restored: false,
                }
            }
        };

        Ok(Self {
            inner,
            output: String::new(),
        })
    }

    /// Run `f` inside a scoped handle and return its result.
    ///
    /// The wrapped stream is restored before this returns, and also when `f` panics.
    pub fn with<T, F>(input: impl Into<SourceInput<'a>>, f: F) -> Result<T, SourceError>
    where
        F: FnOnce(&mut TextSource<'a>) -> T,
    {
        let mut source = Self::open(input)?;
        Ok(f(&mut source))
    }

    /// Whether the handle wraps a caller-owned stream.
    pub fn is_stream(&self) -> bool {
        matches!(self.inner, Inner::Stream { .. })
    }

    /// Position the wrapped stream had at `open` time.
    pub fn origin(&self) -> Option<u64> {
        match self.inner {
            Inner::Buffer(_) => None,
            Inner::Stream { origin, .. } => Some(origin),
        }
    }

    /// Full textual content, read from the start.
    ///
    /// The read cursor used by the [`Read`] impl is left where it was.
    pub fn snapshot(&mut self) -> Result<String, SourceError> {
        Ok(String::from_utf8(self.snapshot_bytes()?)?)
    }

    /// Raw content from the start, for callers that decode it themselves.
    pub fn snapshot_bytes(&mut self) -> Result<Vec<u8>, SourceError> {
        match &mut self.inner {
            Inner::Buffer(buffer) => Ok(buffer.get_ref().clone()),
            Inner::Stream { stream, .. } => {
                let cursor = stream.stream_position()?;
                stream.seek(SeekFrom::Start(0))?;
                let mut bytes = Vec::new();
                let read = stream.read_to_end(&mut bytes);
                stream.seek(SeekFrom::Start(cursor))?;
                read?;
                Ok(bytes)
            }
        }
    }

    /// Stage transformed output.
    pub fn write(&mut self, text: &str) {
        self.output.push_str(text);
    }

    /// Output staged so far.
    pub fn output(&self) -> &str {
        &self.output
    }

    /// Take the staged output, releasing the handle.
    ///
    /// The stream is restored by the drop; a failure to restore is only logged.
    /// Use [`close`](Self::close) to observe it.
    pub fn into_output(mut self) -> String {
        std::mem::take(&mut self.output)
    }

    /// Restore the wrapped stream and return the staged output.
    pub fn close(mut self) -> Result<String, SourceError> {
        self.restore()?;
        Ok(std::mem::take(&mut self.output))
    }

    fn restore(&mut self) -> io::Result<()> {
        if let Inner::Stream {
            stream,
            origin,
            restored,
        } = &mut self.inner
            && !*restored
        {
            *restored = true;
            stream.seek(SeekFrom::Start(*origin))?;
        }
        Ok(())
    }
}

impl Read for TextSource<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.inner {
            Inner::Buffer(buffer) => buffer.read(buf),
            Inner::Stream { stream, .. } => stream.read(buf),
        }
    }
}

impl fmt::Write for TextSource<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write(s);
        Ok(())
    }
}

impl Drop for TextSource<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.restore() {
            tracing::warn!("failed to restore stream position: {}", e);
        }
    }
}

impl fmt::Debug for TextSource<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextSource")
            .field("stream", &self.is_stream())
            .field("origin", &self.origin())
            .field("staged", &self.output.len())
            .finish()
    }
}
