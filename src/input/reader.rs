//! Byte sources underlying an [`Input`].
//!
//! [`Input`]: super::Input

use super::ChildContainer;
use bytes::{Bytes, BytesMut};
use std::{
    fmt::{Debug, Error as FormatError, Formatter},
    io::{Cursor, Result as IoResult},
};
use tokio::{
    fs::File,
    io::{AsyncRead, AsyncReadExt},
};

/// Usable data/byte sources for an audio stream.
///
/// Readers are consumed front to back exactly once. Users may define their own
/// data sources using [`Extension`].
///
/// [`Extension`]: Reader::Extension
pub enum Reader {
    /// An in-memory buffer.
    Memory(Cursor<Bytes>),
    /// A file on the local filesystem.
    File(File),
    /// The standard output of a child process, such as `ffmpeg`.
    Pipe(ChildContainer),
    /// Any other asynchronous byte source.
    Extension(Box<dyn AsyncRead + Send + Unpin>),
}

impl Reader {
    /// Reads at most `max_bytes`, returning `None` once the stream has ended.
    pub async fn read(&mut self, max_bytes: usize) -> IoResult<Option<Bytes>> {
        match self {
            Reader::Memory(cursor) => {
                let data = cursor.get_ref();
                let start = (cursor.position() as usize).min(data.len());
                let end = start.saturating_add(max_bytes).min(data.len());
                let out = data.slice(start..end);
                cursor.set_position(end as u64);

                Ok((!out.is_empty()).then_some(out))
            },
            Reader::File(f) => fill(f, max_bytes).await,
            Reader::Pipe(p) => fill(p.stdout_mut(), max_bytes).await,
            Reader::Extension(e) => fill(e, max_bytes).await,
        }
    }
}

async fn fill<R>(src: &mut R, max_bytes: usize) -> IoResult<Option<Bytes>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buf = BytesMut::zeroed(max_bytes);
    let len = src.read(&mut buf[..]).await?;

    if len == 0 {
        Ok(None)
    } else {
        buf.truncate(len);
        Ok(Some(buf.freeze()))
    }
}

impl Debug for Reader {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FormatError> {
        use Reader::*;
        let field = match self {
            Memory(a) => format!("{:?}", a.get_ref().len()),
            File(a) => format!("{:?}", a),
            Pipe(a) => format!("{:?}", a),
            Extension(_) => "Extension".to_string(),
        };
        f.debug_tuple("Reader").field(&field).finish()
    }
}

impl From<Bytes> for Reader {
    fn from(bytes: Bytes) -> Self {
        Reader::Memory(Cursor::new(bytes))
    }
}

impl From<Vec<u8>> for Reader {
    fn from(bytes: Vec<u8>) -> Self {
        Bytes::from(bytes).into()
    }
}
