//! Frame transport: every envelope is a MessagePack body behind a u32
//! big-endian length. A [`Link`] is the channel pair either end works
//! against, whether it is backed by a byte stream or wired in process.

use std::io;

use thiserror::Error as ThisError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::protocol::Envelope;

pub const DEFAULT_MAX_FRAME: usize = 8 * 1024 * 1024;

#[derive(Debug, ThisError)]
pub enum TransportError {
    #[error("transport i/o: {0}")]
    Io(#[from] io::Error),
    #[error("frame of {size} bytes exceeds the {max} byte limit")]
    TooLarge { size: usize, max: usize },
    #[error("cannot encode frame: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("cannot decode frame: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

// ─── Frames ───────────────────────────────────────────────────────────────────

/// Read one frame. `None` on a clean end of stream between frames.
pub async fn read_frame<R>(reader: &mut R, max: usize) -> Result<Option<Envelope>, TransportError>
where
    R: AsyncRead + Unpin,
{
    let size = match reader.read_u32().await {
        Ok(n) => n as usize,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if size > max {
        return Err(TransportError::TooLarge { size, max });
    }
    let mut body = vec![0; size];
    reader.read_exact(&mut body).await?;
    Ok(Some(rmp_serde::from_slice(&body)?))
}

pub async fn write_frame<W>(writer: &mut W, envelope: &Envelope, max: usize) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    let body = rmp_serde::to_vec_named(envelope)?;
    if body.len() > max {
        return Err(TransportError::TooLarge { size: body.len(), max });
    }
    writer.write_u32(body.len() as u32).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

// ─── Links ────────────────────────────────────────────────────────────────────

/// One end of a connection: envelopes out on `tx`, envelopes in on `rx`.
/// `rx` yields `None` once the other end is gone.
pub struct Link {
    pub tx: mpsc::UnboundedSender<Envelope>,
    pub rx: mpsc::UnboundedReceiver<Envelope>,
}

/// Two ends wired to each other in process.
pub fn pair() -> (Link, Link) {
    let (a_tx, b_rx) = mpsc::unbounded_channel();
    let (b_tx, a_rx) = mpsc::unbounded_channel();
    (Link { tx: a_tx, rx: a_rx }, Link { tx: b_tx, rx: b_rx })
}

/// Pump frames between a byte stream and a [`Link`]. A broken or oversized
/// frame ends the inbound side; the peer sees that as a closed link.
pub fn framed<R, W>(mut reader: R, mut writer: W, max: usize) -> Link
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Envelope>();

    tokio::spawn(async move {
        loop {
            match read_frame(&mut reader, max).await {
                Ok(Some(envelope)) => {
                    if in_tx.send(envelope).is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    tracing::debug!("peer closed the stream");
                    break;
                }
                Err(e) => {
                    tracing::error!(error = %e, "inbound frame rejected, closing link");
                    break;
                }
            }
        }
    });

    tokio::spawn(async move {
        while let Some(envelope) = out_rx.recv().await {
            match write_frame(&mut writer, &envelope, max).await {
                Ok(()) => {}
                Err(TransportError::Io(e)) => {
                    tracing::error!(error = %e, "outbound stream failed");
                    break;
                }
                // One bad frame does not poison the stream.
                Err(e) => tracing::error!(id = envelope.id(), error = %e, "outbound frame dropped"),
            }
        }
    });

    Link { tx: out_tx, rx: in_rx }
}

/// The worker's end of the process pipe.
pub fn stdio(max: usize) -> Link {
    framed(tokio::io::stdin(), tokio::io::stdout(), max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{CompileRequest, HostReply, Request};

    fn compile(id: u64) -> Envelope {
        Envelope::Request { id, request: Request::Compile(CompileRequest { code: "reply 1".into() }) }
    }

    #[tokio::test]
    async fn frames_are_length_prefixed() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &compile(1), DEFAULT_MAX_FRAME).await.unwrap();
        let size = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        assert_eq!(size, buf.len() - 4);

        let mut reader = buf.as_slice();
        assert_eq!(read_frame(&mut reader, DEFAULT_MAX_FRAME).await.unwrap(), Some(compile(1)));
        assert_eq!(read_frame(&mut reader, DEFAULT_MAX_FRAME).await.unwrap(), None);
    }

    #[tokio::test]
    async fn oversized_frames_are_refused() {
        let mut buf = Vec::new();
        let e = write_frame(&mut buf, &compile(1), 4).await.unwrap_err();
        assert!(matches!(e, TransportError::TooLarge { max: 4, .. }));
        assert!(buf.is_empty());

        let mut reader: &[u8] = &[0, 0, 1, 0];
        let e = read_frame(&mut reader, 16).await.unwrap_err();
        assert!(matches!(e, TransportError::TooLarge { size: 256, max: 16 }));
    }

    #[tokio::test]
    async fn truncated_bodies_are_errors() {
        let mut reader: &[u8] = &[0, 0, 0, 8, 1, 2];
        assert!(matches!(read_frame(&mut reader, 16).await, Err(TransportError::Io(_))));
    }

    #[tokio::test]
    async fn framed_links_cross_a_duplex_stream() {
        let (a, b) = tokio::io::duplex(1024);
        let (a_read, a_write) = tokio::io::split(a);
        let (b_read, b_write) = tokio::io::split(b);
        let mut left = framed(a_read, a_write, DEFAULT_MAX_FRAME);
        let mut right = framed(b_read, b_write, DEFAULT_MAX_FRAME);

        left.tx.send(compile(7)).unwrap();
        assert_eq!(right.rx.recv().await, Some(compile(7)));

        let reply = Envelope::HostReply { id: 2, reply: HostReply::Ok(serde_json::json!({"id": "5", "count": 3})) };
        right.tx.send(reply.clone()).unwrap();
        assert_eq!(left.rx.recv().await, Some(reply));
    }

    #[tokio::test]
    async fn in_process_pairs_are_crossed() {
        let (mut a, mut b) = pair();
        a.tx.send(compile(1)).unwrap();
        b.tx.send(compile(2)).unwrap();
        assert_eq!(b.rx.recv().await.map(|e| e.id()), Some(1));
        assert_eq!(a.rx.recv().await.map(|e| e.id()), Some(2));
        drop(a);
        assert!(b.rx.recv().await.is_none());
    }
}
