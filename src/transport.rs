//! Transport adapters (spec.md §4.10): stream/datagram I/O delivering one
//! request line and accepting one reply line. Out of scope for the wire
//! protocol itself — this module supplies the minimal blocking adapters the
//! dispatcher needs to be runnable, plus (behind the `tokio` feature) a
//! `tokio_util`-based line codec for callers embedding their own runtime.

use std::io::{self, BufRead, BufReader, Write};
use std::net::{TcpStream, UdpSocket};

use crate::dispatch::{Dispatcher, DispatchAction};

/// One request line in, one reply line out. Implementors own framing;
/// `dispatch` never sees raw bytes.
pub trait Transport {
    fn read_line(&mut self) -> io::Result<Option<String>>;
    fn write_line(&mut self, line: &str) -> io::Result<()>;
}

/// A single TCP connection, framed on `\n` (spec.md §4.10: "stream-based
/// transports may keep a connection alive for multiple request lines").
pub struct TcpTransport {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl TcpTransport {
    pub fn new(stream: TcpStream) -> io::Result<Self> {
        let writer = stream.try_clone()?;
        Ok(Self {
            reader: BufReader::new(stream),
            writer,
        })
    }
}

impl Transport for TcpTransport {
    fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        let read = self.reader.read_line(&mut line)?;
        if read == 0 {
            return Ok(None);
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(Some(line))
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()
    }
}

/// "One datagram = one frame" (spec.md §4.10). Oversized datagrams are
/// dropped rather than truncated.
pub struct UdpTransport {
    socket: UdpSocket,
    max_frame_bytes: usize,
    peer: Option<std::net::SocketAddr>,
}

impl UdpTransport {
    pub fn new(socket: UdpSocket, max_frame_bytes: usize) -> Self {
        Self {
            socket,
            max_frame_bytes,
            peer: None,
        }
    }
}

impl Transport for UdpTransport {
    fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut buf = vec![0u8; self.max_frame_bytes + 1];
        let (n, peer) = self.socket.recv_from(&mut buf)?;
        if n > self.max_frame_bytes {
            tracing::warn!(bytes = n, limit = self.max_frame_bytes, "dropping oversized datagram");
            return Ok(None);
        }
        self.peer = Some(peer);
        let text = String::from_utf8_lossy(&buf[..n]).into_owned();
        Ok(Some(text))
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        let Some(peer) = self.peer else {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "no datagram to reply to"));
        };
        self.socket.send_to(line.as_bytes(), peer)?;
        Ok(())
    }
}

/// Drive one transport to completion: read a line, dispatch it, write the
/// reply, repeat until the peer closes or the dispatcher signals closure
/// (spec.md §4.9). Per-request cancellation (a dropped connection mid-reply)
/// is handled by the `io::Result` from `write_line` simply propagating.
pub fn serve_connection(dispatcher: &Dispatcher, transport: &mut dyn Transport) -> io::Result<()> {
    loop {
        let Some(line) = transport.read_line()? else {
            return Ok(());
        };
        if line.is_empty() {
            continue;
        }
        match dispatcher.dispatch_line(&line) {
            DispatchAction::Reply(reply) => transport.write_line(&reply)?,
            DispatchAction::CloseConnection => return Ok(()),
        }
    }
}

#[cfg(feature = "tokio")]
pub mod codec {
    //! `tokio_util::codec` line framing for callers embedding their own
    //! async runtime. Frames on `\n`, enforcing `max_frame_bytes`.

    use bytes::{Buf, BufMut, BytesMut};
    use tokio_util::codec::{Decoder, Encoder};

    pub struct LineCodec {
        pub max_frame_bytes: usize,
    }

    impl Decoder for LineCodec {
        type Item = String;
        type Error = std::io::Error;

        fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
            let Some(newline_at) = src.iter().position(|b| *b == b'\n') else {
                if src.len() > self.max_frame_bytes {
                    return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "frame too large"));
                }
                return Ok(None);
            };
            let mut line = src.split_to(newline_at + 1);
            line.truncate(line.len() - 1);
            if line.last() == Some(&b'\r') {
                line.truncate(line.len() - 1);
            }
            let text = String::from_utf8(line.to_vec())
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            Ok(Some(text))
        }
    }

    impl Encoder<String> for LineCodec {
        type Error = std::io::Error;

        fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<(), Self::Error> {
            dst.reserve(item.len() + 1);
            dst.put_slice(item.as_bytes());
            dst.put_u8(b'\n');
            Ok(())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn decodes_a_single_framed_line() {
            let mut codec = LineCodec { max_frame_bytes: 1024 };
            let mut buf = BytesMut::from("V2|0|{{x}}|[]\n");
            let decoded = codec.decode(&mut buf).unwrap();
            assert_eq!(decoded, Some("V2|0|{{x}}|[]".to_string()));
        }
    }
}

