use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::{self, Read, Write};

const MAX_MSG_SIZE: u32 = 16 * 1024 * 1024;

/// Writes one frame: a little-endian `u32` length followed by the bincode body.
pub fn send_msg<W: Write, T: Serialize>(mut writer: W, msg: &T) -> io::Result<()> {
    let bytes = bincode::serialize(msg).map_err(io::Error::other)?;
    let len = bytes.len() as u32;

    if len > MAX_MSG_SIZE {
        return Err(io::Error::other("message too large"));
    }

    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

pub fn recv_msg<R: Read, T: DeserializeOwned>(mut reader: R) -> io::Result<T> {
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes)?;
    read_body(reader, len_bytes)
}

/// Like [`recv_msg`], but a stream that ends cleanly between frames yields
/// `Ok(None)`. Ending inside a frame is still an error.
pub fn try_recv_msg<R: Read, T: DeserializeOwned>(mut reader: R) -> io::Result<Option<T>> {
    let mut len_bytes = [0u8; 4];
    let mut filled = 0;

    while filled < len_bytes.len() {
        match reader.read(&mut len_bytes[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "stream ended inside a frame header",
                ));
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    read_body(reader, len_bytes).map(Some)
}

fn read_body<R: Read, T: DeserializeOwned>(mut reader: R, len_bytes: [u8; 4]) -> io::Result<T> {
    let len = u32::from_le_bytes(len_bytes) as usize;

    if len > MAX_MSG_SIZE as usize {
        return Err(io::Error::other("message too large"));
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;

    bincode::deserialize(&buf).map_err(io::Error::other)
}
