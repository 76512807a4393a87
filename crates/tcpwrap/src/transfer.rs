//! Exact-length transfer loops over blocking streams.

use std::io::{self, Read, Write};

use tcpwrap_core::{EndpointError, EndpointResult};

pub(crate) const READ: &str = "Read";
pub(crate) const WRITE: &str = "Write";

/// Reads until `buf` is full, retrying short and interrupted reads.
///
/// A zero-byte read means the peer closed its side and yields
/// [`EndpointError::ConnectionReset`]. Bytes received before a failure are
/// discarded along with it.
pub(crate) fn read_full<R: Read>(mut source: R, buf: &mut [u8]) -> EndpointResult<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => return Err(EndpointError::ConnectionReset(READ)),
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(EndpointError::from_transfer(READ, &err)),
        }
    }
    Ok(filled)
}

/// Writes all of `buf`, retrying short and interrupted writes.
///
/// A zero-byte write is not a peer-close signal here; it surfaces as
/// [`EndpointError::Other`].
pub(crate) fn write_full<W: Write>(mut sink: W, buf: &[u8]) -> EndpointResult<usize> {
    let mut written = 0;
    while written < buf.len() {
        match sink.write(&buf[written..]) {
            Ok(0) => {
                return Err(EndpointError::Other(format!(
                    "write accepted zero bytes after {written} of {}",
                    buf.len()
                )));
            }
            Ok(n) => written += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(EndpointError::from_transfer(WRITE, &err)),
        }
    }
    Ok(written)
}
