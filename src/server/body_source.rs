//! Response body sources: the uniform pull interface the response writer
//! reads from.

use std::fs::File;
use std::os::fd::{AsRawFd, OwnedFd};

#[derive(Debug, PartialEq, Eq)]
pub enum BodyRead {
    /// Some bytes were produced (never empty).
    Data(Vec<u8>),
    Eof,
    /// The underlying fd cannot make progress now; retry on readiness.
    WouldBlock,
}

/// Where response body bytes come from.
#[derive(Debug)]
pub enum BodySource {
    /// A regular file. `remaining == 0` means read until EOF.
    File { file: File, remaining: u64 },
    /// An fd (CGI stdout) with bytes that were read together with the CGI
    /// header terminator and must be delivered first.
    PrefetchedFd {
        fd: OwnedFd,
        prefetched: Vec<u8>,
        position: usize,
    },
    /// An in-memory body.
    Memory { data: Vec<u8>, position: usize },
}

impl BodySource {
    pub fn from_file(file: File, size: u64) -> Self {
        BodySource::File {
            file,
            remaining: size,
        }
    }

    pub fn from_fd_with_prefix(fd: OwnedFd, prefetched: Vec<u8>) -> Self {
        BodySource::PrefetchedFd {
            fd,
            prefetched,
            position: 0,
        }
    }

    pub fn from_bytes(data: Vec<u8>) -> Self {
        BodySource::Memory { data, position: 0 }
    }

    /// The pollable fd behind this source, when there is one. Regular
    /// files are always ready and expose nothing.
    pub fn pollable_fd(&self) -> Option<std::os::fd::RawFd> {
        match self {
            BodySource::PrefetchedFd { fd, .. } => Some(fd.as_raw_fd()),
            _ => None,
        }
    }

    /// Pulls up to `max_bytes`. A negative raw read is reported as
    /// [`BodyRead::WouldBlock`]; the caller retries on the next readiness
    /// event rather than inspecting error codes.
    pub fn read(&mut self, max_bytes: usize) -> BodyRead {
        if max_bytes == 0 {
            return BodyRead::Data(Vec::new());
        }
        match self {
            BodySource::File { file, remaining } => {
                let mut cap = max_bytes;
                if *remaining != 0 {
                    cap = cap.min(*remaining as usize);
                    if cap == 0 {
                        return BodyRead::Eof;
                    }
                }
                match read_fd(file.as_raw_fd(), cap) {
                    FdRead::Data(data) => {
                        if *remaining != 0 {
                            *remaining -= data.len() as u64;
                        }
                        BodyRead::Data(data)
                    }
                    FdRead::Eof => BodyRead::Eof,
                    FdRead::WouldBlock => BodyRead::WouldBlock,
                }
            }
            BodySource::PrefetchedFd {
                fd,
                prefetched,
                position,
            } => {
                if *position < prefetched.len() {
                    let n = max_bytes.min(prefetched.len() - *position);
                    let out = prefetched[*position..*position + n].to_vec();
                    *position += n;
                    return BodyRead::Data(out);
                }
                match read_fd(fd.as_raw_fd(), max_bytes) {
                    FdRead::Data(data) => BodyRead::Data(data),
                    FdRead::Eof => BodyRead::Eof,
                    FdRead::WouldBlock => BodyRead::WouldBlock,
                }
            }
            BodySource::Memory { data, position } => {
                if *position >= data.len() {
                    return BodyRead::Eof;
                }
                let n = max_bytes.min(data.len() - *position);
                let out = data[*position..*position + n].to_vec();
                *position += n;
                BodyRead::Data(out)
            }
        }
    }
}

enum FdRead {
    Data(Vec<u8>),
    Eof,
    WouldBlock,
}

fn read_fd(fd: std::os::fd::RawFd, max: usize) -> FdRead {
    let mut out = vec![0u8; max];
    let n = unsafe { libc::read(fd, out.as_mut_ptr() as *mut libc::c_void, max) };
    if n < 0 {
        return FdRead::WouldBlock;
    }
    if n == 0 {
        return FdRead::Eof;
    }
    out.truncate(n as usize);
    FdRead::Data(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Seek, SeekFrom, Write};

    #[test]
    fn memory_source_serves_slices_then_eof() {
        let mut src = BodySource::from_bytes(b"abcdef".to_vec());
        assert_eq!(src.read(4), BodyRead::Data(b"abcd".to_vec()));
        assert_eq!(src.read(4), BodyRead::Data(b"ef".to_vec()));
        assert_eq!(src.read(4), BodyRead::Eof);
    }

    #[test]
    fn file_source_honors_remaining_counter() {
        let mut f = tempfile::tempfile().unwrap();
        f.write_all(b"0123456789").unwrap();
        f.seek(SeekFrom::Start(0)).unwrap();

        let mut src = BodySource::from_file(f, 4);
        assert_eq!(src.read(100), BodyRead::Data(b"0123".to_vec()));
        assert_eq!(src.read(100), BodyRead::Eof);
    }

    #[test]
    fn prefetched_bytes_come_before_fd_bytes() {
        let mut f = tempfile::tempfile().unwrap();
        f.write_all(b"-rest").unwrap();
        f.seek(SeekFrom::Start(0)).unwrap();
        let fd = OwnedFd::from(f);

        let mut src = BodySource::from_fd_with_prefix(fd, b"head".to_vec());
        assert_eq!(src.read(2), BodyRead::Data(b"he".to_vec()));
        assert_eq!(src.read(10), BodyRead::Data(b"ad".to_vec()));
        assert_eq!(src.read(10), BodyRead::Data(b"-rest".to_vec()));
        assert_eq!(src.read(10), BodyRead::Eof);
    }
}
