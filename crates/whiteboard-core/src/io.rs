//! Raw POSIX I/O helpers: opening a service region with the right flags and
//! retrying writes across signal interruption.
//!
//! `std::fs::File` already loops internally on `EINTR`, but it offers no way
//! to pass `O_DIRECT`, so the whiteboard talks to raw file descriptors here
//! instead, the way the original broker opens files with `os.open` and a
//! bitmask of flags.

use std::ffi::CString;
use std::io;
use std::os::unix::io::RawFd;

#[derive(Debug, thiserror::Error)]
pub enum IoError {
    #[error("path contains an interior NUL byte")]
    InvalidPath,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Opens `path` for reading, requesting `O_DIRECT` when `direct_io` is set,
/// always with `O_SYNC` so every read observes the latest data committed by
/// any peer.
pub fn open_read(path: &str, direct_io: bool) -> Result<RawFd, IoError> {
    open(path, libc::O_RDONLY, direct_io)
}

/// Opens `path` for writing, requesting `O_DIRECT` when `direct_io` is set,
/// always with `O_SYNC` so the write is durable before the call returns.
pub fn open_write(path: &str, direct_io: bool) -> Result<RawFd, IoError> {
    open(path, libc::O_WRONLY, direct_io)
}

fn open(path: &str, access_flags: i32, direct_io: bool) -> Result<RawFd, IoError> {
    let c_path = CString::new(path).map_err(|_| IoError::InvalidPath)?;
    let mut flags = access_flags | libc::O_SYNC;
    if direct_io {
        flags |= libc::O_DIRECT;
    }

    // SAFETY: c_path is a valid, NUL-terminated C string for the call's
    // duration.
    let fd = unsafe { libc::open(c_path.as_ptr(), flags) };
    if fd < 0 {
        return Err(IoError::Io(io::Error::last_os_error()));
    }
    Ok(fd)
}

pub fn close(fd: RawFd) {
    // SAFETY: fd is a valid, open descriptor owned by the caller.
    unsafe {
        libc::close(fd);
    }
}

pub fn seek(fd: RawFd, offset: u64) -> Result<(), IoError> {
    // SAFETY: fd is a valid, open descriptor.
    let res = unsafe { libc::lseek(fd, offset as libc::off_t, libc::SEEK_SET) };
    if res < 0 {
        return Err(IoError::Io(io::Error::last_os_error()));
    }
    Ok(())
}

/// Reads exactly `buf.len()` bytes from `fd` at its current position.
pub fn read_exact(fd: RawFd, buf: &mut [u8]) -> Result<(), IoError> {
    let mut filled = 0;
    while filled < buf.len() {
        // SAFETY: the pointer range [buf.as_mut_ptr()+filled, +remaining)
        // is within the allocation of buf.
        let n = unsafe {
            libc::read(
                fd,
                buf[filled..].as_mut_ptr() as *mut libc::c_void,
                buf.len() - filled,
            )
        };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(IoError::Io(err));
        }
        if n == 0 {
            return Err(IoError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "short read from whiteboard service",
            )));
        }
        filled += n as usize;
    }
    Ok(())
}

/// Writes `buf` to `fd` in full, retrying only when the underlying `write`
/// syscall is interrupted by a signal (`EINTR`); any other error is
/// surfaced unchanged. This is the "uninterruptible write" helper of the
/// spec.
pub fn uninterruptible_write(fd: RawFd, buf: &[u8]) -> Result<usize, IoError> {
    let mut written = 0;
    while written < buf.len() {
        // SAFETY: the pointer range [buf.as_ptr()+written, +remaining) is
        // within the allocation of buf.
        let n = unsafe {
            libc::write(
                fd,
                buf[written..].as_ptr() as *const libc::c_void,
                buf.len() - written,
            )
        };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(IoError::Io(err));
        }
        written += n as usize;
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn round_trip_through_raw_fd() {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap().to_string();
        drop(file);
        std::fs::File::create(&path).unwrap().write_all(&[0u8; 8192]).unwrap();

        let fd = open_write(&path, false).unwrap();
        uninterruptible_write(fd, b"hello").unwrap();
        close(fd);

        let fd = open_read(&path, false).unwrap();
        let mut buf = [0u8; 5];
        read_exact(fd, &mut buf).unwrap();
        close(fd);

        assert_eq!(&buf, b"hello");
        std::fs::remove_file(path).ok();
    }
}
