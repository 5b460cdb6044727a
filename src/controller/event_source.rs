//! Event sources - one per physical input stream
//!
//! Two reading strategies sit behind the [`EventSource`] trait:
//!
//! - [`EvdevSource`]: finds a device by its advertised name, grabs it and reads through
//!   the `evdev` async event stream
//! - [`RecordSource`]: reads raw `struct input_event` records from a fixed device path
//!
//! Every read is readiness-driven, so a pending read can be dropped at any time. This is
//! what bounds shutdown latency: the collector races each read against the shutdown token.

use crate::config::{DeviceLocator, SourceConfig};
use crate::controller::input_event::{decode_record, InputEvent, EVENT_RECORD_SIZE};
use std::fs::{File, OpenOptions};
use std::future::Future;
use std::io::{self, Read, Write};
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::io::unix::AsyncFd;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, ReadBuf};
use tracing::{debug, info, warn};

// _IOW('E', 0x90, int)
const EVIOCGRAB: libc::c_ulong = (1 << 30) | (4 << 16) | ((b'E' as libc::c_ulong) << 8) | 0x90;

// Source errors
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("No input device named {name:?}")]
    NotFound { name: String },

    #[error("Failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to grab {device}: {source}")]
    Grab {
        device: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read event from {device}: {source}")]
    Read {
        device: String,
        #[source]
        source: io::Error,
    },

    #[error("Malformed event record from {device}: got {actual} bytes, expected {expected}")]
    MalformedRecord {
        device: String,
        expected: usize,
        actual: usize,
    },

    #[error("Event stream {device} closed")]
    Closed { device: String },
}

/// An ordered, infinite stream of input events from one device.
///
/// `next_event` resolves with the next event or with a fatal error. The returned future
/// must be safe to drop before completion.
pub trait EventSource: Send {
    /// Human readable name used in logs and errors
    fn label(&self) -> &str;

    fn next_event(&mut self) -> impl Future<Output = Result<InputEvent, SourceError>> + Send;
}

/// Evdev-backed source, discovered by device name
pub struct EvdevSource {
    label: String,
    stream: evdev::EventStream,
    grabbed: bool,
}

impl EvdevSource {
    /// Scans `/dev/input/event*` for a device advertising `name`.
    pub fn find_by_name(name: &str, grab: bool) -> Result<Self, SourceError> {
        debug!("Scanning input devices for {:?}", name);
        let (path, device) = evdev::enumerate()
            .find(|(_, device)| device.name() == Some(name))
            .ok_or_else(|| SourceError::NotFound {
                name: name.to_string(),
            })?;
        info!("Found {:?} at {}", name, path.display());
        Self::from_device(name.to_string(), path, device, grab)
    }

    fn from_device(
        label: String,
        path: PathBuf,
        mut device: evdev::Device,
        grab: bool,
    ) -> Result<Self, SourceError> {
        if grab {
            device.grab().map_err(|source| SourceError::Grab {
                device: label.clone(),
                source,
            })?;
            info!("Grabbed {} for exclusive access", label);
        }

        let stream = device
            .into_event_stream()
            .map_err(|source| SourceError::Open { path, source })?;

        Ok(Self {
            label,
            stream,
            grabbed: grab,
        })
    }
}

impl EventSource for EvdevSource {
    fn label(&self) -> &str {
        &self.label
    }

    fn next_event(&mut self) -> impl Future<Output = Result<InputEvent, SourceError>> + Send {
        async move {
            match self.stream.next_event().await {
                Ok(event) => Ok(InputEvent::from(event)),
                Err(source) => Err(SourceError::Read {
                    device: self.label.clone(),
                    source,
                }),
            }
        }
    }
}

impl Drop for EvdevSource {
    fn drop(&mut self) {
        if self.grabbed {
            // Closing the fd releases the grab as well; this just makes it explicit.
            match self.stream.device_mut().ungrab() {
                Ok(()) => debug!("Released grab on {}", self.label),
                Err(e) => warn!("Failed to release grab on {}: {}", self.label, e),
            }
        }
    }
}

/// Source decoding raw kernel event records from any byte stream
pub struct RecordSource<R> {
    label: String,
    reader: R,
}

impl<R> RecordSource<R> {
    pub fn new(label: impl Into<String>, reader: R) -> Self {
        Self {
            label: label.into(),
            reader,
        }
    }
}

impl RecordSource<DeviceFile> {
    /// Opens an event device node by path for raw record reads.
    ///
    /// With `grab` set the node is grabbed through the same file descriptor that is read,
    /// so no other client sees its events while the source is alive.
    pub fn open(path: &Path, grab: bool) -> Result<Self, SourceError> {
        let label = path.display().to_string();
        let mut file = DeviceFile::open_read(path).map_err(|source| SourceError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        if grab {
            file.grab().map_err(|source| SourceError::Grab {
                device: label.clone(),
                source,
            })?;
            info!("Grabbed {} for exclusive access", label);
        }
        info!("Opened {} for raw event records", label);
        Ok(Self::new(label, file))
    }
}

impl<R: AsyncRead + Unpin + Send> EventSource for RecordSource<R> {
    fn label(&self) -> &str {
        &self.label
    }

    fn next_event(&mut self) -> impl Future<Output = Result<InputEvent, SourceError>> + Send {
        async move {
            let mut record = [0u8; EVENT_RECORD_SIZE];
            // One read per record: the kernel never splits an event across reads, so
            // anything shorter is a malformed record rather than a partial one.
            let read = self
                .reader
                .read(&mut record)
                .await
                .map_err(|source| SourceError::Read {
                    device: self.label.clone(),
                    source,
                })?;

            match read {
                0 => Err(SourceError::Closed {
                    device: self.label.clone(),
                }),
                n if n != EVENT_RECORD_SIZE => Err(SourceError::MalformedRecord {
                    device: self.label.clone(),
                    expected: EVENT_RECORD_SIZE,
                    actual: n,
                }),
                _ => Ok(decode_record(&record)),
            }
        }
    }
}

/// Either reading strategy, picked from configuration at startup
pub enum DeviceSource {
    Evdev(EvdevSource),
    Record(RecordSource<DeviceFile>),
}

impl DeviceSource {
    pub fn open(config: &SourceConfig) -> Result<Self, SourceError> {
        match &config.locator {
            DeviceLocator::Name(name) => {
                EvdevSource::find_by_name(name, config.grab).map(DeviceSource::Evdev)
            }
            DeviceLocator::Path(path) => {
                RecordSource::open(path, config.grab).map(DeviceSource::Record)
            }
        }
    }
}

impl EventSource for DeviceSource {
    fn label(&self) -> &str {
        match self {
            DeviceSource::Evdev(source) => source.label(),
            DeviceSource::Record(source) => source.label(),
        }
    }

    fn next_event(&mut self) -> impl Future<Output = Result<InputEvent, SourceError>> + Send {
        async move {
            match self {
                DeviceSource::Evdev(source) => source.next_event().await,
                DeviceSource::Record(source) => source.next_event().await,
            }
        }
    }
}

/// Non-blocking character device driven by the tokio reactor.
///
/// Used for raw event nodes (read side) and for the HID gadget (write side). Reads and
/// writes are single syscalls, so a record or report is never split.
#[derive(Debug)]
pub struct DeviceFile {
    inner: AsyncFd<File>,
    grabbed: bool,
}

impl DeviceFile {
    pub fn open_read(path: &Path) -> io::Result<Self> {
        Self::open(path, OpenOptions::new().read(true))
    }

    pub fn open_write(path: &Path) -> io::Result<Self> {
        Self::open(path, OpenOptions::new().write(true))
    }

    fn open(path: &Path, options: &mut OpenOptions) -> io::Result<Self> {
        let file = options
            .custom_flags(libc::O_NONBLOCK | libc::O_CLOEXEC)
            .open(path)?;
        Ok(Self {
            inner: AsyncFd::new(file)?,
            grabbed: false,
        })
    }

    /// Takes the evdev exclusive grab on this descriptor. Released on drop.
    pub fn grab(&mut self) -> io::Result<()> {
        self.set_grab(true)?;
        self.grabbed = true;
        Ok(())
    }

    fn set_grab(&self, grab: bool) -> io::Result<()> {
        let fd = self.inner.get_ref().as_raw_fd();
        // SAFETY: EVIOCGRAB takes its argument by value and the fd is owned by `inner`.
        let rc = unsafe { libc::ioctl(fd, EVIOCGRAB as _, libc::c_int::from(grab)) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl Drop for DeviceFile {
    fn drop(&mut self) {
        if self.grabbed {
            match self.set_grab(false) {
                Ok(()) => debug!("Released grab on fd {}", self.inner.get_ref().as_raw_fd()),
                Err(e) => warn!("Failed to release grab: {}", e),
            }
        }
    }
}

impl AsyncRead for DeviceFile {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        loop {
            let mut guard = ready!(self.inner.poll_read_ready(cx))?;
            let unfilled = buf.initialize_unfilled();
            match guard.try_io(|inner| inner.get_ref().read(unfilled)) {
                Ok(Ok(len)) => {
                    buf.advance(len);
                    return Poll::Ready(Ok(()));
                }
                Ok(Err(err)) => return Poll::Ready(Err(err)),
                Err(_would_block) => continue,
            }
        }
    }
}

impl AsyncWrite for DeviceFile {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        loop {
            let mut guard = ready!(self.inner.poll_write_ready(cx))?;
            match guard.try_io(|inner| inner.get_ref().write(buf)) {
                Ok(result) => return Poll::Ready(result),
                Err(_would_block) => continue,
            }
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
