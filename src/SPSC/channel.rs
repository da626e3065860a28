// Duplex channel: one shared segment holding a header and two ring buffers

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{fence, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_utils::Backoff;
use tracing::{debug, info, warn};

use super::Buffer::layout::{ChannelHeader, CHANNEL_HEADER_LENGTH};
use super::Buffer::RingBuffer;
use crate::error::{ChannelError, Result};
use crate::Core::{create_shared_memory, open_shared_memory, SharedMemoryBackend};

/// Value of `version` once the creator has finished writing the header.
pub const READY_VERSION: i64 = 1;

const DEFAULT_FILE_NAME: &str = "srv.dat";

/// Sleep between handshake polls once spinning and yielding are exhausted.
const HANDSHAKE_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Default location of the channel file: `/dev/shm` on Linux, the temp dir elsewhere.
pub fn default_channel_path() -> PathBuf {
    if cfg!(target_os = "linux") {
        Path::new("/dev/shm").join(DEFAULT_FILE_NAME)
    } else {
        std::env::temp_dir().join(DEFAULT_FILE_NAME)
    }
}

#[inline]
pub(crate) fn segment_length(inbound_length: usize, outbound_length: usize) -> usize {
    CHANNEL_HEADER_LENGTH + inbound_length + outbound_length
}

#[inline]
pub(crate) fn inbound_offset() -> usize {
    CHANNEL_HEADER_LENGTH
}

#[inline]
pub(crate) fn outbound_offset(inbound_length: usize) -> usize {
    CHANNEL_HEADER_LENGTH + inbound_length
}

/// Two ring buffers in one shared segment, one per direction.
///
/// ```text
/// [ChannelHeader][inbound ring buffer][outbound ring buffer]
/// ```
///
/// Direction is a naming convention, nothing in the segment enforces it: the
/// creator reads `inbound` and writes `outbound`, the opener writes `inbound` and
/// reads `outbound`.
pub struct DuplexChannel {
    pub(crate) path: PathBuf,
    pub(crate) inbound: RingBuffer,
    pub(crate) outbound: RingBuffer,
    // views above point into this mapping, keep it last so it drops after them
    pub(crate) segment: Box<dyn SharedMemoryBackend>,
}

impl DuplexChannel {
    /// Create and initialize a new channel file at `path`.
    ///
    /// `inbound_length` and `outbound_length` are full ring buffer lengths
    /// (power-of-two capacity plus trailer). Fails with
    /// [`ChannelError::AlreadyExists`] if the file is already there.
    ///
    /// Initialization is two-phase: both lengths are written into the freshly
    /// sized (and therefore zeroed) file, then `version` is published with release
    /// ordering. An opener that sees a non-zero version therefore also sees both
    /// lengths and zeroed trailers.
    pub fn create(path: impl AsRef<Path>, inbound_length: usize, outbound_length: usize) -> Result<Self> {
        let path = path.as_ref();
        RingBuffer::capacity_for_length(inbound_length)?;
        RingBuffer::capacity_for_length(outbound_length)?;

        let total_length = segment_length(inbound_length, outbound_length);
        let segment = create_shared_memory(path, total_length)?;

        // Safety: the view does not outlive `segment`, which moves into the channel.
        let view = unsafe { segment.view() };
        let header = unsafe { view.struct_ref::<ChannelHeader>(0) };

        // Phase 1: reserve; set_len on a new file already zeroed every byte
        header.inbound_length.store(inbound_length as i64, Ordering::Relaxed);
        header.outbound_length.store(outbound_length as i64, Ordering::Relaxed);

        // Phase 2: publish
        fence(Ordering::Release);
        header.version.store(READY_VERSION, Ordering::Release);

        info!(
            path = %path.display(),
            inbound_length,
            outbound_length,
            "created duplex channel"
        );

        Self::from_segment(path, segment, inbound_length, outbound_length)
    }

    /// Map an existing channel and wait, at most `handshake_timeout`, for its creator
    /// to publish the header. A file that does not exist yet is waited for as well, so
    /// the two sides can start in either order.
    ///
    /// Polling spins, then yields, then sleeps in short intervals; it never waits
    /// past the bound and fails with [`ChannelError::HandshakeTimeout`].
    pub fn open(path: impl AsRef<Path>, handshake_timeout: Duration) -> Result<Self> {
        let path = path.as_ref();
        let started = Instant::now();
        let backoff = Backoff::new();

        // The peer may not have created the file yet, or may not have sized it.
        loop {
            match std::fs::metadata(path) {
                Ok(metadata) if metadata.len() as usize >= CHANNEL_HEADER_LENGTH => break,
                Ok(_) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(ChannelError::MapFailed { path: path.to_path_buf(), source })
                }
            }
            pause(&backoff, started, handshake_timeout, path)?;
        }

        let segment = open_shared_memory(path)?;
        let view = unsafe { segment.view() };
        let header = unsafe { view.struct_ref::<ChannelHeader>(0) };

        while header.version.load(Ordering::Acquire) == 0 {
            pause(&backoff, started, handshake_timeout, path)?;
        }

        let inbound_length = header.inbound_length.load(Ordering::Relaxed);
        let outbound_length = header.outbound_length.load(Ordering::Relaxed);
        debug!(
            path = %path.display(),
            inbound_length,
            outbound_length,
            waited = ?started.elapsed(),
            "channel handshake complete"
        );

        let invalid = |reason: String| ChannelError::InvalidLayout { path: path.to_path_buf(), reason };
        let inbound_length = usize::try_from(inbound_length)
            .map_err(|_| invalid(format!("negative inbound length {inbound_length}")))?;
        let outbound_length = usize::try_from(outbound_length)
            .map_err(|_| invalid(format!("negative outbound length {outbound_length}")))?;

        for (name, length) in [("inbound", inbound_length), ("outbound", outbound_length)] {
            RingBuffer::capacity_for_length(length)
                .map_err(|err| invalid(format!("{name} ring buffer: {err}")))?;
        }

        let required = inbound_length
            .checked_add(outbound_length)
            .and_then(|rings| rings.checked_add(CHANNEL_HEADER_LENGTH))
            .ok_or_else(|| invalid("declared lengths overflow".to_string()))?;
        if required > segment.size() {
            return Err(invalid(format!(
                "declared lengths need {required} bytes, file holds {}",
                segment.size()
            )));
        }

        info!(path = %path.display(), "opened duplex channel");
        Self::from_segment(path, segment, inbound_length, outbound_length)
    }

    fn from_segment(
        path: &Path,
        segment: Box<dyn SharedMemoryBackend>,
        inbound_length: usize,
        outbound_length: usize,
    ) -> Result<Self> {
        // Safety: the ring buffers are stored next to `segment` and dropped before it.
        let view = unsafe { segment.view() };
        let inbound = unsafe { RingBuffer::init(view.slice(inbound_offset(), inbound_length))? };
        let outbound = unsafe {
            RingBuffer::init(view.slice(outbound_offset(inbound_length), outbound_length))?
        };

        Ok(Self {
            path: path.to_path_buf(),
            inbound,
            outbound,
            segment,
        })
    }

    /// Ring buffer the creator reads and the opener writes.
    pub fn inbound(&self) -> &RingBuffer {
        &self.inbound
    }

    /// Ring buffer the creator writes and the opener reads.
    pub fn outbound(&self) -> &RingBuffer {
        &self.outbound
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Total bytes of the mapped segment.
    pub fn segment_length(&self) -> usize {
        self.segment.size()
    }

    /// Header version as currently published.
    pub fn version(&self) -> i64 {
        let view = unsafe { self.segment.view() };
        unsafe { view.struct_ref::<ChannelHeader>(0) }
            .version
            .load(Ordering::Acquire)
    }

    /// Remove the backing file. Existing mappings, in this process or the peer's,
    /// stay valid until dropped.
    pub fn unlink(&self) -> std::io::Result<()> {
        std::fs::remove_file(&self.path)?;
        info!(path = %self.path.display(), "unlinked duplex channel");
        Ok(())
    }
}

fn pause(backoff: &Backoff, started: Instant, timeout: Duration, path: &Path) -> Result<()> {
    let waited = started.elapsed();
    if waited >= timeout {
        warn!(path = %path.display(), ?waited, "channel handshake timed out");
        return Err(ChannelError::HandshakeTimeout { path: path.to_path_buf(), waited });
    }

    if backoff.is_completed() {
        thread::sleep(HANDSHAKE_POLL_INTERVAL.min(timeout - waited));
    } else {
        backoff.snooze();
    }
    Ok(())
}
