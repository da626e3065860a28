// Shared memory backends
// File-backed mmap segments for cross-process channels, aligned heap regions for in-process use

use std::alloc::{self, Layout};
use std::fmt::Debug;
use std::io;
use std::path::Path;
use std::ptr::NonNull;

use super::view::MemoryView;
use crate::error::ChannelError;

/// Alignment of heap-backed regions, matches the cache-line pair used by the trailer layout.
pub const REGION_ALIGNMENT: usize = 128;

/// Shared memory backend trait for memory-mapped and heap-backed regions
pub trait SharedMemoryBackend: Send + Sync + Debug {
    /// Get a pointer to the mapped memory region
    fn as_ptr(&self) -> *mut u8;

    /// Get the size of the mapped region in bytes
    fn size(&self) -> usize;

    /// Get the underlying OS handle
    fn raw_handle(&self) -> RawHandle;

    /// Bounded view over the whole region.
    ///
    /// # Safety
    /// The view (and every view or ring buffer built from it) must not be used after
    /// this backend is dropped.
    unsafe fn view(&self) -> MemoryView {
        MemoryView::new(self.as_ptr(), self.size())
            .unwrap_or_else(|| unreachable!("backends never expose a null mapping"))
    }
}

/// Platform-specific handle type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawHandle {
    /// Unix file descriptor of a mapped file
    Fd(i32),
    /// Process-private heap allocation
    Heap,
}

/// Exclusively create a file-backed shared memory segment of `size` bytes.
///
/// Fails with [`ChannelError::AlreadyExists`] if `path` exists, so two creators can
/// never both initialize the same segment.
#[cfg(unix)]
pub fn create_shared_memory(path: &Path, size: usize) -> Result<Box<dyn SharedMemoryBackend>, ChannelError> {
    let file = MappedFile::create_file(path, size).map_err(|source| {
        if source.kind() == io::ErrorKind::AlreadyExists {
            ChannelError::AlreadyExists { path: path.to_path_buf() }
        } else {
            ChannelError::CreateFailed { path: path.to_path_buf(), source }
        }
    })?;

    let mapped = MappedFile::map(file, size).map_err(|source| {
        let _ = std::fs::remove_file(path);
        ChannelError::MapFailed { path: path.to_path_buf(), source }
    })?;
    Ok(Box::new(mapped))
}

/// Map an existing file-backed segment using the file's current length.
#[cfg(unix)]
pub fn open_shared_memory(path: &Path) -> Result<Box<dyn SharedMemoryBackend>, ChannelError> {
    let map_failed = |source| ChannelError::MapFailed { path: path.to_path_buf(), source };

    let file = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(map_failed)?;
    let size = file.metadata().map_err(map_failed)?.len() as usize;

    Ok(Box::new(MappedFile::map(file, size).map_err(map_failed)?))
}

#[cfg(not(unix))]
pub fn create_shared_memory(path: &Path, _size: usize) -> Result<Box<dyn SharedMemoryBackend>, ChannelError> {
    Err(ChannelError::CreateFailed {
        path: path.to_path_buf(),
        source: io::Error::new(io::ErrorKind::Unsupported, "File-backed shared memory only supported on Unix"),
    })
}

#[cfg(not(unix))]
pub fn open_shared_memory(path: &Path) -> Result<Box<dyn SharedMemoryBackend>, ChannelError> {
    Err(ChannelError::MapFailed {
        path: path.to_path_buf(),
        source: io::Error::new(io::ErrorKind::Unsupported, "File-backed shared memory only supported on Unix"),
    })
}

#[cfg(unix)]
pub use self::unix::MappedFile;

#[cfg(unix)]
mod unix {
    use super::{RawHandle, SharedMemoryBackend};
    use std::fs::{File, OpenOptions};
    use std::io;
    use std::os::fd::AsRawFd;
    use std::os::unix::fs::OpenOptionsExt;
    use std::path::Path;
    use std::ptr::{self, NonNull};

    /// A `MAP_SHARED` mapping of a whole file.
    #[derive(Debug)]
    pub struct MappedFile {
        ptr: NonNull<u8>,
        size: usize,
        file: File,
    }

    unsafe impl Send for MappedFile {}
    unsafe impl Sync for MappedFile {}

    impl MappedFile {
        /// Create `path` (must not exist) and size it to `size` zeroed bytes.
        pub fn create_file(path: &Path, size: usize) -> io::Result<File> {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create_new(true)
                .mode(0o666)
                .open(path)?;

            if let Err(err) = file.set_len(size as u64) {
                let _ = std::fs::remove_file(path);
                return Err(err);
            }
            Ok(file)
        }

        /// Map `size` bytes of `file` read/write and shared.
        pub fn map(file: File, size: usize) -> io::Result<Self> {
            if size == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "cannot map an empty file",
                ));
            }

            #[allow(unused_mut)]
            let mut flags = libc::MAP_SHARED;
            #[cfg(target_os = "linux")]
            {
                flags |= libc::MAP_POPULATE;
            }

            let ptr = unsafe {
                libc::mmap(
                    ptr::null_mut(),
                    size,
                    libc::PROT_READ | libc::PROT_WRITE,
                    flags,
                    file.as_raw_fd(),
                    0,
                )
            };

            if ptr == libc::MAP_FAILED {
                return Err(io::Error::last_os_error());
            }

            // mmap never hands back null on success
            let ptr = NonNull::new(ptr as *mut u8)
                .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "mmap returned null"))?;

            Ok(Self { ptr, size, file })
        }
    }

    impl Drop for MappedFile {
        fn drop(&mut self) {
            unsafe {
                libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, self.size);
            }
        }
    }

    impl SharedMemoryBackend for MappedFile {
        fn as_ptr(&self) -> *mut u8 {
            self.ptr.as_ptr()
        }

        fn size(&self) -> usize {
            self.size
        }

        fn raw_handle(&self) -> RawHandle {
            RawHandle::Fd(self.file.as_raw_fd())
        }
    }
}

/// Zeroed, [`REGION_ALIGNMENT`]-aligned heap region.
///
/// Lets a ring buffer run between threads of one process without touching the
/// filesystem.
#[derive(Debug)]
pub struct HeapMemory {
    ptr: NonNull<u8>,
    layout: Layout,
}

unsafe impl Send for HeapMemory {}
unsafe impl Sync for HeapMemory {}

impl HeapMemory {
    pub fn new(size: usize) -> io::Result<Self> {
        if size == 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "region size must be non-zero"));
        }
        let layout = Layout::from_size_align(size, REGION_ALIGNMENT)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let ptr = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(ptr).ok_or_else(|| {
            io::Error::new(io::ErrorKind::OutOfMemory, format!("Failed to allocate {size} bytes"))
        })?;
        Ok(Self { ptr, layout })
    }
}

impl Drop for HeapMemory {
    fn drop(&mut self) {
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

impl SharedMemoryBackend for HeapMemory {
    fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    fn size(&self) -> usize {
        self.layout.size()
    }

    fn raw_handle(&self) -> RawHandle {
        RawHandle::Heap
    }
}
