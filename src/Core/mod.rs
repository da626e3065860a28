pub mod SharedMemory;
pub mod view;

pub use view::MemoryView;
pub use SharedMemory::{
    create_shared_memory, open_shared_memory, HeapMemory, RawHandle, SharedMemoryBackend,
};
