mod block_device;
mod file_disk;
pub mod init;
mod ram_disk;
mod types;

pub use block_device::BlockDevice;
pub use file_disk::FileDisk;
pub use ram_disk::RamDisk;
pub use types::*;
