//! Install-source acquisition and distribution detection.
//!
//! Given an install location (local tree, ISO, block device, HTTP/FTP URL,
//! NFS export or storage-pool volume) this crate mounts or fetches from it,
//! works out which distribution it holds and extracts a kernel, initrd and
//! boot arguments, or a bootable ISO, for a hypervisor boot configuration.
//!
//! ```ignore
//! use virt_install_source::{AcquireOptions, acquire_kernel};
//!
//! let options = AcquireOptions::default().with_scratch_dir("/var/tmp");
//! let images = acquire_kernel("http://mirror.example/fedora/9/x86_64/os/", &options).await?;
//! println!("{} {} {}", images.kernel.display(), images.initrd.display(), images.args);
//! ```

pub mod acquire;
pub mod config;
pub mod distro;
pub mod error;
pub mod installer;
pub mod location;
pub mod media;
pub mod progress;
pub mod session;
pub mod transport;

pub use acquire::{acquire_boot_disk, acquire_boot_disk_at, acquire_kernel, acquire_kernel_at};
pub use config::{AcquireHints, AcquireOptions, SETTINGS_ENV, Settings};
pub use distro::{DistroFamily, DistroProfile, DistroSignature, MatchedDistro, REGISTRY, match_distro};
pub use error::{Error, Result};
pub use installer::{BootFiles, DistroInstaller, InstallMedia, post_install_check};
pub use location::{InstallLocation, LocationResolver, StaticPools, StoragePools};
pub use media::{BootDisk, KernelImages};
pub use progress::{NoProgress, ProgressBarSink, ProgressSink};
pub use session::{AcquisitionState, FetchSession};
pub use transport::Transport;
