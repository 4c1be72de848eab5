//! # streamctl-remote
//!
//! Everything that touches a media-serving host's shell or filesystem.
//!
//! - **Transports** ([`transport`]) -- how a channel to a host is opened:
//!   the system `ssh`/`scp` binaries multiplexed over a control socket, or a
//!   local shell when the engine runs on the same machine.
//! - **Channel pool** ([`pool::HostPool`]) -- a bounded set of reusable
//!   channels per host with scoped acquire/release.
//! - **Connection manager** ([`ConnectionManager`]) -- command execution,
//!   file transfer, stat and streaming reads with fatal/transient error
//!   classification and retries.
//! - **Provisioner** ([`Provisioner`]) -- idempotent tenant directory and
//!   folder lifecycle, kept consistent with the store.

pub mod command;
pub mod manager;
pub mod pool;
pub mod provision;
pub mod retry;
pub mod shell;
pub mod transport;

// ---- Re-exports for convenience ----

pub use command::CommandOutput;
pub use manager::{ConnectionManager, DirRemoval, ManagerOptions, RemoteReader, RemoteStat};
pub use provision::{sanitize_folder_name, FolderUsage, Layout, Provisioner, UsageSummary};
pub use retry::RetryPolicy;
pub use transport::{Channel, HostSpec, LocalTransport, SshOptions, SshTransport, Transport};
