//! Artifact acquisition for loadprep.
//!
//! Provisioning pulls pre-built binaries, archives and repository keys from
//! the network. Everything here is built around two guarantees:
//!
//! - **Bounded**: every transfer is limited by a [`RetryPolicy`] (attempt cap,
//!   connect timeout, per-attempt timeout, backoff) and never blocks forever.
//! - **Atomic**: a destination path only ever holds a complete artifact. Bytes
//!   land in a hidden `.part` file first and are renamed into place.
//!
//! The network is reached through the [`Transport`] trait so the retry loop
//! can be exercised without sockets.
//!
//! ## Modules
//!
//! - `artifact`: artifact descriptors and kinds
//! - `policy`: retry and backoff configuration
//! - `transport`: the transport seam and its reqwest implementation
//! - `fetcher`: the retry loop and atomic persistence
//! - `archive`: tar / tar.gz unpacking (never retried)

pub mod archive;
pub mod artifact;
pub mod error;
pub mod fetcher;
pub mod policy;
pub mod transport;

pub use archive::unpack;
pub use artifact::{ArtifactDescriptor, ArtifactKind};
pub use error::{FetchError, TransportError, UnpackError};
pub use fetcher::ArtifactFetcher;
pub use policy::{BackoffPolicy, RetryPolicy};
pub use transport::{HttpTransport, Transport};
