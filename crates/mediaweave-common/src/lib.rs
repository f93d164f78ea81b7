//! Mediaweave-Common: Shared types, keys, and errors.
//!
//! This crate provides the value types passed between the broker, the source
//! registry, and individual provider plugins:
//!
//! - **Operation IDs**: Monotonic identifiers for in-flight broker operations
//! - **Metadata keys**: Well-known [`KeyId`]s and their absolute value limits
//! - **Media records**: The keyed [`Media`] container exchanged with providers
//! - **Flags**: Supported operations, resolution flags, and type filters
//! - **Error Handling**: Broker and provider error types and result aliases
//!
//! # Examples
//!
//! ```
//! use mediaweave_common::{keys, Media, MediaKind, ResolutionFlags};
//!
//! let mut media = Media::new(MediaKind::Audio);
//! media.set_id("track-1");
//! media.set(keys::TITLE, "Blue in Green");
//!
//! assert_eq!(media.title(), Some("Blue in Green"));
//! assert!(ResolutionFlags::FULL.contains(ResolutionFlags::FULL));
//! ```

pub mod error;
pub mod ids;
pub mod keys;
pub mod media;
pub mod types;

pub use error::{BrokerError, ErrorCode, ProviderError, Result};
pub use ids::OperationId;
pub use keys::KeyId;
pub use media::Media;
pub use types::*;
