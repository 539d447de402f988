//! Data models for the rescue backend.
//!
//! Wire names are camelCase; enum values are snake_case strings, matching the
//! mobile client.

mod case;
mod media;
mod notification;
mod pagination;
mod timeline;
mod user;
mod volunteer;

pub use case::*;
pub use media::*;
pub use notification::*;
pub use pagination::*;
pub use timeline::*;
pub use user::*;
pub use volunteer::*;
