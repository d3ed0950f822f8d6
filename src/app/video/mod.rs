//! Lecture video support
//!
//! - [`resolver`] - turns a player page into a direct download URL
//! - [`map`] - persisted record of resolved URLs per destination

pub mod map;
pub mod resolver;

pub use map::{VideoLookup, VideoUrlMap};
pub use resolver::{direct_video_url, extract_entry_id, VideoResolver};
