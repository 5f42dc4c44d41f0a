//! Typed client for the small slice of the bilibili web API that the
//! presence watcher depends on: a user's dynamics feed, their live-room
//! status, and their profile card. Requests that require it are WBI-signed.

pub mod client;
pub mod error;
pub mod models;
pub mod wbi;

pub use client::BiliClient;
pub use error::ApiError;
pub use models::{LiveRoomStatus, PostEntry, PostKind, UserProfile};
pub use wbi::WbiSigner;
