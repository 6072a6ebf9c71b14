//! Fetch, parse, normalize and cache RSS feeds.
//!
//! A [`FeedSession`] is built from a [`FeedRequest`] naming a URL or a local
//! file. Construction either yields a fully parsed feed or a [`FeedError`];
//! once built, accessors never fail.

pub mod cache;
pub mod config;
pub mod feed;
pub mod transport;
pub mod util;

pub use feed::{
    Channel, ChannelInfo, Enclosure, FeedClient, FeedError, FeedItem, FeedRequest, FeedSession,
};
