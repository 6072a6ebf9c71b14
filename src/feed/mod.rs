//! RSS feed loading: parsing, normalization and the session that ties them
//! to the transport and cache.
//!
//! - [`parser`] - bytes → [`FeedDocument`] tree, collecting diagnostics
//! - [`normalize`] - `<item>` elements → [`FeedItem`] records
//! - [`session`] - [`FeedClient`] / [`FeedSession`], the fetch → parse → cache pipeline
//!
//! # Example
//!
//! ```no_run
//! use feedr::feed::{FeedClient, FeedRequest};
//!
//! let client = FeedClient::new()?;
//! let session = client.open(FeedRequest::new("/srv/feeds/news.xml"))?;
//! println!("{} items", session.items().len());
//! # Ok::<(), feedr::feed::FeedError>(())
//! ```

pub mod normalize;
pub mod parser;
mod session;

pub use normalize::{normalize_item, normalize_node, normalize_value, Enclosure, FeedItem};
pub use parser::{parse, Element, FeedDocument, InputEncoding, ParseError};
pub use session::{Channel, ChannelInfo, FeedClient, FeedError, FeedRequest, FeedSession};
