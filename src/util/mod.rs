//! Utility functions for common operations.
//!
//! This module provides reusable utilities for:
//!
//! - **Target validation**: deciding whether a feed location is a URL or a local file
//! - **Text processing**: tag, high-bit and control character stripping for safe display
//!
//! # Examples
//!
//! ```
//! use feedr::util::{strip_control_chars, strip_tags, Target};
//!
//! let target = Target::parse("https://example.com/feed.xml").unwrap();
//! assert!(target.as_url().is_some());
//!
//! assert_eq!(strip_tags("<b>bold</b>"), "bold");
//! assert_eq!(strip_control_chars("a\x07b"), "ab");
//! ```

mod target;
mod text;

pub use target::{Target, TargetError};
pub use text::{strip_control_chars, strip_high, strip_tags};
