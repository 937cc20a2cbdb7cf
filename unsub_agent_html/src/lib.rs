//! # Unsub Agent HTML
//!
//! HTML processing utilities for unsub_agent: prompt cleaning, byte-bounded
//! truncation, unsubscribe link discovery and text extraction.
//!
//! Uses `lol_html` for fast, streaming HTML rewriting.
//!
//! ## Dependencies
//!
//! - `lol_html` — streaming HTML rewriter
//! - `aho-corasick` — unsubscribe wording match

mod anchors;
mod cleaning;
mod text;

pub use anchors::{best_unsubscribe_link, find_unsubscribe_links, is_http_url, UnsubscribeLink};
pub use cleaning::{clean_html_for_analysis, clean_html_slim, truncate_html};
pub use text::html_to_text;
