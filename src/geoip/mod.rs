//! Client address to region resolution.

mod error;
mod prefix;
mod ranges;
mod trie;

pub use error::Error;
pub use prefix::{Prefix, PrefixEntry};
pub use ranges::load_ranges;
pub use trie::RegionTrie;
