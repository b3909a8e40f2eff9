//! Common test infrastructure
//!
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{TestLibrary, ROCK_GENRE};
//!
//! #[test]
//! fn test_rock_albums() {
//!     let library = TestLibrary::seeded();
//!     assert!(library.store.get_genre_id(ROCK_GENRE).is_some());
//! }
//! ```

mod constants;
mod fixtures;

pub use constants::*;
#[allow(unused_imports)]
pub use fixtures::{new_song, TestLibrary};
