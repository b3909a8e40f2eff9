//! Shared constants for integration tests
//!
//! When the seeded library changes, update only this file and the fixtures.

// ============================================================================
// Artists
// ============================================================================

pub const BAND_NAME: &str = "The Test Band";
pub const BAND_MBID: &str = "mbid-test-band";

pub const SINGER_NAME: &str = "Solo Singer";

pub const COMPOSER_NAME: &str = "Old Composer";
pub const COMPOSER_ROLE: &str = "composer";

// ============================================================================
// Albums
// ============================================================================

pub const ALBUM_1_TITLE: &str = "First Light";
pub const ALBUM_2_TITLE: &str = "Second Wind";

// ============================================================================
// Genres
// ============================================================================

pub const ROCK_GENRE: &str = "Rock";
pub const JAZZ_GENRE: &str = "Jazz";
