//! Types and pure helpers shared by the moodwalk client crates.

pub mod address;
pub mod config;
pub mod geo;
pub mod protocol;
pub mod timefmt;
