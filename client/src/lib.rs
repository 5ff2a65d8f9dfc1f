//! Headless client core for the moodwalk recommendation service.
//!
//! Every external collaborator (identity provider, device geolocation,
//! reverse geocoder, map drawing surface, chat document store, local
//! persistence, page router) is reached through a trait so that the
//! orchestration here can run against real adapters or test fakes.

pub mod api;
pub mod auth;
pub mod community;
pub mod coupons;
pub mod error;
pub mod firebase;
pub mod history;
pub mod kakao;
pub mod location;
pub mod map;
pub mod nav;
pub mod orchestrator;
pub mod profile;
pub mod results;
pub mod store;

pub use error::ClientError;
