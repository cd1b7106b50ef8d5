//! Headless wind map session.
//!
//! A [`WindSession`] ties the pieces together for one map surface:
//! viewport changes are debounced into grid rebuilds, pending grid points
//! are fetched from a [`WeatherFetcher`], and the resulting fields drive a
//! particle layer plus one optional scalar overlay.

pub mod config;
pub mod fetcher;
pub mod session;

pub use config::{MapConfig, SessionConfig, ViewerConfig};
pub use fetcher::{DataRequest, FetchError, RandomFetcher, Spread, WeatherFetcher};
pub use session::{Overlay, RefreshTicket, SessionError, Viewport, WindSession};
