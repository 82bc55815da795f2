//! Application module: exposes the app model used by the TUI and runtime.
//!
//! The `App` model lives in `app::model` and holds the playlist, the list
//! cursor, input mode and the latest visualizer bins.

mod model;

pub use model::*;
