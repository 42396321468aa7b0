//! Request handlers.

pub mod health;
pub mod jobs;
pub mod ui;
pub mod voices;

pub use health::*;
pub use jobs::*;
pub use ui::*;
pub use voices::*;
