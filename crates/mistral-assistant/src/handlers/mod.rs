//! HTTP request handlers.

mod health;
mod ui;
pub mod v1;
mod version;

pub use health::{livez, readyz};
pub use ui::index;
pub use version::version;
