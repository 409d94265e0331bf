//! V1 API handlers.

mod examples;
mod sessions;

pub use examples::list_examples;
pub use sessions::{create_session, get_session, send_message};
