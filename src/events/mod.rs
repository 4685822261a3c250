pub mod interaction;
pub mod ready;

pub use interaction::{handle_component, register_verify_button, VERIFY_BUTTON_ID};
pub use ready::handle_ready;
