pub mod menu;

pub use menu::{render_response, Menu};
