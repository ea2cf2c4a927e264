mod handler;
mod model;

pub use handler::{create_tip, delete_tip, list_tips, update_tip};
