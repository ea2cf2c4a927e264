mod handler;
mod model;

pub use handler::{complete_test, create_test, list_tests};
