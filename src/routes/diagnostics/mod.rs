mod handler;

pub use handler::test_db;
