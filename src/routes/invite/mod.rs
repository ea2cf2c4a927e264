mod handler;

pub use handler::{history, send_invite};
