mod handler;
mod model;

pub use handler::sms_analytics;
