pub mod ab_test;
pub mod analytics;
pub mod diagnostics;
pub mod health_tip;
pub mod invite;
