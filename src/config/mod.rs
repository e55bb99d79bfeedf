pub mod ai;
pub mod app;
