pub mod app;
pub mod config;
pub mod gridengine;
pub mod ui;
pub mod utils;
