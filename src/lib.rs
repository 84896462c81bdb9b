pub mod ai;
pub mod app;
pub mod config;
pub mod images;
pub mod meals;
pub mod state;
pub mod storage;
