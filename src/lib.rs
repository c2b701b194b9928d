pub mod audio;
pub mod cache;
pub mod cli;
pub mod config;
pub mod controller;
pub mod error;
pub mod grid;
pub mod importer;
pub mod logging;
pub mod models;
pub mod settings;
pub mod speech;
pub mod store;
pub mod ui;
