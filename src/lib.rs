// Library exports for the expression booth

pub mod booth;
pub mod camera;
pub mod capture;
pub mod config;
pub mod detection;
pub mod emotion;
pub mod error;
pub mod logging;
pub mod models;
pub mod render;
pub mod session;
pub mod ui;

#[cfg(test)]
mod testing;
