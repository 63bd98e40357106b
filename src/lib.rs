//! Assetflow - incremental front-end asset pipeline
//!
//! This library provides functionality to:
//! - Compile named asset classes (fonts, images, scripts, styles, views) into a build root
//! - Re-run only changed files for incremental classes
//! - Watch sources and re-run only the affected class on change
//! - Notify connected clients through a live-reload endpoint

pub mod build;
pub mod cli;
pub mod config;
pub mod reload;
pub mod transforms;
pub mod watch;
