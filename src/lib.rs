pub mod app;
pub mod buildings;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod download;
pub mod error;
pub mod fs_util;
pub mod listing;
pub mod locator;
pub mod metadata;
pub mod output;
pub mod store;
