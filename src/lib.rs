pub mod client;
pub mod config;
pub mod domain;
pub mod error;
pub mod event;
pub mod feed;
pub mod repository;
pub mod service;
pub mod test_utils;
