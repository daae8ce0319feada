pub mod annotation;
pub mod app;
pub mod codec;
pub mod config;
pub mod domain;
pub mod error;
pub mod fs_util;
pub mod ingest;
pub mod output;
pub mod query;
pub mod registry;
pub mod store;
