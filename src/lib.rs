pub mod activation;
pub mod archive;
pub mod build;
pub mod cleanup;
pub mod commands;
pub mod download;
pub mod error;
pub mod family;
pub mod fetch;
pub mod git;
pub mod github;
pub mod http;
pub mod progress;
pub mod runtime;
pub mod version;
