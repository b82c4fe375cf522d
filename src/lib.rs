pub mod cli;
pub mod config;
pub mod credentials;
pub mod download;
pub mod pipeline;
pub mod poll;
pub mod report;
pub mod selection;
pub mod service;
pub mod util;
pub mod window;
pub mod xml;
