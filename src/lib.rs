// src/lib.rs — Library root for pagecap

pub mod capture;
pub mod cli;
pub mod infra;
pub mod integrations;
pub mod store;
