//! Casebook library
//!
//! Case management core for a small law office: untrusted JSON is hydrated
//! into typed models, held in a single-writer local store, persisted to
//! SQLite and synchronized with a hosted remote store.

pub mod app;
pub mod calendar;
pub mod cli;
pub mod config;
pub mod database;
pub mod error;
pub mod hydration;
pub mod models;
pub mod postponement;
pub mod services;
pub mod store;
pub mod sync;
