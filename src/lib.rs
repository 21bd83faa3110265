//! Dura Bulk image sorter
//!
//! This library provides the classification core of the dura-bulk-sorter
//! service: vessel detection and hull-text recognition through Cloudflare
//! Workers AI, fuzzy matching of the recognized text, and the background
//! batch pipeline that sorts images into Dura Bulk / other partitions while
//! exposing live progress to polling clients.

pub mod app_state;
pub mod config;
pub mod models;
pub mod routes;
pub mod services;
