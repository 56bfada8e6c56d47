//! How-to publishing service: compose a multi-step article with images and
//! attachments, store the blobs, persist the article, browse and search it.

pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
