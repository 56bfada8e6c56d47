//! Core data models for the how-to service.
//!
//! `object` maps the SQLite row of a stored blob, `file_meta` is the
//! descriptor handed back to callers once an upload completes, and `howto`
//! holds the article document together with its form input.

pub mod document;
pub mod file_meta;
pub mod howto;
pub mod object;
pub mod upload_status;
