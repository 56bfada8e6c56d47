//! Storage seams and the how-to workflow built on top of them.

pub mod document_store;
pub mod howto_store;
pub mod local_object_store;
pub mod object_store;
pub mod sqlite_document_store;

#[cfg(test)]
pub(crate) mod testing;
