// Diagnosis sessions: scoring engine, session lifecycle, persistence and HTTP handlers.

pub mod handlers;
pub mod lifecycle;
pub mod pg_store;
pub mod scoring;
pub mod store;

#[cfg(test)]
pub mod testing;
