//! Gestion-commerciale service
//!
//! Receiver side of the funding-request choreography: consumes
//! `funding.request.created`, opens a dossier with its own identifiers, and
//! answers with exactly one terminal event per business reference:
//! `funding.request.acknowledged` or `funding.request.error`.

pub mod config;
pub mod handlers;
pub mod registry;
