//! HTTP handlers for docshelf-api.

pub mod connection;
pub mod documents;
pub mod folders;
pub mod fragments;
