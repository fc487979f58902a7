// ABOUTME: Library crate for Signoff-in-a-Box exposing the signoff workflow and markdown renderer

pub mod config;
pub mod docker;
pub mod git;
pub mod markdown;
pub mod models;
pub mod sandbox;
pub mod signoff;
