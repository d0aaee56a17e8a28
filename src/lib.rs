//! Tessera: fragment render cache with dependency-tracked invalidation.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
