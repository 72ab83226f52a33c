//! Tender Tracker - role-based tracking of tenders, milestones and field progress reports.
//!
//! This library provides the core components for the tracker server.

pub mod api;
pub mod auth;
pub mod config;
pub mod entity;
pub mod error;
pub mod manager;
pub mod photos;
pub mod policy;
pub mod seed;
pub mod views;

#[cfg(test)]
pub(crate) mod testing;
