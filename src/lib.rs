//! Swim school progress tracking: skill matrix, overall level, next-focus
//! recommendations and achievement badges, scoped per tenant and student.

pub mod badges;
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod models;
pub mod progress;
pub mod recommend;
pub mod report;
pub mod store;
