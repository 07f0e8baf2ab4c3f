//! Core domain types shared by every component

pub mod constant;
pub mod dataset;
pub mod error;
pub mod report;
pub mod worker;
