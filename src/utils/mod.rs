//! Small shared helpers.

pub mod data_url;
