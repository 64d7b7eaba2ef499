pub mod document;
pub mod domain;
pub mod error;
