//! Localization pipeline for game-data XML: extract text nodes under stable positional
//! addresses, translate them through pluggable providers (with a resumable, checkpointed batch
//! mode), review them in a table, and write them back without touching the rest of the file.

pub mod batch;
pub mod config;
pub mod error;
pub mod exchange;
pub mod glossary;
pub mod ir;
pub mod pipeline;
pub mod progress;
pub mod providers;
pub mod table;
pub mod targets;
pub mod textutil;
pub mod xml;
