//! Core acquisition pipeline: session lifecycle, export jobs, extraction,
//! aggregation, and the retry orchestrator that ties them together.

pub mod aggregate;
pub mod automation;
pub mod export;
pub mod extract;
pub mod http;
pub mod logging;
pub mod models;
pub mod orchestrator;
pub mod session;
pub mod utility;
pub mod webdriver;
