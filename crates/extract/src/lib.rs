//! Free-text field extraction: turns one raw chat message into a structured
//! `Intent`. Deterministic keyword scanning, no model calls.

pub mod lexicon;
pub mod parser;
pub mod score;

pub use lexicon::{treatment_for_message, Treatment, TREATMENTS};
pub use parser::MessageParser;
pub use score::{lead_score, LeadQuality};
