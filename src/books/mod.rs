pub mod client;

pub use client::{DeleteOutcome, RecordClient, RecordError};
