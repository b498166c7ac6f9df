//! Message-driven telemetry ingestion.
//!
//! The broker delivers at-least-once; everything here is written so
//! duplicates and redeliveries are harmless. [`validator`] turns raw
//! payloads into normalized readings (pure, no I/O), [`processor`] runs
//! the validate → persist → evaluate → notify pipeline for one message,
//! and [`consumer`] owns the AMQP plumbing: topology declaration,
//! worker loops and the ack/nack/dead-letter policy.

pub mod consumer;
pub mod processor;
pub mod validator;

#[cfg(test)]
mod tests;
