//! Pure anomaly detection over one polling batch of option quotes.
//!
//! Nothing in this crate performs I/O or looks at previous cycles: every
//! statistic is computed against the batch it is handed.

pub mod quote;
pub mod signal;

pub use quote::{ContractKey, OptionKind, OptionQuote, parse_expiration};
pub use signal::types::{PutCallRatioRecord, Sentiment, SignalRecord};
pub use signal::{SignalEngine, SignalSet, SignalThresholds};
