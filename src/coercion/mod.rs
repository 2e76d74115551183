//! Value coercion.
//!
//! Turns dynamically-typed entity values into numeric samples, or rejects
//! them. A rejected value never fails a scrape; the entity is simply left
//! out of the exposition.

mod engine;

pub use engine::{Coercer, CoercionRules, MetricValue};
