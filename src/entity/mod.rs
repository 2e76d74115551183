//! Entity model.
//!
//! Variables, devices and custom mappings as read from the controller at
//! scrape time. Nothing here is persisted by the exporter; every scrape
//! reads fresh entities from the configured source.

mod model;
mod value;

pub use model::{
    CustomMapping, Device, Variable, ERROR_STATUS, LAST_REPORTED_STATE, STATUS_STATE,
};
pub use value::{CompositeKind, RawValue};
