// Domain model (filters, events, streams) and validation
pub mod model;

// Static table schema declared to the host
pub mod schema;

// Row assembly and stream tree flattening
pub mod rows;

// Host runtime boundary
pub mod host;

// Persisted endpoint credentials
pub mod credentials;

// Configuration
pub mod config;

pub use model::{AccessInfo, Event, EventContent, Filter, FilterError, Stream};
pub use rows::OutputRow;
pub use schema::TableId;
