pub mod price;
pub mod pubsub;

pub use price::PriceSample;
pub use pubsub::{RegistryStats, RetentionPolicy, SymbolStreamRegistry};
