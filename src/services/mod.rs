pub mod fx;
pub mod notifier;

pub use fx::{FxError, FxRateResolver, RateTier};
pub use notifier::Notifier;
