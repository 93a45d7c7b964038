//! Usage metering handlers.

mod usage_metering;

pub use usage_metering::{RecordUsageCommand, UsageMeteringService};
