pub use stratum_types::prelude::*;
pub use stratum_types::types::display_value;

// vim: ts=4
