pub use serde_json::json;
pub use stratum_core::prelude::*;
pub use stratum_types::props;

// vim: ts=4
