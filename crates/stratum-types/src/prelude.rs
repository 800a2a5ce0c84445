pub use crate::error::{ClResult, Error};
pub use crate::owner::Owner;
pub use crate::property::{Property, PropertySet};
pub use crate::types::{Index, Value};
pub use tracing::{debug, error, info, info_span, warn};

// vim: ts=4
