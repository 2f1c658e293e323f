mod outage_event;

pub use outage_event::{iso_local, to_iso_local, OutageEvent, FIELD_NAMES, ISO_LOCAL_FORMAT};
