//! Row-to-record transforms: value cleaning, record building, augmentation.

pub mod augment;
pub mod clean;
pub mod record_builder;

pub use augment::Augmenter;
pub use clean::{clean_number, Outcome};
pub use record_builder::{BuildError, RecordBuilder};
