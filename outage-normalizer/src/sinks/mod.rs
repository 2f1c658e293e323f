pub mod csv_file;
pub mod report;

pub use csv_file::{output_path, CsvFileSink};
pub use report::format_outage_table;
