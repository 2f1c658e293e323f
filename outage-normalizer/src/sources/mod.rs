pub mod delimited_file;
pub mod discovery;
pub mod row;
pub mod spreadsheet_file;

pub use delimited_file::DelimitedFileSource;
pub use discovery::{discover, PeriodSource};
pub use row::{ColumnLabels, Field, NormalizedRow};
pub use spreadsheet_file::SpreadsheetFileSource;
