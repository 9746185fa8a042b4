// MEAL counter: indicator engine for child and adult participation sheets.
//
// The calculators (`structured`, `sessions`, `timeline`, `crosstab`,
// `quality`) work on a schema-free `types::Table` with exact column
// names; `columns` and `reports` map configured defaults onto the headers
// of a loaded workbook.
pub mod columns;
pub mod config;
pub mod crosstab;
pub mod entity;
pub mod error;
pub mod loader;
pub mod output;
pub mod quality;
pub mod reports;
pub mod sessions;
pub mod structured;
pub mod timeline;
pub mod types;
pub mod util;

pub use error::{ReportError, Result};
