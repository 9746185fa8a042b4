// Report configuration: sheet names, identifier columns and the default
// column name for every semantic role. Stored as TOML.
use crate::error::Result;
use crate::structured::ExportFilter;
use crate::timeline::DatedProgram;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub sheets: SheetConfig,
    pub identity: IdentityConfig,
    pub structured: StructuredConfig,
    pub child: ChildColumns,
    pub adult: AdultColumns,
    pub quality: QualityColumns,
    pub export: ExportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetConfig {
    pub child: String,
    pub adult: String,
    /// Adult table when the child input is a CSV file.
    pub adult_csv: Option<String>,
}

impl Default for SheetConfig {
    fn default() -> Self {
        Self { child: "Child Info".to_string(), adult: "Adult Info".to_string(), adult_csv: None }
    }
}

/// Optional identifier columns; unset means one row per individual.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct IdentityConfig {
    pub child_id: Option<String>,
    pub adult_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StructuredConfig {
    pub programs: Vec<DatedProgram>,
}

impl Default for StructuredConfig {
    fn default() -> Self {
        Self {
            programs: vec![
                DatedProgram::new("TEAM_UP", "TEAM_UP Completed", "TEAM_UP Completed (12) Date"),
                DatedProgram::new("HEART", "HEART Completed", "HEART Completed (10) Date"),
                DatedProgram::new("CYR", "CYR Completed", "CYR Completed (10) Date"),
                DatedProgram::new("ISMF", "ISMF Completed", "ISMF Completed (10) Date"),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SafeFamiliesColumns {
    pub completed: String,
    pub date: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChildColumns {
    pub gender: String,
    /// Activity session columns summed for the services indicator.
    pub sessions: Vec<String>,
    pub session_date: String,
    pub safe_families: SafeFamiliesColumns,
    /// Oblast, raion, hromada, settlement.
    pub geography: [String; 4],
    pub disability: String,
    pub displacement: String,
}

impl Default for ChildColumns {
    fn default() -> Self {
        Self {
            gender: "Gender".to_string(),
            sessions: [
                "TEAM_UP",
                "HEART",
                "CYR",
                "ISMF",
                "SF + JSWP",
                "Recreational Activity",
                "Informal Education Activity",
                "EORE",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            session_date: "Date".to_string(),
            safe_families: SafeFamiliesColumns {
                completed: "SF + JSWP Completed (5)".to_string(),
                date: "SF + JSWP Completed (5) Date".to_string(),
            },
            geography: [
                "Oblast".to_string(),
                "Raion".to_string(),
                "Hromada".to_string(),
                "Settlement".to_string(),
            ],
            disability: "Disability status".to_string(),
            displacement: "Status IDP".to_string(),
        }
    }
}

/// A role found by trying several header names, then a spreadsheet letter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnAlias {
    pub aliases: Vec<String>,
    pub letter: Option<String>,
}

impl ColumnAlias {
    pub fn new(aliases: &[&str], letter: Option<&str>) -> Self {
        Self {
            aliases: aliases.iter().map(|s| s.to_string()).collect(),
            letter: letter.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdultColumns {
    pub gender: String,
    pub sessions: Vec<String>,
    pub session_date: String,
    pub safe_families: SafeFamiliesColumns,
    pub full_name: ColumnAlias,
}

impl Default for AdultColumns {
    fn default() -> Self {
        Self {
            gender: "Gender".to_string(),
            sessions: vec!["Safe Families".to_string(), "Unstructured MHPSS Activities".to_string()],
            session_date: "Attendance 2nd Date".to_string(),
            safe_families: SafeFamiliesColumns {
                completed: "SF Completed (5)".to_string(),
                date: "SF Completed (5) Date".to_string(),
            },
            full_name: ColumnAlias::new(&["Full Name", "Adult Full Name", "Name"], Some("M")),
        }
    }
}

/// Child-sheet columns for the data-quality checks and achiever listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityColumns {
    pub child_name: ColumnAlias,
    pub settlement: ColumnAlias,
    pub parent_name: ColumnAlias,
    pub parent_phone: ColumnAlias,
    pub date_of_birth: ColumnAlias,
}

impl Default for QualityColumns {
    fn default() -> Self {
        Self {
            // Second alias starts with a Cyrillic "С" as found in some source files.
            child_name: ColumnAlias::new(&["Child Full Name", "Сhild Full Name"], Some("O")),
            settlement: ColumnAlias::new(&["Settlement"], Some("G")),
            parent_name: ColumnAlias::new(&["Full Parent Name"], Some("K")),
            parent_phone: ColumnAlias::new(&["Parents phone", "Parent phone", "Phone"], Some("L")),
            date_of_birth: ColumnAlias::new(&["Date of birth", "Date of Birth"], Some("P")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub filter: ExportFilter,
    pub output_directory: String,
    /// Cap on rows in the structured export sheet.
    pub export_rows_limit: usize,
    /// Restricts achiever listings to one `YYYY-MM` month.
    pub month: Option<String>,
    /// Oblast whose raion and full-path breakdowns get their own sheets.
    pub top_region: Option<String>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            filter: ExportFilter::All,
            output_directory: "output".to_string(),
            export_rows_limit: 5000,
            month: None,
            top_region: None,
        }
    }
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
