// Entry point and high-level CLI flow.
//
// - Option [1] loads the workbook and prints load diagnostics.
// - Option [2] builds every report sheet, writes them as CSV files plus a
//   JSON summary and previews the headline tables.
// - `--batch` runs both steps once without prompting.
use anyhow::{Context, Result};
use clap::Parser;
use meal_counter::config::Config;
use meal_counter::loader::{self, Workbook};
use meal_counter::output;
use meal_counter::reports;
use meal_counter::structured::ExportFilter;
use meal_counter::util::format_int;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "meal-counter", about = "Counts MEAL indicators from child and adult participation sheets")]
struct Cli {
    /// Workbook (.xlsx, .xls, .ods) or CSV file with the child sheet
    input: PathBuf,

    /// Configuration file; written with defaults when absent
    #[arg(long, default_value = "meal-counter.toml")]
    config: PathBuf,

    /// Directory receiving one CSV per report sheet
    #[arg(long)]
    output: Option<PathBuf>,

    #[arg(long)]
    child_sheet: Option<String>,

    #[arg(long)]
    adult_sheet: Option<String>,

    /// Identifier column grouping child rows into one child
    #[arg(long)]
    child_id: Option<String>,

    /// Identifier column grouping adult rows into one adult
    #[arg(long)]
    adult_id: Option<String>,

    /// Adult table as a separate CSV when the input is a CSV
    #[arg(long)]
    adult_csv: Option<String>,

    /// Limit achiever listings to one month (YYYY-MM)
    #[arg(long)]
    month: Option<String>,

    /// Oblast to break down by raion and full path
    #[arg(long)]
    region: Option<String>,

    #[arg(long, value_enum)]
    filter: Option<FilterArg>,

    /// Load and generate once, without the menu
    #[arg(long)]
    batch: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FilterArg {
    All,
    AtLeastOne,
    NoProgram,
    TwoOrMore,
    ExactlyOne,
}

impl From<FilterArg> for ExportFilter {
    fn from(f: FilterArg) -> Self {
        match f {
            FilterArg::All => ExportFilter::All,
            FilterArg::AtLeastOne => ExportFilter::AtLeastOne,
            FilterArg::NoProgram => ExportFilter::NoProgram,
            FilterArg::TwoOrMore => ExportFilter::TwoOrMore,
            FilterArg::ExactlyOne => ExportFilter::ExactlyOne,
        }
    }
}

/// What one run keeps between menu choices: the loaded workbook is reused
/// by every report generation.
struct Session {
    input: PathBuf,
    config: Config,
    data: Option<Workbook>,
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = if cli.config.exists() {
        Config::load_from_file(&cli.config)
            .with_context(|| format!("failed to read config {}", cli.config.display()))?
    } else {
        let config = Config::default();
        config
            .save_to_file(&cli.config)
            .with_context(|| format!("failed to write default config {}", cli.config.display()))?;
        info!(path = %cli.config.display(), "default configuration written");
        config
    };

    if let Some(s) = &cli.child_sheet {
        config.sheets.child = s.clone();
    }
    if let Some(s) = &cli.adult_sheet {
        config.sheets.adult = s.clone();
    }
    if cli.adult_csv.is_some() {
        config.sheets.adult_csv = cli.adult_csv.clone();
    }
    if cli.child_id.is_some() {
        config.identity.child_id = cli.child_id.clone();
    }
    if cli.adult_id.is_some() {
        config.identity.adult_id = cli.adult_id.clone();
    }
    if cli.month.is_some() {
        config.export.month = cli.month.clone();
    }
    if cli.region.is_some() {
        config.export.top_region = cli.region.clone();
    }
    if let Some(f) = cli.filter {
        config.export.filter = f.into();
    }
    if let Some(o) = &cli.output {
        config.export.output_directory = o.to_string_lossy().into_owned();
    }
    Ok(config)
}

/// Read a single line of input after printing the common "Enter choice:" prompt.
fn read_choice() -> String {
    print!("Enter choice: ");
    let _ = io::stdout().flush();
    let mut buf = String::new();
    io::stdin().read_line(&mut buf).ok();
    buf.trim().to_string()
}

/// Returns `true` if the user chose `Y`, `false` if they chose `N`.
fn prompt_back_to_menu() -> bool {
    loop {
        print!("Back to Report Selection (Y/N): ");
        let _ = io::stdout().flush();
        let mut buf = String::new();
        io::stdin().read_line(&mut buf).ok();
        match buf.trim().to_uppercase().as_str() {
            "Y" => return true,
            "N" => return false,
            _ => println!("Invalid choice. Please enter Y or N."),
        }
    }
}

impl Session {
    /// Option [1]: load the workbook and keep it for later report runs.
    fn handle_load(&mut self) -> Result<()> {
        let (data, report) = loader::load_workbook(&self.input, &self.config.sheets)
            .with_context(|| format!("failed to load {}", self.input.display()))?;
        println!(
            "Processing workbook... ({} child rows, {} adult rows loaded)",
            format_int(report.child_rows),
            format_int(report.adult_rows)
        );
        if data.adult.is_none() {
            println!("Note: no adult sheet found; adult indicators will be skipped.");
        }
        if report.blank_rows > 0 {
            println!("Note: {} blank rows skipped.", format_int(report.blank_rows));
        }
        if report.renamed_headers > 0 {
            println!("Info: {} repeated headers renamed to NAME__N.", format_int(report.renamed_headers));
        }
        println!();
        self.data = Some(data);
        Ok(())
    }

    /// Option [2]: build, write and preview every report sheet.
    fn handle_generate_reports(&self) -> Result<()> {
        let Some(data) = &self.data else {
            println!("Error: No data loaded. Please load the file first (option 1).\n");
            return Ok(());
        };

        println!("Generating reports...");
        let report = reports::build_report(data, &self.config).context("failed to build reports")?;
        let dir = Path::new(&self.config.export.output_directory);
        let written = output::write_sheets(dir, &report.sheets)
            .with_context(|| format!("failed to write sheets to {}", dir.display()))?;
        let summary_path = dir.join("summary.json");
        output::write_json(&summary_path, &report.summary).context("failed to write summary.json")?;
        println!("Outputs saved to {} ({} sheets)...\n", dir.display(), written.len());

        let previews = [
            ("Structured_Summary", "Structured Program Participation"),
            ("CP_Summary", "Children with >=2 Sessions"),
            ("Adult_CP_Summary", "Adults with >=2 Sessions"),
            ("Geo_By_Oblast", "Children with >=2 Sessions by Oblast"),
            ("Disability_By_Gender", "Disability Status by Gender"),
            ("IDP_Status_By_Gender", "Displacement Status by Gender"),
            ("DQ_Summary", "Data Quality Checks"),
        ];
        for (name, title) in previews {
            if let Some(sheet) = report.sheet(name) {
                output::preview_sheet(title, sheet, 8);
            }
        }

        for skipped in &report.summary.skipped_sections {
            println!("Skipped: {}", skipped);
        }
        println!("\nSummary Stats (summary.json):");
        println!("{}\n", serde_json::to_string(&report.summary)?);
        Ok(())
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let mut session = Session { input: cli.input.clone(), config, data: None };

    if cli.batch {
        session.handle_load()?;
        return session.handle_generate_reports();
    }

    loop {
        println!("Select an option:");
        println!("[1] Load the file");
        println!("[2] Generate Reports\n");
        match read_choice().as_str() {
            "1" => {
                if let Err(e) = session.handle_load() {
                    eprintln!("Failed to load file: {:#}\n", e);
                }
            }
            "2" => {
                println!();
                if let Err(e) = session.handle_generate_reports() {
                    eprintln!("Report error: {:#}\n", e);
                }
                if !prompt_back_to_menu() {
                    println!("Exiting the program.");
                    break;
                }
            }
            _ => {
                println!("Invalid choice. Please enter 1 or 2.\n");
            }
        }
    }
    Ok(())
}
