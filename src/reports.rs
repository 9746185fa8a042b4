// Report assembly: resolves the configured columns against each loaded
// sheet, runs every calculator and collects the output sheets.
//
// A section whose columns cannot be resolved is skipped with a warning and
// listed in `SummaryStats::skipped_sections`; the rest still run.
use crate::columns::{resolve_with_aliases, ColumnResolver};
use crate::config::{ColumnAlias, Config, SafeFamiliesColumns};
use crate::crosstab::{frequency_sheet, geography, status_by_gender, GeographyReport, GEO_LEVELS};
use crate::entity::Identity;
use crate::error::Result;
use crate::loader::Workbook;
use crate::quality::{child_duplicates, name_phone_conflicts, phone_name_conflicts, DuplicateColumns};
use crate::sessions::session_indicator;
use crate::structured::{structured_participation, Program};
use crate::timeline::{first_completion, first_cumulative, DatedProgram, Timeline};
use crate::types::{gender_pivot_sheet, GenderPivotRow, GenderScheme, MetricRow, Month, Sheet, SummaryStats, Table};
use tracing::{debug, info, warn};

const CHILD_SHEET: &str = "Child Info";
const ADULT_SHEET: &str = "Adult Info";

#[derive(Debug, Clone, Default)]
pub struct Report {
    pub sheets: Vec<Sheet>,
    pub summary: SummaryStats,
}

impl Report {
    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }
}

struct Assembly {
    report: Report,
}

impl Assembly {
    fn section<T>(&mut self, name: &str, build: impl FnOnce(&mut Vec<Sheet>) -> Result<T>) -> Option<T> {
        let mut sheets = Vec::new();
        match build(&mut sheets) {
            Ok(value) => {
                debug!(section = name, sheets = sheets.len(), "section built");
                self.report.sheets.extend(sheets);
                Some(value)
            }
            Err(e) => {
                warn!(section = name, error = %e, "section skipped");
                self.skip(name, &e.to_string());
                None
            }
        }
    }

    fn skip(&mut self, name: &str, reason: &str) {
        self.report.summary.skipped_sections.push(format!("{}: {}", name, reason));
    }
}

/// Builds every report sheet for `workbook`.
///
/// Fails only on an unparseable `export.month`; column problems skip the
/// affected section.
pub fn build_report(workbook: &Workbook, config: &Config) -> Result<Report> {
    let month: Option<Month> = config.export.month.as_deref().map(str::parse::<Month>).transpose()?;
    let mut asm = Assembly { report: Report::default() };
    asm.report.summary.child_rows = workbook.child.len();

    child_sections(&mut asm, &workbook.child, config, month);
    match &workbook.adult {
        Some(adult) => {
            asm.report.summary.adult_rows = adult.len();
            adult_sections(&mut asm, adult, config, month);
        }
        None => asm.skip("adult", "adult sheet not loaded"),
    }

    info!(
        sheets = asm.report.sheets.len(),
        skipped = asm.report.summary.skipped_sections.len(),
        "report assembled"
    );
    Ok(asm.report)
}

fn identity(resolver: &ColumnResolver, column: Option<&String>) -> Result<Identity> {
    match column {
        Some(c) if !c.trim().is_empty() => Ok(Identity::Column(resolver.require("identifier", c)?)),
        _ => Ok(Identity::Row),
    }
}

/// Listing columns that resolve; the rest are left out of the listing.
fn optional_fields(options: &[String], fields: &[(&'static str, &ColumnAlias)]) -> Vec<(&'static str, String)> {
    fields
        .iter()
        .filter_map(|(header, alias)| {
            resolve_with_aliases(options, &alias.aliases, alias.letter.as_deref()).map(|c| (*header, c))
        })
        .collect()
}

fn listing(
    timeline: &Timeline,
    name: &str,
    table: &Table,
    fields: &[(&'static str, String)],
    month: Option<Month>,
) -> Result<Sheet> {
    let pairs: Vec<(&str, &str)> = fields.iter().map(|(h, c)| (*h, c.as_str())).collect();
    timeline.listing(name, table, &pairs, month)
}

fn monthly_gender_sheets(sheets: &mut Vec<Sheet>, prefix: &str, timeline: &Timeline) {
    sheets.push(Sheet::from_tabled(&format!("{}_Monthly_Total", prefix), &timeline.monthly_total()));
    sheets.push(gender_pivot_sheet(
        &format!("{}_Monthly_Gender", prefix),
        &["Month"],
        timeline.scheme,
        &timeline.monthly_by_gender(),
    ));
}

fn safe_families(
    sheets: &mut Vec<Sheet>,
    resolver: &ColumnResolver,
    table: &Table,
    ident: &Identity,
    cols: &SafeFamiliesColumns,
    gender: &str,
    scheme: GenderScheme,
) -> Result<()> {
    let completed = resolver.require("safe families completed", &cols.completed)?;
    let date = resolver.require("safe families date", &cols.date)?;
    let program = DatedProgram::new("Safe Families", &completed, &date);
    let tl = first_completion(table, ident, &[program], gender, scheme)?;
    let (prefix, population) = match scheme {
        GenderScheme::Child => ("Safe_Families", "Children"),
        GenderScheme::Adult => ("Adult_SF", "Adults"),
    };
    sheets.push(gender_pivot_sheet(
        &format!("{}_Monthly_Gender", prefix),
        &["Month"],
        scheme,
        &tl.monthly_by_gender(),
    ));
    let mut summary = vec![MetricRow::new("Completed column", &completed), MetricRow::new("Date column", &date)];
    summary.extend(tl.summary_rows(population));
    sheets.push(Sheet::from_tabled(&format!("{}_Summary", prefix), &summary));
    Ok(())
}

fn child_sections(asm: &mut Assembly, child: &Table, config: &Config, month: Option<Month>) {
    let options = child.columns();
    let resolver = ColumnResolver::new(CHILD_SHEET, options);
    let q = &config.quality;
    let fields = optional_fields(
        options,
        &[
            ("Child Full Name", &q.child_name),
            ("Full Parent Name", &q.parent_name),
            ("Parents phone", &q.parent_phone),
            ("Settlement", &q.settlement),
        ],
    );
    let id_col = config.identity.child_id.as_ref();

    if let Some((n_total, n_any)) = asm.section("structured participation", |sheets| {
        let ident = identity(&resolver, id_col)?;
        let programs = config
            .structured
            .programs
            .iter()
            .map(|p| -> Result<Program> { Ok(Program::new(&p.name, &resolver.require(&p.name, &p.completed)?)) })
            .collect::<Result<Vec<_>>>()?;
        let r = structured_participation(child, &ident, &programs)?;
        sheets.push(Sheet::from_tabled("Structured_Summary", &r.summary_rows()));
        sheets.push(Sheet::from_tabled("Structured_Per_Program", &r.per_program));
        sheets.push(Sheet::from_tabled("Structured_Only_One", &r.only_one));
        sheets.push(Sheet::from_tabled("Structured_Combinations", &r.combinations));
        let export = r.export_view(child, config.export.filter);
        if export.len() > config.export.export_rows_limit {
            info!(rows = export.len(), limit = config.export.export_rows_limit, "export view truncated");
        }
        sheets.push(export.head(config.export.export_rows_limit));
        Ok((r.n_total, r.n_any))
    }) {
        asm.report.summary.children_considered = n_total;
        asm.report.summary.children_with_structured_program = n_any;
    }

    asm.section("structured timeline", |sheets| {
        let ident = identity(&resolver, id_col)?;
        let programs = config
            .structured
            .programs
            .iter()
            .map(|p| -> Result<DatedProgram> {
                Ok(DatedProgram::new(
                    &p.name,
                    &resolver.require(&p.name, &p.completed)?,
                    &resolver.require(&format!("{} date", p.name), &p.date)?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        let gender = resolver.require("gender", &config.child.gender)?;
        let tl = first_completion(child, &ident, &programs, &gender, GenderScheme::Child)?;
        monthly_gender_sheets(sheets, "Structured", &tl);
        sheets.push(Sheet::from_tabled("Structured_Monthly_By_Program", &tl.monthly_by_category()));
        sheets.push(gender_pivot_sheet(
            "Structured_Monthly_Prog_Gender",
            &["Month", "Program"],
            GenderScheme::Child,
            &tl.monthly_by_category_gender(),
        ));
        sheets.push(Sheet::from_tabled("Structured_Timeline_Summary", &tl.summary_rows("Children")));
        sheets.push(listing(&tl, "Structured_Achievers", child, &fields, month)?);
        Ok(())
    });

    let qualifying = asm.section("child session indicator", |sheets| {
        let ident = identity(&resolver, id_col)?;
        let sessions = resolver.require_all("child sessions", &config.child.sessions)?;
        let ind = session_indicator(child, &ident, &sessions)?;
        sheets.push(Sheet::from_tabled("CP_Summary", &ind.summary_rows("Children")));
        Ok(ind)
    });
    let cp_table = qualifying.map(|ind| {
        asm.report.summary.child_cp_indicator = ind.meeting();
        asm.report.summary.child_blank_identifiers = ind.blank_identifiers;
        ind.filter_table(child)
    });

    asm.section("child session timeline", |sheets| {
        let ident = identity(&resolver, id_col)?;
        let sessions = resolver.require_all("child sessions", &config.child.sessions)?;
        let date = resolver.require("child session date", &config.child.session_date)?;
        let gender = resolver.require("gender", &config.child.gender)?;
        let tl = first_cumulative(child, &ident, &sessions, &date, &gender, GenderScheme::Child)?;
        monthly_gender_sheets(sheets, "CP", &tl);
        sheets.push(Sheet::from_tabled("CP_Timeline_Summary", &tl.summary_rows("Children")));
        sheets.push(listing(&tl, "CP_Achievers", child, &fields, month)?);
        Ok(())
    });

    asm.section("child safe families", |sheets| {
        let ident = identity(&resolver, id_col)?;
        let gender = resolver.require("gender", &config.child.gender)?;
        safe_families(
            sheets,
            &resolver,
            child,
            &ident,
            &config.child.safe_families,
            &gender,
            GenderScheme::Child,
        )?;
        Ok(())
    });

    match cp_table {
        Some(cp) => breakdown_sections(asm, &cp, config),
        None => {
            for name in ["geography", "disability", "displacement"] {
                asm.skip(name, "child session indicator unavailable");
            }
        }
    }

    if let Some(conflicts) = asm.section("data quality", |sheets| {
        let col = |role: &str, alias: &ColumnAlias| resolver.require_any(role, &alias.aliases, alias.letter.as_deref());
        let parent = col("parent name", &q.parent_name)?;
        let phone = col("parent phone", &q.parent_phone)?;
        let by_name = name_phone_conflicts(child, &parent, &phone)?;
        let by_phone = phone_name_conflicts(child, &parent, &phone)?;
        let mut summary = by_name.summary_rows("Parent name", "phone");
        summary.extend(by_phone.summary_rows("Phone", "parent name"));
        sheets.push(by_name.sheet("DQ_Name_Multi_Phone", "Parent name", "Phone"));
        sheets.push(by_phone.sheet("DQ_Phone_Multi_Name", "Phone", "Parent name"));
        let mut found = by_name.conflicts.len() + by_phone.conflicts.len();

        let dup_cols = (|| -> Result<DuplicateColumns> {
            Ok(DuplicateColumns {
                child_name: col("child name", &q.child_name)?,
                settlement: col("settlement", &q.settlement)?,
                parent_name: parent.clone(),
                parent_phone: phone.clone(),
                date_of_birth: col("date of birth", &q.date_of_birth)?,
            })
        })();
        match dup_cols {
            Ok(cols) => {
                let dups = child_duplicates(child, &cols)?;
                summary.extend(dups.summary_rows());
                sheets.push(dups.sheet("DQ_Child_Duplicates"));
                found += dups.groups.len();
            }
            Err(e) => warn!(error = %e, "duplicate child check skipped"),
        }
        sheets.insert(0, Sheet::from_tabled("DQ_Summary", &summary));
        Ok(found)
    }) {
        asm.report.summary.data_quality_conflicts = conflicts;
    }
}

/// Geography, disability and displacement over the rows of children who
/// meet the session indicator.
fn breakdown_sections(asm: &mut Assembly, cp: &Table, config: &Config) {
    let resolver = ColumnResolver::new(CHILD_SHEET, cp.columns());
    let id_col = config.identity.child_id.as_ref();

    asm.section("geography", |sheets| {
        let ident = identity(&resolver, id_col)?;
        let cols: Vec<String> = GEO_LEVELS
            .iter()
            .zip(&config.child.geography)
            .map(|(level, default)| resolver.require(level, default))
            .collect::<Result<_>>()?;
        let cols: [String; 4] = [cols[0].clone(), cols[1].clone(), cols[2].clone(), cols[3].clone()];
        let g = geography(cp, &ident, &cols)?;
        for (level, name) in GEO_LEVELS.iter().enumerate() {
            sheets.push(g.level_sheet(&format!("Geo_By_{}", name), level, "Children"));
        }
        sheets.push(GeographyReport::path_sheet("Geo_Oblast_Raion", 2, "Children", &g.by_top_sub));
        sheets.push(GeographyReport::path_sheet("Geo_Full_Path", 4, "Children", &g.by_full_path));
        let mut summary = vec![MetricRow::new("Children with >=2 sessions", g.n_total())];
        for (level, name) in GEO_LEVELS.iter().enumerate() {
            summary.push(MetricRow::new(&format!("Distinct {}", name), g.distinct(level)));
        }
        sheets.push(Sheet::from_tabled("Geo_Summary", &summary));
        if let Some(top) = &config.export.top_region {
            sheets.push(GeographyReport::path_sheet("Geo_Top_Raion", 2, "Children", &g.top_sub_in(top)));
            sheets.push(GeographyReport::path_sheet("Geo_Top_Full_Path", 4, "Children", &g.full_path_in(top)));
        }
        Ok(())
    });

    asm.section("disability", |sheets| {
        let ident = identity(&resolver, id_col)?;
        let status = resolver.require("disability", &config.child.disability)?;
        let gender = resolver.require("gender", &config.child.gender)?;
        let r = status_by_gender(cp, &ident, &status, &gender, GenderScheme::Child)?;
        sheets.push(frequency_sheet("Disability_Total", "Disability status", "Children", &r.totals));
        sheets.push(gender_pivot_sheet("Disability_By_Gender", &["Disability status"], r.scheme, &r.by_gender));
        let yes = GenderPivotRow { keys: vec!["yes".to_string()], split: r.split_for("yes") };
        sheets.push(gender_pivot_sheet("Disability_Yes_By_Gender", &["Disability status"], r.scheme, &[yes]));
        Ok(())
    });

    asm.section("displacement", |sheets| {
        let ident = identity(&resolver, id_col)?;
        let status = resolver.require("displacement", &config.child.displacement)?;
        let gender = resolver.require("gender", &config.child.gender)?;
        let r = status_by_gender(cp, &ident, &status, &gender, GenderScheme::Child)?;
        sheets.push(frequency_sheet("IDP_Status_Total", "Status IDP", "Children", &r.totals));
        sheets.push(gender_pivot_sheet("IDP_Status_By_Gender", &["Status IDP"], r.scheme, &r.by_gender));
        Ok(())
    });
}

fn adult_sections(asm: &mut Assembly, adult: &Table, config: &Config, month: Option<Month>) {
    let options = adult.columns();
    let resolver = ColumnResolver::new(ADULT_SHEET, options);
    let fields = optional_fields(options, &[("Full Name", &config.adult.full_name)]);
    let id_col = config.identity.adult_id.as_ref();

    if let Some(ind) = asm.section("adult session indicator", |sheets| {
        let ident = identity(&resolver, id_col)?;
        let sessions = resolver.require_all("adult sessions", &config.adult.sessions)?;
        let ind = session_indicator(adult, &ident, &sessions)?;
        sheets.push(Sheet::from_tabled("Adult_CP_Summary", &ind.summary_rows("Adults")));
        Ok(ind)
    }) {
        asm.report.summary.adults_considered = ind.considered();
        asm.report.summary.adult_cp_indicator = ind.meeting();
        asm.report.summary.adult_blank_identifiers = ind.blank_identifiers;
    }

    asm.section("adult session timeline", |sheets| {
        let ident = identity(&resolver, id_col)?;
        let sessions = resolver.require_all("adult sessions", &config.adult.sessions)?;
        let date = resolver.require("adult session date", &config.adult.session_date)?;
        let gender = resolver.require("gender", &config.adult.gender)?;
        let tl = first_cumulative(adult, &ident, &sessions, &date, &gender, GenderScheme::Adult)?;
        monthly_gender_sheets(sheets, "Adult_CP", &tl);
        sheets.push(Sheet::from_tabled("Adult_CP_Timeline_Summary", &tl.summary_rows("Adults")));
        sheets.push(listing(&tl, "Adult_CP_Achievers", adult, &fields, month)?);
        Ok(())
    });

    asm.section("adult safe families", |sheets| {
        let ident = identity(&resolver, id_col)?;
        let gender = resolver.require("gender", &config.adult.gender)?;
        safe_families(
            sheets,
            &resolver,
            adult,
            &ident,
            &config.adult.safe_families,
            &gender,
            GenderScheme::Adult,
        )?;
        Ok(())
    });
}
