// Maps configured default column names onto the headers actually present in
// a sheet. This is caller-side plumbing: the calculators only ever receive
// exact header names.
use crate::error::{ReportError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("static regex"));

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

fn canonical(name: &str) -> String {
    NON_ALNUM.replace_all(&normalize(name), "").into_owned()
}

/// Zero-based column index of a spreadsheet letter (`A` = 0, `AL` = 37).
/// `None` when there are no letters or the index does not fit a `usize`.
pub fn letter_index(letter: &str) -> Option<usize> {
    let n = letter
        .trim()
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_uppercase())
        .try_fold(0usize, |acc, c| acc.checked_mul(26)?.checked_add(c as usize - 'A' as usize + 1))?;
    n.checked_sub(1)
}

/// Finds the header for `target`: exact (case-insensitive) or a `target__N`
/// duplicate, then the same ignoring punctuation and spacing, then a
/// punctuation-free substring match.
pub fn resolve_column(options: &[String], target: &str) -> Option<String> {
    let t = normalize(target);
    let dup_prefix = format!("{}__", t);
    if let Some(c) = options.iter().find(|c| {
        let n = normalize(c);
        n == t || n.starts_with(&dup_prefix)
    }) {
        return Some(c.clone());
    }
    let tc = canonical(target);
    if tc.is_empty() {
        return None;
    }
    options
        .iter()
        .find(|c| canonical(c) == tc)
        .or_else(|| options.iter().find(|c| canonical(c).contains(&tc)))
        .cloned()
}

/// Tries each alias in turn, then a spreadsheet letter position.
pub fn resolve_with_aliases(options: &[String], aliases: &[String], letter: Option<&str>) -> Option<String> {
    aliases
        .iter()
        .find_map(|a| resolve_column(options, a))
        .or_else(|| {
            let idx = letter_index(letter?)?;
            options.get(idx).cloned()
        })
}

/// Resolves roles against one sheet's headers.
#[derive(Debug, Clone)]
pub struct ColumnResolver<'a> {
    options: &'a [String],
    sheet: &'a str,
}

impl<'a> ColumnResolver<'a> {
    pub fn new(sheet: &'a str, options: &'a [String]) -> Self {
        ColumnResolver { options, sheet }
    }

    pub fn require(&self, role: &str, default: &str) -> Result<String> {
        self.require_any(role, &[default.to_string()], None)
    }

    pub fn require_any(&self, role: &str, aliases: &[String], letter: Option<&str>) -> Result<String> {
        let found = resolve_with_aliases(self.options, aliases, letter).ok_or_else(|| {
            ReportError::ColumnNotResolved {
                role: format!("{} ({})", role, self.sheet),
                default: aliases.first().cloned().unwrap_or_default(),
            }
        })?;
        debug!(sheet = self.sheet, role, column = %found, "column resolved");
        Ok(found)
    }

    pub fn require_all(&self, role: &str, defaults: &[String]) -> Result<Vec<String>> {
        defaults.iter().map(|d| self.require(role, d)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> Vec<String> {
        ["ID", "Gender", "TEAM_UP Completed", "team-up completed (12) date", "HEART", "HEART__1", "Сhild Full Name"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn exact_match_is_case_insensitive() {
        assert_eq!(resolve_column(&opts(), "gender").as_deref(), Some("Gender"));
        assert_eq!(resolve_column(&opts(), "HEART").as_deref(), Some("HEART"));
    }

    #[test]
    fn canonical_and_substring_matches() {
        assert_eq!(
            resolve_column(&opts(), "TEAM_UP Completed (12) Date").as_deref(),
            Some("team-up completed (12) date")
        );
        assert_eq!(resolve_column(&opts(), "teamup").as_deref(), Some("TEAM_UP Completed"));
        assert_eq!(resolve_column(&opts(), "Disability status"), None);
        assert_eq!(resolve_column(&opts(), "__"), None);
    }

    #[test]
    fn letters_index_from_zero() {
        assert_eq!(letter_index("A"), Some(0));
        assert_eq!(letter_index("Z"), Some(25));
        assert_eq!(letter_index("AA"), Some(26));
        assert_eq!(letter_index("al"), Some(37));
        assert_eq!(letter_index(""), None);
    }

    #[test]
    fn overlong_letters_are_no_column() {
        assert_eq!(letter_index(&"Z".repeat(40)), None);
        assert_eq!(resolve_with_aliases(&opts(), &[], Some(&"Z".repeat(40))), None);
    }

    #[test]
    fn aliases_then_letter_fallback() {
        let aliases = vec!["Child Full Name".to_string()];
        // The header uses a Cyrillic "С", so only the letter finds it.
        assert_eq!(resolve_with_aliases(&opts(), &aliases, Some("G")).as_deref(), Some("Сhild Full Name"));
        assert_eq!(resolve_with_aliases(&opts(), &aliases, Some("ZZ")), None);
        let both = vec!["Child Full Name".to_string(), "Сhild Full Name".to_string()];
        assert_eq!(resolve_with_aliases(&opts(), &both, None).as_deref(), Some("Сhild Full Name"));
    }

    #[test]
    fn resolver_reports_role_on_failure() {
        let o = opts();
        let r = ColumnResolver::new("Child Info", &o);
        assert_eq!(r.require("gender", "Gender").unwrap(), "Gender");
        let err = r.require("disability", "Disability status").unwrap_err();
        assert!(err.to_string().contains("disability (Child Info)"));
    }
}
