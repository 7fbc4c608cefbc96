//! Selection Engine
//!
//! Evaluates a [`Criterion`] against every candidate data source concurrently
//! and collects the matches. Each candidate is fetched (and tested, for
//! [`Criterion::ByFailedHealthCheck`]) inside one admission gate slot; a
//! failing candidate is recorded in [`Selection::failures`] and never stops
//! its siblings.

use crate::datasource::{DataSource, DataSourceId, HealthCheck};
use crate::error::{format_error, Error, ItemFailure, Result};
use crate::gate::AdmissionGate;
use crate::redash::DataSourceClient;
use futures::future::join_all;
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

/// Test failures that point at an unrelated, pre-existing misconfiguration
/// rather than a dead data source.
pub const MESSAGES_DO_NOT_APPLY: &[&str] = &["FATAL:  password authentication failed for user"];

/// Countries whose databases follow the `<code>-<name>` convention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Country {
    Br,
    Co,
    Mx,
}

impl Country {
    pub const ALL: [Country; 3] = [Country::Br, Country::Co, Country::Mx];

    pub fn code(self) -> &'static str {
        match self {
            Country::Br => "br",
            Country::Co => "co",
            Country::Mx => "mx",
        }
    }

    /// Database name for `name` in this country
    pub fn dbname(self, name: &str) -> String {
        format!("{}-{}", self.code(), name)
    }
}

/// Which database names a by-name selection accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountryScope {
    /// `br-<name>`, `co-<name>` or `mx-<name>`
    All,
    /// `<code>-<name>` for one country
    Country(Country),
    /// `<name>` verbatim
    Exact,
}

impl CountryScope {
    pub fn matches(&self, name: &str, dbname: Option<&str>) -> bool {
        let Some(dbname) = dbname else {
            return false;
        };

        match self {
            CountryScope::All => Country::ALL.iter().any(|c| c.dbname(name) == dbname),
            CountryScope::Country(country) => country.dbname(name) == dbname,
            CountryScope::Exact => name == dbname,
        }
    }

    /// Every database name this scope accepts for `name`
    pub fn dbnames(&self, name: &str) -> Vec<String> {
        match self {
            CountryScope::All => Country::ALL.iter().map(|c| c.dbname(name)).collect(),
            CountryScope::Country(country) => vec![country.dbname(name)],
            CountryScope::Exact => vec![name.to_string()],
        }
    }
}

impl FromStr for CountryScope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(CountryScope::All),
            "br" => Ok(CountryScope::Country(Country::Br)),
            "co" => Ok(CountryScope::Country(Country::Co)),
            "mx" => Ok(CountryScope::Country(Country::Mx)),
            "exact" | "none" => Ok(CountryScope::Exact),
            other => Err(Error::validation(format!(
                "unknown country scope {:?} (expected all, br, co, mx or exact)",
                other
            ))),
        }
    }
}

impl fmt::Display for CountryScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CountryScope::All => write!(f, "all countries"),
            CountryScope::Country(country) => write!(f, "{}", country.code()),
            CountryScope::Exact => write!(f, "exact name"),
        }
    }
}

/// Prefixes of test messages that do not make a data source a candidate
#[derive(Debug, Clone)]
pub struct IgnoreList {
    prefixes: Vec<String>,
}

impl IgnoreList {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let prefixes = prefixes
            .into_iter()
            .map(|p| collapse_whitespace(p.as_ref()))
            .filter(|p| !p.trim().is_empty())
            .collect();
        Self { prefixes }
    }

    /// The built-in list extended with `extra`
    pub fn with_defaults<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list = Self::default();
        for prefix in Self::new(extra).prefixes {
            if !list.prefixes.contains(&prefix) {
                list.prefixes.push(prefix);
            }
        }
        list
    }

    /// Whitespace runs are collapsed on both sides, so Postgres' double-space
    /// `FATAL:  ...` matches a single-space prefix and vice versa. Leading
    /// whitespace is kept: the message must start with the prefix.
    pub fn is_ignored(&self, message: &str) -> bool {
        let message = collapse_whitespace(message);
        self.prefixes.iter().any(|p| message.starts_with(p.as_str()))
    }

    /// A failed test whose message is not ignored
    pub fn is_candidate(&self, check: &HealthCheck) -> bool {
        !check.ok && !self.is_ignored(&check.message)
    }

    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }
}

impl Default for IgnoreList {
    fn default() -> Self {
        Self::new(MESSAGES_DO_NOT_APPLY.iter().copied())
    }
}

/// Replace every whitespace run with one space, leading and trailing runs included
fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_gap = false;
    for c in s.chars() {
        if c.is_whitespace() {
            if !in_gap {
                out.push(' ');
            }
            in_gap = true;
        } else {
            out.push(c);
            in_gap = false;
        }
    }
    out
}

/// Rule deciding which data sources a run selects
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Criterion {
    ByDatabaseName { name: String, scope: CountryScope },
    ByFailedHealthCheck,
    ByExplicitIds(Vec<DataSourceId>),
}

impl Criterion {
    /// Spaces are removed from `name`; an empty name is rejected.
    pub fn by_database_name(name: &str, scope: CountryScope) -> Result<Self> {
        let name: String = name.chars().filter(|c| !c.is_whitespace()).collect();
        if name.is_empty() {
            return Err(Error::validation("database name must not be empty"));
        }
        Ok(Criterion::ByDatabaseName { name, scope })
    }

    /// Duplicate ids are dropped, keeping first occurrence order.
    pub fn by_ids(ids: Vec<DataSourceId>) -> Result<Self> {
        if ids.is_empty() {
            return Err(Error::validation("at least one data source id is required"));
        }
        let mut unique = Vec::with_capacity(ids.len());
        for id in ids {
            if !unique.contains(&id) {
                unique.push(id);
            }
        }
        Ok(Criterion::ByExplicitIds(unique))
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Criterion::ByDatabaseName { name, scope } => {
                write!(f, "database {} ({})", name, scope)
            }
            Criterion::ByFailedHealthCheck => write!(f, "failed connection test"),
            Criterion::ByExplicitIds(ids) => write!(f, "{} explicit id(s)", ids.len()),
        }
    }
}

/// Parse whitespace- or comma-separated ids as typed by an operator
pub fn parse_ids(input: &str) -> Result<Vec<DataSourceId>> {
    let ids = input
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<DataSourceId>()
                .map_err(|_| Error::validation(format!("{:?} is not a data source id", s)))
        })
        .collect::<Result<Vec<_>>>()?;

    if ids.is_empty() {
        return Err(Error::validation("no data source ids given"));
    }
    Ok(ids)
}

/// Outcome of a selection run
#[derive(Debug, Default)]
pub struct Selection {
    pub matched: Vec<DataSource>,
    pub failures: Vec<ItemFailure>,
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        self.matched.is_empty()
    }

    pub fn len(&self) -> usize {
        self.matched.len()
    }

    pub fn ids(&self) -> Vec<DataSourceId> {
        self.matched.iter().map(|d| d.id).collect()
    }
}

/// Runs criteria against one client through one admission gate
pub struct SelectionEngine<'a> {
    client: &'a DataSourceClient,
    gate: AdmissionGate,
    ignore: IgnoreList,
}

impl<'a> SelectionEngine<'a> {
    pub fn new(client: &'a DataSourceClient, gate: AdmissionGate) -> Self {
        Self {
            client,
            gate,
            ignore: IgnoreList::default(),
        }
    }

    pub fn with_ignore_list(mut self, ignore: IgnoreList) -> Self {
        self.ignore = ignore;
        self
    }

    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    /// Select by database name
    pub async fn select_by_name(&self, name: &str, scope: CountryScope) -> Result<Selection> {
        self.select(&Criterion::by_database_name(name, scope)?).await
    }

    /// Select data sources whose connection test fails for a relevant reason
    pub async fn select_by_failed_check(&self) -> Result<Selection> {
        self.select(&Criterion::ByFailedHealthCheck).await
    }

    /// Select the given ids
    pub async fn select_by_ids(&self, ids: Vec<DataSourceId>) -> Result<Selection> {
        self.select(&Criterion::by_ids(ids)?).await
    }

    /// Evaluate `criterion` over its candidates.
    ///
    /// Fails as a whole only when the candidate list cannot be read or the
    /// gate has been closed; per-candidate errors land in `failures`.
    pub async fn select(&self, criterion: &Criterion) -> Result<Selection> {
        let start = Instant::now();

        let candidates: Vec<DataSourceId> = match criterion {
            Criterion::ByExplicitIds(ids) => ids.clone(),
            _ => self
                .gate
                .run(self.client.show_all())
                .await?
                .into_iter()
                .map(|d| d.id)
                .collect(),
        };

        tracing::info!(
            "Selecting by {} over {} candidate(s), concurrency {}",
            criterion,
            candidates.len(),
            self.gate.capacity()
        );

        let evaluations = candidates
            .iter()
            .map(|&id| async move { (id, self.evaluate(criterion, id).await) });
        let outcomes = join_all(evaluations).await;

        let mut selection = Selection::default();
        for (id, outcome) in outcomes {
            match outcome {
                Ok(Some(data_source)) => {
                    tracing::info!("Matched {}", data_source);
                    selection.matched.push(data_source);
                }
                Ok(None) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!("Skipping data source {}: {}", id, format_error(&e));
                    selection.failures.push(ItemFailure::new(id, e));
                }
            }
        }

        tracing::info!(
            "Selection finished in {:.2?}: {} matched, {} failed",
            start.elapsed(),
            selection.matched.len(),
            selection.failures.len()
        );

        Ok(selection)
    }

    async fn evaluate(&self, criterion: &Criterion, id: DataSourceId) -> Result<Option<DataSource>> {
        self.gate
            .run(async {
                let data_source = self.client.show(id).await?;

                match criterion {
                    Criterion::ByDatabaseName { name, scope } => {
                        Ok(scope.matches(name, data_source.dbname()).then_some(data_source))
                    }
                    Criterion::ByFailedHealthCheck => {
                        let check = self.client.test(id).await?;
                        tracing::debug!("Test {}: ok={} {}", data_source, check.ok, check.message);
                        Ok(self.ignore.is_candidate(&check).then_some(data_source))
                    }
                    Criterion::ByExplicitIds(_) => Ok(Some(data_source)),
                }
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(ok: bool, message: &str) -> HealthCheck {
        HealthCheck {
            ok,
            message: message.to_string(),
        }
    }

    #[test]
    fn test_all_countries_matches_each_prefix() {
        for dbname in ["br-acme", "co-acme", "mx-acme"] {
            assert!(CountryScope::All.matches("acme", Some(dbname)));
        }
        assert!(!CountryScope::All.matches("acme", Some("acme")));
        assert!(!CountryScope::All.matches("acme", Some("ar-acme")));
        assert!(!CountryScope::All.matches("other", Some("br-acme")));
        assert!(!CountryScope::All.matches("acme", None));
    }

    #[test]
    fn test_single_country_and_exact() {
        let co = CountryScope::Country(Country::Co);
        assert!(co.matches("prod", Some("co-prod")));
        assert!(!co.matches("prod", Some("br-prod")));

        assert!(CountryScope::Exact.matches("br-prod", Some("br-prod")));
        assert!(!CountryScope::Exact.matches("prod", Some("br-prod")));
    }

    #[test]
    fn test_scope_dbnames() {
        assert_eq!(
            CountryScope::All.dbnames("x"),
            vec!["br-x".to_string(), "co-x".to_string(), "mx-x".to_string()]
        );
        assert_eq!(CountryScope::Exact.dbnames("x"), vec!["x".to_string()]);
    }

    #[test]
    fn test_scope_from_str() {
        assert_eq!("ALL".parse::<CountryScope>().unwrap(), CountryScope::All);
        assert_eq!(
            " mx ".parse::<CountryScope>().unwrap(),
            CountryScope::Country(Country::Mx)
        );
        assert_eq!("exact".parse::<CountryScope>().unwrap(), CountryScope::Exact);
        assert!("ar".parse::<CountryScope>().is_err());
    }

    #[test]
    fn test_password_failures_are_ignored() {
        let ignore = IgnoreList::default();
        assert!(!ignore.is_candidate(&check(
            false,
            "FATAL:  password authentication failed for user \"report\""
        )));
        assert!(!ignore.is_candidate(&check(
            false,
            "FATAL: password authentication failed for user \"report\""
        )));
        assert!(ignore.is_candidate(&check(false, "connection refused")));
        assert!(!ignore.is_candidate(&check(true, "connection refused")));
    }

    #[test]
    fn test_leading_whitespace_is_not_ignored() {
        let ignore = IgnoreList::default();
        assert!(ignore.is_candidate(&check(
            false,
            "  FATAL: password authentication failed for user \"report\""
        )));
        assert!(ignore.is_candidate(&check(
            false,
            "\nFATAL:  password authentication failed for user \"report\""
        )));
        assert_eq!(collapse_whitespace(" a \t\n b  "), " a b ");
    }

    #[test]
    fn test_ignore_list_extension() {
        let ignore = IgnoreList::with_defaults(["could not translate host name", "", "  "]);
        assert_eq!(ignore.len(), 2);
        assert!(ignore.is_ignored("could not translate host name \"db\" to address"));

        assert!(IgnoreList::new(Vec::<String>::new()).is_empty());
    }

    #[test]
    fn test_by_database_name_strips_spaces() {
        assert_eq!(
            Criterion::by_database_name(" ac me ", CountryScope::All).unwrap(),
            Criterion::ByDatabaseName {
                name: "acme".to_string(),
                scope: CountryScope::All
            }
        );
        assert!(Criterion::by_database_name("   ", CountryScope::All).is_err());
    }

    #[test]
    fn test_by_ids_dedupes() {
        assert_eq!(
            Criterion::by_ids(vec![3, 1, 3, 2, 1]).unwrap(),
            Criterion::ByExplicitIds(vec![3, 1, 2])
        );
        assert!(Criterion::by_ids(vec![]).is_err());
    }

    #[test]
    fn test_parse_ids() {
        assert_eq!(parse_ids("1 2  3").unwrap(), vec![1, 2, 3]);
        assert_eq!(parse_ids("4,5, 6").unwrap(), vec![4, 5, 6]);
        assert!(matches!(parse_ids("1 two 3"), Err(Error::Validation(_))));
        assert!(matches!(parse_ids("-1"), Err(Error::Validation(_))));
        assert!(matches!(parse_ids("   "), Err(Error::Validation(_))));
    }
}
