//! Load-once symbol universe and its queries.
//!
//! A catalog is built from one or more CSV listings. Each listing names its
//! code and name columns (or relies on the usual aliases), codes are
//! normalized to six digits and later listings override earlier ones for the
//! same code. The result is read-only; reloading means building a new
//! [`Catalog`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::CatalogError;
use crate::{InstrumentKind, SecurityCode, Symbol, ValidationError};

const CODE_ALIASES: [&str; 3] = ["code", "证券代码", "代码"];
const NAME_ALIASES: [&str; 3] = ["name", "证券简称", "名称"];

/// Longest accepted prefix/suffix fragment.
pub const MAX_FRAGMENT_CHARS: usize = 2;

/// One CSV listing and how to read it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogSource {
    pub path: PathBuf,
    pub code_column: Option<String>,
    pub name_column: Option<String>,
    pub kind: InstrumentKind,
}

impl CatalogSource {
    /// Columns are resolved through the aliases.
    pub fn new(path: impl Into<PathBuf>, kind: InstrumentKind) -> Self {
        Self {
            path: path.into(),
            code_column: None,
            name_column: None,
            kind,
        }
    }

    pub fn with_columns(mut self, code: impl Into<String>, name: impl Into<String>) -> Self {
        self.code_column = Some(code.into());
        self.name_column = Some(name.into());
        self
    }

    /// Stock list with `code`/`name` headers.
    pub fn stocks(path: impl Into<PathBuf>) -> Self {
        Self::new(path, InstrumentKind::Stock).with_columns("code", "name")
    }

    /// Shanghai exchange ETF listing.
    pub fn sse_etf(path: impl Into<PathBuf>) -> Self {
        Self::new(path, InstrumentKind::Etf).with_columns("证券代码", "证券简称")
    }

    /// Shenzhen exchange ETF listing.
    pub fn szse_etf(path: impl Into<PathBuf>) -> Self {
        Self::new(path, InstrumentKind::Etf).with_columns("证券代码", "证券简称")
    }
}

/// Immutable, ordered set of symbols unique by code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    symbols: Vec<Symbol>,
    index: HashMap<SecurityCode, usize>,
}

impl Catalog {
    pub fn from_symbols(symbols: impl IntoIterator<Item = Symbol>) -> Self {
        let symbols: Vec<Symbol> = symbols.into_iter().collect();

        let mut last_seen = HashMap::with_capacity(symbols.len());
        for (position, symbol) in symbols.iter().enumerate() {
            last_seen.insert(symbol.code.clone(), position);
        }

        let symbols: Vec<Symbol> = symbols
            .into_iter()
            .enumerate()
            .filter(|(position, symbol)| last_seen.get(&symbol.code) == Some(position))
            .map(|(_, symbol)| symbol)
            .collect();
        let index = symbols
            .iter()
            .enumerate()
            .map(|(position, symbol)| (symbol.code.clone(), position))
            .collect();

        Self { symbols, index }
    }

    /// Loads every source; any failing source fails the whole load.
    pub fn load(sources: &[CatalogSource]) -> Result<Self, CatalogError> {
        let mut symbols = Vec::new();
        for source in sources {
            symbols.extend(read_source(source)?);
        }

        let catalog = Self::from_symbols(symbols);
        info!(sources = sources.len(), symbols = catalog.len(), "catalog loaded");
        Ok(catalog)
    }

    /// Loads what it can. Failing sources contribute nothing and their
    /// errors are returned next to the (possibly empty) catalog.
    pub fn load_degraded(sources: &[CatalogSource]) -> (Self, Vec<CatalogError>) {
        let mut symbols = Vec::new();
        let mut errors = Vec::new();

        for source in sources {
            match read_source(source) {
                Ok(rows) => symbols.extend(rows),
                Err(error) => {
                    warn!(%error, "catalog source skipped");
                    errors.push(error);
                }
            }
        }

        let catalog = Self::from_symbols(symbols);
        info!(
            sources = sources.len(),
            failed = errors.len(),
            symbols = catalog.len(),
            "catalog loaded"
        );
        (catalog, errors)
    }

    /// Matching symbols in catalog order.
    pub fn query(&self, query: &CatalogQuery) -> Vec<Symbol> {
        self.symbols
            .iter()
            .filter(|symbol| query.matches(symbol))
            .cloned()
            .collect()
    }

    pub fn get(&self, code: &SecurityCode) -> Option<&Symbol> {
        self.index.get(code).map(|position| &self.symbols[*position])
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Symbol> {
        self.symbols.iter()
    }
}

impl<'a> IntoIterator for &'a Catalog {
    type Item = &'a Symbol;
    type IntoIter = std::slice::Iter<'a, Symbol>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Conjunctive filter over code prefix, code suffix and fuzzy name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogQuery {
    prefix: Option<String>,
    suffix: Option<String>,
    name: Option<String>,
}

impl CatalogQuery {
    /// Empty strings count as absent. Prefix and suffix are trimmed and
    /// limited to [`MAX_FRAGMENT_CHARS`] characters; the name fragment is
    /// kept verbatim, so whitespace in it must occur in the name too.
    pub fn new(
        prefix: Option<&str>,
        suffix: Option<&str>,
        name: Option<&str>,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            prefix: fragment("prefix", prefix)?,
            suffix: fragment("suffix", suffix)?,
            name: name.filter(|value| !value.is_empty()).map(str::to_owned),
        })
    }

    pub fn matches(&self, symbol: &Symbol) -> bool {
        let prefix_ok = self
            .prefix
            .as_deref()
            .map_or(true, |prefix| symbol.code.starts_with(prefix));
        let suffix_ok = self
            .suffix
            .as_deref()
            .map_or(true, |suffix| symbol.code.ends_with(suffix));
        let name_ok = self
            .name
            .as_deref()
            .map_or(true, |fragment| fuzzy_match(&symbol.name, fragment));

        prefix_ok && suffix_ok && name_ok
    }

    pub fn is_unfiltered(&self) -> bool {
        self.prefix.is_none() && self.suffix.is_none() && self.name.is_none()
    }
}

fn fragment(field: &'static str, value: Option<&str>) -> Result<Option<String>, ValidationError> {
    let Some(value) = value.map(str::trim).filter(|value| !value.is_empty()) else {
        return Ok(None);
    };

    if value.chars().count() > MAX_FRAGMENT_CHARS {
        return Err(ValidationError::FragmentTooLong {
            field,
            value: value.to_owned(),
            max: MAX_FRAGMENT_CHARS,
        });
    }
    Ok(Some(value.to_owned()))
}

/// True when every character of `fragment` occurs somewhere in `name`.
///
/// Order and adjacency are ignored and a repeated fragment character is
/// satisfied by a single occurrence, so `fuzzy_match("贵州茅台", "茅贵")`
/// holds. Matching is case-sensitive.
pub fn fuzzy_match(name: &str, fragment: &str) -> bool {
    fragment.chars().all(|ch| name.contains(ch))
}

fn read_source(source: &CatalogSource) -> Result<Vec<Symbol>, CatalogError> {
    let path = source.path.as_path();
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|error| CatalogError::unreadable(path, error))?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(|error| CatalogError::unreadable(path, error))?
        .iter()
        .map(|header| header.trim_start_matches('\u{feff}').trim().to_owned())
        .collect();

    let code_index = column_index(path, &headers, source.code_column.as_deref(), &CODE_ALIASES)?;
    let name_index = column_index(path, &headers, source.name_column.as_deref(), &NAME_ALIASES)?;

    let mut symbols = Vec::new();
    let mut skipped = 0_usize;
    for record in reader.records() {
        let record = record.map_err(|error| CatalogError::unreadable(path, error))?;
        let raw_code = record.get(code_index).unwrap_or_default();
        let name = record.get(name_index).unwrap_or_default().trim();

        match SecurityCode::normalize(raw_code) {
            Ok(code) => symbols.push(Symbol::new(code, name, source.kind)),
            Err(_) => skipped += 1,
        }
    }

    if skipped > 0 {
        warn!(path = %path.display(), skipped, "catalog rows with unusable codes skipped");
    }
    Ok(symbols)
}

fn column_index(
    path: &Path,
    headers: &[String],
    explicit: Option<&str>,
    aliases: &[&str],
) -> Result<usize, CatalogError> {
    let position = match explicit {
        Some(column) => headers.iter().position(|header| header == column),
        None => aliases
            .iter()
            .find_map(|alias| headers.iter().position(|header| header == alias)),
    };

    position.ok_or_else(|| CatalogError::MissingColumn {
        path: path.to_path_buf(),
        column: explicit.unwrap_or(aliases[0]).to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn symbol(code: &str, name: &str) -> Symbol {
        Symbol::new(
            SecurityCode::parse(code).expect("valid code"),
            name,
            InstrumentKind::Stock,
        )
    }

    fn fixture() -> Catalog {
        Catalog::from_symbols(vec![
            symbol("600519", "贵州茅台"),
            symbol("600688", "上海石化"),
            symbol("000001", "平安银行"),
            symbol("601988", "中国银行"),
            symbol("300750", "宁德时代"),
        ])
    }

    #[test]
    fn fuzzy_match_ignores_order_and_adjacency() {
        assert!(fuzzy_match("贵州茅台", "茅贵"));
        assert!(fuzzy_match("贵州茅台", "州台"));
        assert!(!fuzzy_match("贵州茅台", "茅五"));
        assert!(fuzzy_match("中国银行", "银银"));
        assert!(fuzzy_match("中国银行", ""));
    }

    #[test]
    fn prefix_suffix_and_name_are_conjunctive() {
        let catalog = fixture();
        let query = CatalogQuery::new(Some("60"), Some("88"), Some("行")).expect("valid");

        let codes: Vec<_> = catalog
            .query(&query)
            .into_iter()
            .map(|symbol| symbol.code.to_string())
            .collect();
        assert_eq!(codes, vec!["601988"]);
    }

    #[test]
    fn empty_query_returns_everything_in_order() {
        let catalog = fixture();
        let query = CatalogQuery::new(Some(""), None, Some("")).expect("valid");

        assert!(query.is_unfiltered());
        assert_eq!(catalog.query(&query).len(), catalog.len());
    }

    #[test]
    fn name_whitespace_is_matched_literally() {
        let catalog = Catalog::from_symbols(vec![
            symbol("600519", "贵州茅台"),
            symbol("510300", "沪深300 ETF"),
        ]);

        let query = CatalogQuery::new(None, None, Some(" ")).expect("valid");
        assert!(!query.is_unfiltered());
        let codes: Vec<_> = catalog
            .query(&query)
            .into_iter()
            .map(|symbol| symbol.code.to_string())
            .collect();
        assert_eq!(codes, vec!["510300"]);
    }

    #[test]
    fn rejects_long_fragments() {
        let error = CatalogQuery::new(Some("600"), None, None).expect_err("too long");
        assert!(matches!(
            error,
            ValidationError::FragmentTooLong { field: "prefix", max: 2, .. }
        ));
    }

    #[test]
    fn later_duplicates_win_and_take_their_position() {
        let catalog = Catalog::from_symbols(vec![
            symbol("600519", "旧名"),
            symbol("000001", "平安银行"),
            symbol("600519", "贵州茅台"),
        ]);

        let names: Vec<_> = catalog.iter().map(|symbol| symbol.name.as_str()).collect();
        assert_eq!(names, vec!["平安银行", "贵州茅台"]);
        assert_eq!(
            catalog
                .get(&SecurityCode::parse("600519").expect("valid"))
                .map(|symbol| symbol.name.as_str()),
            Some("贵州茅台")
        );
    }

    proptest! {
        #[test]
        fn a_name_always_matches_itself(name in "\\PC{0,12}") {
            prop_assert!(fuzzy_match(&name, &name));
            prop_assert!(fuzzy_match(&name, ""));
        }

        #[test]
        fn prefix_query_returns_exactly_prefixed_codes(prefix in "[0-9]{2}") {
            let catalog = fixture();
            let query = CatalogQuery::new(Some(prefix.as_str()), None, None).expect("valid");
            let found = catalog.query(&query);

            let expected = catalog.iter().filter(|symbol| symbol.code.starts_with(&prefix)).count();
            prop_assert_eq!(found.len(), expected);
            prop_assert!(found.iter().all(|symbol| symbol.code.starts_with(&prefix)));
        }
    }
}
