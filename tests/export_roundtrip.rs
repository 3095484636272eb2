use std::fs::{self, File};

use ashare_core::export::{read_pairs, to_csv_bytes, write_csv, BOM};
use ashare_core::{
    CachedQuote, Catalog, CatalogQuery, CatalogSource, Freshness, ProviderId, QuoteSnapshot,
    QuotedSymbol, SecurityCode,
};
use tempfile::TempDir;

const STOCKS: &str = "code,name\n600519,贵州茅台\n000001,平安银行\n601988,\"中国银行, 股份\"\n";

#[test]
fn exported_search_results_read_back_as_the_same_pairs() {
    let dir = TempDir::new().expect("tempdir");
    let listing = dir.path().join("stocks.csv");
    fs::write(&listing, STOCKS).expect("fixture should be writable");

    let catalog = Catalog::load(&[CatalogSource::stocks(listing)]).expect("catalog loads");
    let rows: Vec<QuotedSymbol> = catalog
        .query(&CatalogQuery::default())
        .into_iter()
        .map(QuotedSymbol::from)
        .collect();

    let out = dir.path().join("out.csv");
    write_csv(File::create(&out).expect("create export"), &rows).expect("export works");

    let bytes = fs::read(&out).expect("read export");
    assert!(bytes.starts_with(BOM));

    let pairs = read_pairs(File::open(&out).expect("open export")).expect("parse export");
    let expected: Vec<(SecurityCode, String)> = rows
        .iter()
        .map(|row| (row.symbol.code.clone(), row.symbol.name.clone()))
        .collect();
    assert_eq!(pairs, expected);
    assert_eq!(pairs[2].1, "中国银行, 股份");
}

#[test]
fn quoted_rows_survive_the_roundtrip_as_pairs() {
    let code = SecurityCode::parse("600519").expect("valid code");
    let snapshot = QuoteSnapshot::new(
        code.clone(),
        Some(String::from("贵州茅台")),
        1700.0,
        0.0,
        1690.5,
        ProviderId::Sina,
    )
    .expect("valid snapshot");
    assert!(snapshot.is_partial());

    let row = QuotedSymbol {
        symbol: ashare_core::Symbol::new(code.clone(), "贵州茅台", ashare_core::InstrumentKind::Stock),
        quote: Some(CachedQuote {
            snapshot,
            freshness: Freshness::Fresh,
        }),
    };

    let bytes = to_csv_bytes(&[row]).expect("export works");
    let text = String::from_utf8(bytes[BOM.len()..].to_vec()).expect("utf-8");
    let line = text.lines().nth(1).expect("data row");
    // partial quote: derived columns stay empty
    assert!(line.starts_with("600519,贵州茅台,1700,0,1690.5,,,"), "{line}");
    assert!(line.ends_with(",fresh"));

    let pairs = read_pairs(text.as_bytes()).expect("parse export");
    assert_eq!(pairs, vec![(code, String::from("贵州茅台"))]);
}
