use std::fs::File;
use std::io::BufWriter;

use ashare_core::export::write_csv;
use ashare_core::{CatalogQuery, EnvelopeError, QuotedSymbol, SecurityCode};
use serde::Serialize;

use crate::cli::{Cli, SearchArgs};
use crate::error::CliError;

use super::{load_catalog, CommandResult, Context};

/// Upper bound on codes quoted by one search.
const MAX_QUOTED: usize = 200;

#[derive(Debug, Serialize)]
struct SearchQuery<'a> {
    prefix: Option<&'a str>,
    suffix: Option<&'a str>,
    name: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct SearchResponseData<'a> {
    query: SearchQuery<'a>,
    catalog_size: usize,
    count: usize,
    results: Vec<QuotedSymbol>,
    #[serde(skip_serializing_if = "Option::is_none")]
    exported_to: Option<String>,
}

pub async fn run(
    args: &SearchArgs,
    cli: &Cli,
    context: &Context,
) -> Result<CommandResult, CliError> {
    let query = CatalogQuery::new(
        args.prefix.as_deref(),
        args.suffix.as_deref(),
        args.name.as_deref(),
    )?;

    let (catalog, mut warnings) = load_catalog(cli);
    let mut results: Vec<QuotedSymbol> = catalog
        .query(&query)
        .into_iter()
        .map(QuotedSymbol::from)
        .collect();

    let mut errors = Vec::new();
    let mut source_chain = Vec::new();
    if args.quotes && !results.is_empty() {
        if results.len() > MAX_QUOTED {
            warnings.push(format!(
                "{} matches; quotes fetched for the first {MAX_QUOTED} only",
                results.len()
            ));
        }

        let codes: Vec<SecurityCode> = results
            .iter()
            .take(MAX_QUOTED)
            .map(|row| row.symbol.code.clone())
            .collect();
        let cache = context.quote_cache();
        let mut quotes = cache.get_batch(&codes).await;

        for row in results.iter_mut().take(MAX_QUOTED) {
            match quotes.remove(&row.symbol.code) {
                Some(Ok(quote)) => row.quote = Some(quote),
                Some(Err(error)) => errors.push(EnvelopeError::no_data(&error)),
                None => {}
            }
        }

        source_chain = context.attempted_chain().await;
        warnings.extend(context.router.drain_warnings());
    }

    let exported_to = match &args.export {
        Some(path) => {
            let file = File::create(path)?;
            write_csv(BufWriter::new(file), &results)?;
            Some(path.display().to_string())
        }
        None => None,
    };

    let data = serde_json::to_value(SearchResponseData {
        query: SearchQuery {
            prefix: args.prefix.as_deref(),
            suffix: args.suffix.as_deref(),
            name: args.name.as_deref(),
        },
        catalog_size: catalog.len(),
        count: results.len(),
        results,
        exported_to,
    })?;

    Ok(CommandResult::ok(data, source_chain)
        .with_warnings(warnings)
        .with_errors(errors))
}
