use std::collections::BTreeSet;

use ashare_core::{resolve, CachedQuote, EnvelopeError, SecurityCode};
use serde::Serialize;

use crate::cli::QuoteArgs;
use crate::error::CliError;

use super::{CommandResult, Context};

#[derive(Debug, Serialize)]
struct QuoteRow {
    id: String,
    #[serde(flatten)]
    quote: CachedQuote,
}

#[derive(Debug, Serialize)]
struct QuoteResponseData {
    quotes: Vec<QuoteRow>,
}

pub async fn run(args: &QuoteArgs, context: &Context) -> Result<CommandResult, CliError> {
    let mut codes = args
        .codes
        .iter()
        .map(|raw| SecurityCode::parse(raw))
        .collect::<Result<Vec<_>, _>>()?;
    let mut seen = BTreeSet::new();
    codes.retain(|code| seen.insert(code.clone()));

    let cache = context.quote_cache();
    let mut fetched = cache.get_batch(&codes).await;

    let mut quotes = Vec::with_capacity(codes.len());
    let mut errors = Vec::new();
    for code in &codes {
        match fetched.remove(code) {
            Some(Ok(quote)) => quotes.push(QuoteRow {
                id: resolve(code).prefixed(),
                quote,
            }),
            Some(Err(error)) => errors.push(EnvelopeError::no_data(&error)),
            None => {}
        }
    }

    let source_chain = context.attempted_chain().await;
    let warnings = context.router.drain_warnings();
    let data = serde_json::to_value(QuoteResponseData { quotes })?;

    Ok(CommandResult::ok(data, source_chain)
        .with_warnings(warnings)
        .with_errors(errors))
}
