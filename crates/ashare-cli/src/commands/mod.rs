mod heatmap;
mod quote;
mod search;
mod sources;

use std::sync::Arc;
use std::time::{Duration, Instant};

use ashare_core::{
    Catalog, CatalogSource, CoreConfig, Envelope, EnvelopeError, FeedRouter, ProviderId,
    SnapshotCache, SourceStrategy,
};
use serde_json::Value;

use crate::cli::{Cli, Command};
use crate::error::CliError;
use crate::metadata::Metadata;

pub struct CommandResult {
    pub data: Value,
    pub warnings: Vec<String>,
    pub errors: Vec<EnvelopeError>,
    pub cache_hit: bool,
    pub source_chain: Vec<ProviderId>,
}

impl CommandResult {
    pub fn ok(data: Value, source_chain: Vec<ProviderId>) -> Self {
        Self {
            data,
            warnings: Vec::new(),
            errors: Vec::new(),
            cache_hit: false,
            source_chain,
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings.extend(warnings);
        self
    }

    pub fn with_errors(mut self, errors: Vec<EnvelopeError>) -> Self {
        self.errors.extend(errors);
        self
    }
}

/// Shared wiring for one invocation: resolved configuration and the feed
/// router behind the quote cache.
pub struct Context {
    pub config: CoreConfig,
    pub router: Arc<FeedRouter>,
}

impl Context {
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        let mut config = CoreConfig::from_env();
        if let Some(timeout_ms) = cli.timeout_ms {
            if timeout_ms == 0 {
                return Err(CliError::Command(String::from(
                    "--timeout-ms must be greater than zero",
                )));
            }
            config.timeout_ms = timeout_ms;
        }
        if let Some(secs) = cli.cache_ttl_secs {
            config.cache_ttl = Duration::from_secs(secs);
        }
        config.source_strategy = SourceStrategy::parse(&cli.source, cli.strict)?;

        let router = FeedRouter::with_timeout_ms(config.timeout_ms)
            .with_strategy(config.source_strategy.clone());

        Ok(Self {
            config,
            router: Arc::new(router),
        })
    }

    pub fn quote_cache(&self) -> SnapshotCache {
        SnapshotCache::new(self.router.clone(), self.config.cache_ttl)
    }

    /// Feeds in the order the router will try them.
    pub async fn source_chain(&self) -> Vec<ProviderId> {
        self.router.plan().await
    }

    /// Feeds the quote lookups of this invocation actually tried. Falls back
    /// to the plan when every quote came from the cache.
    pub async fn attempted_chain(&self) -> Vec<ProviderId> {
        let attempted = self.router.take_attempted_chain();
        if attempted.is_empty() {
            return self.source_chain().await;
        }
        attempted
    }
}

pub async fn run(cli: &Cli) -> Result<Envelope<Value>, CliError> {
    let started = Instant::now();
    let context = Context::from_cli(cli)?;

    let command_result = match &cli.command {
        Command::Search(args) => search::run(args, cli, &context).await?,
        Command::Quote(args) => quote::run(args, &context).await?,
        Command::Heatmap(args) => heatmap::run(args, &context).await?,
        Command::Sources => sources::run(&context).await?,
    };

    let CommandResult {
        data,
        warnings,
        errors,
        cache_hit,
        source_chain,
    } = command_result;

    let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    let mut metadata = Metadata::new(source_chain, latency_ms, cache_hit);
    for warning in warnings {
        metadata.push_warning(warning);
    }
    let meta = metadata.into_envelope_meta()?;

    Envelope::with_errors(meta, data, errors).map_err(CliError::from)
}

/// Catalog sources named on the command line, in load order.
pub fn catalog_sources(cli: &Cli) -> Vec<CatalogSource> {
    let mut sources: Vec<CatalogSource> = cli
        .catalogs
        .iter()
        .cloned()
        .map(CatalogSource::stocks)
        .collect();
    sources.extend(cli.etf_sse.clone().map(CatalogSource::sse_etf));
    sources.extend(cli.etf_szse.clone().map(CatalogSource::szse_etf));
    sources
}

/// Loads what it can; unreadable sources become warnings.
pub fn load_catalog(cli: &Cli) -> (Catalog, Vec<String>) {
    let sources = catalog_sources(cli);
    if sources.is_empty() {
        return (
            Catalog::default(),
            vec![String::from(
                "no catalog source given; pass --catalog, --etf-sse or --etf-szse",
            )],
        );
    }

    let (catalog, failures) = Catalog::load_degraded(&sources);
    let warnings = failures
        .into_iter()
        .map(|error| format!("catalog load failed: {error}"))
        .collect();
    (catalog, warnings)
}
