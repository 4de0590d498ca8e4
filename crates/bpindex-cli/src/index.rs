use std::{
    fs,
    io::{self, Read},
    sync::Arc,
    time::Duration,
};

use bpindex_config::{config::get_config, utils::resolve_path};
use bpindex_core::{
    process_batch, BpIndexResult, DbIndexSink, DryRunSink, Entry, ErrorContext, IndexOptions,
    IndexSink, Report,
};
use bpindex_oci::{http_client::ClientConfig, RegistryFetcher};
use nu_ansi_term::Color::{Green, Red};
use tracing::{debug, info};

use crate::utils::Colored;

pub struct IndexArgs {
    pub input: Option<String>,
    pub entry: Option<String>,
    pub parallel: Option<usize>,
    pub timeout: Option<Duration>,
    pub db: Option<String>,
    pub dry_run: bool,
}

/// Reads the batch from a file, stdin (`-`) or a single inline entry.
pub fn read_batch(input: Option<&str>, entry: Option<&str>) -> BpIndexResult<Vec<Entry>> {
    if let Some(entry) = entry {
        return Ok(vec![Entry::parse_one(entry, "--entry")?]);
    }

    match input {
        Some("-") | None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .with_context(|| "reading entries from stdin".to_string())?;
            Entry::parse_batch(&buffer, "stdin")
        }
        Some(path) => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("reading entries from {path}"))?;
            Entry::parse_batch(&content, path)
        }
    }
}

pub async fn index_buildpacks(args: IndexArgs, mut client: ClientConfig) -> BpIndexResult<Report> {
    let batch = read_batch(args.input.as_deref(), args.entry.as_deref())?;
    let config = get_config();

    let mut options = IndexOptions::from_config(&config)?;
    if let Some(parallel) = args.parallel {
        options.parallel_limit = parallel.max(1);
    }
    if let Some(timeout) = args.timeout {
        options.fetch_timeout = timeout;
    }
    debug!(
        "indexing {} entries with {} parallel fetches",
        batch.len(),
        options.parallel_limit
    );

    if client.timeout.is_none() {
        client.timeout = Some(options.fetch_timeout);
    }
    let fetcher = RegistryFetcher::new(&client)
        .insecure_registries(config.insecure_registries.clone().unwrap_or_default())
        .token(config.registry_token.clone());

    let mut sink: Box<dyn IndexSink> = if args.dry_run {
        Box::new(DryRunSink::new())
    } else {
        let db_path = match args.db.as_deref() {
            Some(path) => resolve_path(path)?,
            None => config.get_db_path()?,
        };
        Box::new(DbIndexSink::open(db_path)?)
    };

    let report = process_batch(batch, Arc::new(fetcher), sink.as_mut(), &options).await;

    let marker = if report.failed() == 0 {
        Colored(Green, "done")
    } else {
        Colored(Red, "done")
    };
    info!("{marker}: {}", report.summary());

    Ok(report)
}
