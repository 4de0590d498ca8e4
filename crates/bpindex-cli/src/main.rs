use std::process::ExitCode;

use bpindex_config::{
    config::{self, generate_default_config, set_config_path},
    utils::resolve_path,
};
use bpindex_core::{BpIndexError, BpIndexResult};
use bpindex_oci::http_client::ClientConfig;
use clap::Parser;
use cli::Args;
use index::{index_buildpacks, IndexArgs};
use logging::setup_logging;
use show::show_buildpack;
use tracing::debug;

mod cli;
mod index;
mod logging;
mod show;
mod utils;

fn client_config(args: &Args) -> BpIndexResult<ClientConfig> {
    let mut client = ClientConfig::default();

    if let Some(proxy) = args.proxy.as_deref() {
        let proxy = ureq::Proxy::new(proxy)
            .map_err(|err| BpIndexError::Custom(format!("invalid proxy '{proxy}': {err}")))?;
        client.proxy = Some(proxy);
    }

    let user_agent = args
        .user_agent
        .clone()
        .or_else(|| config::get_config().user_agent);
    if user_agent.is_some() {
        client.user_agent = user_agent;
    }

    Ok(client)
}

async fn handle_cli(args: Args) -> BpIndexResult<()> {
    if let Some(ref c) = args.config {
        set_config_path(resolve_path(c)?);
    }

    match args.command {
        cli::Commands::DefConfig => {
            generate_default_config()?;
        }
        cli::Commands::Show { ref buildpack, ref db } => {
            config::init()?;
            show_buildpack(buildpack, db.as_deref())?;
        }
        cli::Commands::Index {
            ref input,
            ref entry,
            parallel,
            timeout,
            ref db,
            dry_run,
        } => {
            config::init()?;
            let client = client_config(&args)?;
            let report = index_buildpacks(
                IndexArgs {
                    input: input.clone(),
                    entry: entry.clone(),
                    parallel,
                    timeout,
                    db: db.clone(),
                    dry_run,
                },
                client,
            )
            .await?;
            debug!("{} outcomes recorded", report.len());
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .build(),
        )
    }))
    .ok();

    let args = Args::parse();
    setup_logging(&args);

    if args.no_color {
        utils::disable_color();
    }

    match handle_cli(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{:?}", miette::Report::new(err));
            ExitCode::FAILURE
        }
    }
}
