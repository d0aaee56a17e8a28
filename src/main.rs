use std::{
    io::{self, Write},
    process,
    sync::Arc,
};

use serde::Serialize;
use serde_json::json;
use tessera::{
    application::{
        error::AppError,
        maintenance::CacheMaintenance,
        render::{FragmentCache, InterpolatingEvaluator},
    },
    cache::FragmentCacheConfig,
    config,
    domain::fragments::TenantScope,
    infra::{error::InfraError, store::ContentStores, telemetry},
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(error.exit_code());
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_max_level(Level::ERROR)
        .with_writer(io::stderr)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match cli_args.command {
        config::Command::Key(args) => run_key(args),
        config::Command::Show(args) => run_show(&settings, args).await,
        config::Command::Lookup(args) => run_lookup(&settings, args).await,
        config::Command::Evict(args) => run_evict(&settings, args).await,
        config::Command::Purge(args) => run_purge(&settings, args).await,
    }
}

fn maintenance(settings: &config::Settings) -> Result<CacheMaintenance, AppError> {
    let stores = ContentStores::open(&settings.store).map_err(InfraError::from)?;
    let cache = FragmentCache::new(
        FragmentCacheConfig::from(&settings.cache),
        Arc::new(stores),
        Arc::new(InterpolatingEvaluator::new()),
    );
    Ok(CacheMaintenance::new(Arc::new(cache)))
}

fn scope(args: &config::ScopeArgs) -> Result<TenantScope, AppError> {
    Ok(TenantScope::new(args.tenant.as_str(), args.branch.as_str())?)
}

fn run_key(args: config::KeyArgs) -> Result<(), AppError> {
    let (fragment, key) = CacheMaintenance::derive_key(&args.fragment, &args.requirements)?;
    print_json(&json!({
        "fragment": fragment,
        "cache_key": key,
        "path": tessera::cache::fragment_path(&fragment, &key),
    }))
}

async fn run_show(settings: &config::Settings, args: config::ShowArgs) -> Result<(), AppError> {
    let scope = scope(&args.scope)?;
    let bytes = maintenance(settings)?
        .show(&scope, &args.fragment, &args.key)
        .await?;

    let mut stdout = io::stdout().lock();
    stdout
        .write_all(&bytes)
        .and_then(|()| stdout.flush())
        .map_err(|err| AppError::from(InfraError::from(err)))
}

async fn run_lookup(
    settings: &config::Settings,
    args: config::DependencyArgs,
) -> Result<(), AppError> {
    let scope = scope(&args.scope)?;
    let records = maintenance(settings)?
        .lookup(&scope, &args.dependency)
        .await?;
    print_json(&records)
}

async fn run_evict(
    settings: &config::Settings,
    args: config::DependencyArgs,
) -> Result<(), AppError> {
    let scope = scope(&args.scope)?;
    let eviction = maintenance(settings)?
        .evict(&scope, &args.dependency)
        .await?;

    let evicted: Vec<_> = eviction
        .renditions
        .iter()
        .map(|key| {
            json!({
                "fragment": key.fragment_id,
                "cache_key": key.cache_key,
            })
        })
        .collect();
    print_json(&json!({
        "dependency": args.dependency,
        "renditions": evicted,
        "artifacts_removed": eviction.artifacts_removed,
    }))
}

async fn run_purge(settings: &config::Settings, args: config::ScopeArgs) -> Result<(), AppError> {
    let scope = scope(&args)?;
    let removed = maintenance(settings)?.purge(&scope).await?;
    info!(op = "main::purge", scope = %scope, removed, "Purge completed");
    print_json(&json!({ "scope": scope.to_string(), "removed": removed }))
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let out = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::unexpected(format!("failed to render output: {err}")))?;
    println!("{out}");
    Ok(())
}
