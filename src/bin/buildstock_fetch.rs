use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use buildstock_fetch::app::{App, DEFAULT_KEY_SAMPLE_PAGES, FetchOptions};
use buildstock_fetch::config::{ConfigLoader, ResolvedConfig};
use buildstock_fetch::domain::{CatalogKey, StateCode};
use buildstock_fetch::download::HttpDownloader;
use buildstock_fetch::error::FetchError;
use buildstock_fetch::listing::S3HttpLister;
use buildstock_fetch::output::{JsonOutput, OutputMode, TextOutput};
use buildstock_fetch::store::Store;

#[derive(Parser)]
#[command(name = "buildstock-fetch")]
#[command(about = "Catalog and download ResStock/ComStock building energy model releases")]
#[command(version)]
struct Cli {
    /// Emit JSON on stdout instead of text.
    #[arg(long, global = true)]
    json: bool,

    /// Path to a buildstock-fetch.json config file.
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Crawl the bucket and rewrite the release catalog (default)")]
    Catalog(CatalogArgs),
    #[command(about = "List releases in the catalog")]
    Releases,
    #[command(about = "List building ids for a state")]
    Ids(SelectArgs),
    #[command(about = "Download building energy models for a state")]
    Fetch(FetchArgs),
    #[command(about = "Download metadata tables for a release")]
    Metadata(MetadataArgs),
    #[command(about = "Sample model object keys under the dataset root")]
    Keys(KeysArgs),
}

#[derive(Args, Default)]
struct CatalogArgs {
    /// Catalog output path (overrides config).
    #[arg(long)]
    output: Option<String>,
}

#[derive(Args, Clone)]
struct SelectArgs {
    state: String,

    /// Catalog key, e.g. res_2022_tmy3_1.
    #[arg(long)]
    release: Option<String>,

    #[arg(long)]
    upgrade: Option<u32>,
}

#[derive(Args)]
struct FetchArgs {
    #[command(flatten)]
    select: SelectArgs,

    #[arg(long)]
    extract: bool,

    #[arg(long)]
    force: bool,

    #[arg(long)]
    dry_run: bool,
}

#[derive(Args)]
struct MetadataArgs {
    #[arg(long)]
    release: String,

    #[arg(long)]
    force: bool,

    #[arg(long)]
    dry_run: bool,
}

#[derive(Args)]
struct KeysArgs {
    #[arg(long, default_value_t = DEFAULT_KEY_SAMPLE_PAGES)]
    max_pages: usize,

    #[arg(long, default_value = "available_urls.json")]
    output: String,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<FetchError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &FetchError) -> u8 {
    match error {
        FetchError::MissingCatalog(_)
        | FetchError::ReleaseNotFound(_)
        | FetchError::UpgradeNotAvailable { .. }
        | FetchError::UnsupportedState(_)
        | FetchError::InvalidStateCode(_)
        | FetchError::InvalidCatalogKey(_) => 2,
        FetchError::ListingHttp(_)
        | FetchError::ListingStatus { .. }
        | FetchError::ListingParse(_)
        | FetchError::DownloadHttp(_)
        | FetchError::DownloadStatus { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Text
    };
    let config = ConfigLoader::resolve(cli.config.as_deref())?;

    match cli.command.unwrap_or(Command::Catalog(CatalogArgs::default())) {
        Command::Catalog(args) => run_catalog(args, &config, mode),
        Command::Releases => run_releases(&config, mode),
        Command::Ids(args) => run_ids(args, &config, mode),
        Command::Fetch(args) => run_fetch(args, &config, mode),
        Command::Metadata(args) => run_metadata(args, &config, mode),
        Command::Keys(args) => run_keys(args, &config, mode),
    }
}

fn build_app(
    config: &ResolvedConfig,
    store: Store,
) -> Result<App<S3HttpLister, HttpDownloader>, FetchError> {
    let listing = S3HttpLister::new(&config.location.base_url, config.timeout)?;
    let downloader = HttpDownloader::new(config.timeout)?;
    Ok(App::new(store, config.location.clone(), listing, downloader))
}

fn run_catalog(args: CatalogArgs, config: &ResolvedConfig, mode: OutputMode) -> miette::Result<()> {
    let mut store = Store::from_config(config);
    if let Some(output) = args.output {
        store = store.with_catalog_path(Utf8PathBuf::from(output));
    }
    let app = build_app(config, store)?;
    match mode {
        OutputMode::Json => {
            let result = app.build_catalog(&JsonOutput)?;
            JsonOutput::print(&result).into_diagnostic()
        }
        OutputMode::Text => {
            let result = app.build_catalog(&TextOutput)?;
            TextOutput::print_catalog(&result);
            Ok(())
        }
    }
}

fn run_releases(config: &ResolvedConfig, mode: OutputMode) -> miette::Result<()> {
    let app = build_app(config, Store::from_config(config))?;
    match mode {
        OutputMode::Json => {
            let result = app.releases(&JsonOutput)?;
            JsonOutput::print(&result).into_diagnostic()
        }
        OutputMode::Text => {
            let result = app.releases(&TextOutput)?;
            TextOutput::print_releases(&result);
            Ok(())
        }
    }
}

fn parse_selection(args: &SelectArgs) -> Result<(StateCode, Option<CatalogKey>), FetchError> {
    let state = args.state.parse::<StateCode>()?;
    let release = args
        .release
        .as_deref()
        .map(str::parse::<CatalogKey>)
        .transpose()?;
    Ok((state, release))
}

fn run_ids(args: SelectArgs, config: &ResolvedConfig, mode: OutputMode) -> miette::Result<()> {
    let (state, release) = parse_selection(&args)?;
    let app = build_app(config, Store::from_config(config))?;
    let result = app.building_ids(&state, release.as_ref(), args.upgrade)?;
    match mode {
        OutputMode::Json => JsonOutput::print(&result).into_diagnostic(),
        OutputMode::Text => {
            TextOutput::print_ids(&result);
            Ok(())
        }
    }
}

fn run_fetch(args: FetchArgs, config: &ResolvedConfig, mode: OutputMode) -> miette::Result<()> {
    let (state, release) = parse_selection(&args.select)?;
    let app = build_app(config, Store::from_config(config))?;
    let ids = app
        .building_ids(&state, release.as_ref(), args.select.upgrade)?
        .buildings;
    let options = FetchOptions {
        force: args.force,
        extract: args.extract,
        dry_run: args.dry_run,
    };
    match mode {
        OutputMode::Json => {
            let result = app.fetch_buildings(&ids, &options, &JsonOutput)?;
            JsonOutput::print(&result).into_diagnostic()
        }
        OutputMode::Text => {
            let result = app.fetch_buildings(&ids, &options, &TextOutput)?;
            TextOutput::print_fetch(&result);
            Ok(())
        }
    }
}

fn run_metadata(args: MetadataArgs, config: &ResolvedConfig, mode: OutputMode) -> miette::Result<()> {
    let key = args.release.parse::<CatalogKey>()?;
    let app = build_app(config, Store::from_config(config))?;
    let options = FetchOptions {
        force: args.force,
        extract: false,
        dry_run: args.dry_run,
    };
    match mode {
        OutputMode::Json => {
            let result = app.fetch_metadata(&key, &options, &JsonOutput)?;
            JsonOutput::print(&result).into_diagnostic()
        }
        OutputMode::Text => {
            let result = app.fetch_metadata(&key, &options, &TextOutput)?;
            TextOutput::print_metadata(&result);
            Ok(())
        }
    }
}

fn run_keys(args: KeysArgs, config: &ResolvedConfig, mode: OutputMode) -> miette::Result<()> {
    let app = build_app(config, Store::from_config(config))?;
    let output = Utf8PathBuf::from(args.output);
    match mode {
        OutputMode::Json => {
            let result = app.sample_model_keys(args.max_pages, &output, &JsonOutput)?;
            JsonOutput::print(&result).into_diagnostic()
        }
        OutputMode::Text => {
            let result = app.sample_model_keys(args.max_pages, &output, &TextOutput)?;
            TextOutput::print_keys(&result);
            Ok(())
        }
    }
}
