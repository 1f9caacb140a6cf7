//! MovieSync CLI - Command line client for an offline-first movie catalog.
//!
//! Reads and writes go to the movie service when it is reachable and fall
//! back to local state when it is not. Writes made while disconnected are
//! queued and can be replayed with `moviesync sync`.

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use moviesync_common::{
    Movie, MovieId, MovieQuery, PageWindow, SortField, SortOrder, DEFAULT_PER_PAGE,
};
use moviesync_storage::{FileStore, HttpProvider};
use moviesync_sync::{ClientConfig, MovieCatalog, OperationPayload, ProbeScheduler, SyncMode};

type Catalog = MovieCatalog<HttpProvider>;

#[derive(Parser)]
#[command(name = "moviesync")]
#[command(about = "MovieSync - Offline-first movie catalog client")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Config file (JSON).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Movie service API root, overriding the config file.
    #[arg(long)]
    base_url: Option<String>,

    /// Directory for local state, overriding the config file.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List movies.
    List {
        /// Case-insensitive text to match in name or description.
        #[arg(short, long)]
        filter: Option<String>,

        /// Sort field: name, releaseDate or rating.
        #[arg(short, long)]
        sort: Option<SortField>,

        /// Sort order: asc or desc.
        #[arg(short, long, default_value = "asc")]
        order: SortOrder,

        /// Show only this page (from 1).
        #[arg(short, long)]
        page: Option<usize>,

        /// Movies per page.
        #[arg(long, default_value_t = DEFAULT_PER_PAGE, requires = "page")]
        per_page: usize,
    },

    /// Show one movie.
    Show {
        /// Movie ID.
        id: String,
    },

    /// Add a movie.
    Add {
        #[arg(short, long)]
        name: String,

        /// Genre (repeatable).
        #[arg(short, long = "genre", required = true)]
        genres: Vec<String>,

        /// Release date (YYYY-MM-DD).
        #[arg(short, long)]
        release_date: String,

        /// Rating from 1 to 10.
        #[arg(long)]
        rating: f64,

        #[arg(short, long, default_value = "")]
        description: String,
    },

    /// Change fields of an existing movie.
    Update {
        /// Movie ID.
        id: String,

        #[arg(short, long)]
        name: Option<String>,

        /// Genre (repeatable). Replaces all genres.
        #[arg(short, long = "genre")]
        genres: Vec<String>,

        /// Release date (YYYY-MM-DD).
        #[arg(short, long)]
        release_date: Option<String>,

        #[arg(long)]
        rating: Option<f64>,

        #[arg(short, long)]
        description: Option<String>,
    },

    /// Delete a movie.
    Delete {
        /// Movie ID.
        id: String,
    },

    /// Probe the service and show connectivity and queued work.
    Status,

    /// Show operations waiting for replay.
    Pending,

    /// Replay queued operations against the service.
    Sync,

    /// Show collection statistics.
    Stats,

    /// Probe periodically and print connectivity changes until Ctrl-C.
    Watch {
        /// Replay queued operations whenever the service comes back.
        #[arg(long)]
        auto_sync: bool,
    },

    /// Generate shell completions.
    Completions {
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "moviesync", &mut std::io::stdout());
        return Ok(());
    }

    let config = load_config(&cli).await?;
    let catalog = open_catalog(&config).await?;

    match cli.command {
        Commands::List {
            filter,
            sort,
            order,
            page,
            per_page,
        } => {
            let page = page
                .map(|page| PageWindow::new(page, per_page))
                .transpose()
                .context("Invalid page")?;
            let query = MovieQuery {
                filter,
                sort,
                order,
                page,
            };
            cmd_list(&catalog, query).await
        }

        Commands::Show { id } => cmd_show(&catalog, &id).await,

        Commands::Add {
            name,
            genres,
            release_date,
            rating,
            description,
        } => cmd_add(&catalog, Movie::new(name, genres, release_date, rating, description)).await,

        Commands::Update {
            id,
            name,
            genres,
            release_date,
            rating,
            description,
        } => {
            let changes = MovieChanges {
                name,
                genres,
                release_date,
                rating,
                description,
            };
            cmd_update(&catalog, &id, changes).await
        }

        Commands::Delete { id } => cmd_delete(&catalog, &id).await,

        Commands::Status => cmd_status(&catalog).await,

        Commands::Pending => cmd_pending(&catalog).await,

        Commands::Sync => cmd_sync(&catalog).await,

        Commands::Stats => cmd_stats(&catalog).await,

        Commands::Watch { auto_sync } => {
            let mode = if auto_sync {
                SyncMode::OnReconnect
            } else {
                config.sync_mode
            };
            cmd_watch(Arc::new(catalog), &config, mode).await
        }

        Commands::Completions { .. } => Ok(()),
    }
}

/// Resolve the config file, then apply command-line overrides.
async fn load_config(cli: &Cli) -> Result<ClientConfig> {
    let mut config = match &cli.config {
        Some(path) => ClientConfig::load(path)
            .await
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ClientConfig::default(),
    };

    if let Some(base_url) = &cli.base_url {
        config.base_url = base_url.clone();
    }
    if let Some(data_dir) = &cli.data_dir {
        config.data_dir = data_dir.clone();
    }

    config.validate().context("Invalid configuration")?;
    debug!("Using config: {:?}", config);
    Ok(config)
}

/// Open local state and take an initial connectivity reading.
async fn open_catalog(config: &ClientConfig) -> Result<Catalog> {
    let provider = HttpProvider::new(&config.base_url).context("Invalid service URL")?;
    let store = FileStore::open(&config.data_dir)
        .await
        .with_context(|| format!("Failed to open data directory {}", config.data_dir.display()))?;

    let catalog = MovieCatalog::open(Arc::new(provider), Arc::new(store))
        .await
        .context("Failed to load local state")?;

    catalog.check_server_status().await;
    info!("Service is {}", catalog.status());

    Ok(catalog)
}

fn parse_id(id: &str) -> Result<MovieId> {
    MovieId::new(id).context("Invalid movie ID")
}

fn print_movie(movie: &Movie) {
    let id = movie.id.as_ref().map(MovieId::as_str).unwrap_or("-");
    println!(
        "  [{}] {} ({}) {:.1}/10 - {}",
        id,
        movie.name,
        movie.release_date,
        movie.rating,
        movie.genres.join(", ")
    );
    if !movie.description.is_empty() {
        println!("      {}", movie.description);
    }
}

/// List movies.
async fn cmd_list(catalog: &Catalog, query: MovieQuery) -> Result<()> {
    let movies = catalog
        .list_movies(&query)
        .await
        .context("Failed to list movies")?;

    if movies.is_empty() {
        println!("No movies.");
    } else {
        match query.page {
            Some(window) => println!(
                "Page {}: {} movies ({}):",
                window.page,
                movies.len(),
                catalog.status()
            ),
            None => println!("{} movies ({}):", movies.len(), catalog.status()),
        }
        for movie in &movies {
            print_movie(movie);
        }
    }

    Ok(())
}

/// Show one movie.
async fn cmd_show(catalog: &Catalog, id: &str) -> Result<()> {
    let movie = catalog
        .get_movie(&parse_id(id)?)
        .await
        .context("Failed to fetch movie")?;

    println!("{}", serde_json::to_string_pretty(&movie)?);
    Ok(())
}

/// Add a movie.
async fn cmd_add(catalog: &Catalog, movie: Movie) -> Result<()> {
    info!("Adding movie: {}", movie.name);

    let online = catalog.monitor().is_online();
    let added = catalog.add_movie(movie).await.context("Failed to add movie")?;

    println!("Movie added{}:", queued_suffix(online, catalog));
    print_movie(&added);
    Ok(())
}

/// Field changes for `update`; `None` keeps the current value.
struct MovieChanges {
    name: Option<String>,
    genres: Vec<String>,
    release_date: Option<String>,
    rating: Option<f64>,
    description: Option<String>,
}

impl MovieChanges {
    fn apply_to(self, movie: &mut Movie) {
        if let Some(name) = self.name {
            movie.name = name;
        }
        if !self.genres.is_empty() {
            movie.genres = self.genres;
        }
        if let Some(release_date) = self.release_date {
            movie.release_date = release_date;
        }
        if let Some(rating) = self.rating {
            movie.rating = rating;
        }
        if let Some(description) = self.description {
            movie.description = description;
        }
    }
}

/// Change an existing movie.
async fn cmd_update(catalog: &Catalog, id: &str, changes: MovieChanges) -> Result<()> {
    let id = parse_id(id)?;
    let mut movie = catalog
        .get_movie(&id)
        .await
        .context("Failed to fetch movie")?;
    changes.apply_to(&mut movie);

    let online = catalog.monitor().is_online();
    let updated = catalog
        .update_movie(movie)
        .await
        .context("Failed to update movie")?;

    println!("Movie updated{}:", queued_suffix(online, catalog));
    print_movie(&updated);
    Ok(())
}

/// Delete a movie.
async fn cmd_delete(catalog: &Catalog, id: &str) -> Result<()> {
    let id = parse_id(id)?;
    let online = catalog.monitor().is_online();
    catalog
        .delete_movie(&id)
        .await
        .context("Failed to delete movie")?;

    println!("Movie deleted{}: {}", queued_suffix(online, catalog), id);
    Ok(())
}

/// Tell the user when a write only landed locally.
fn queued_suffix(was_online: bool, catalog: &Catalog) -> &'static str {
    if was_online && catalog.monitor().is_online() {
        ""
    } else {
        " locally (queued for sync)"
    }
}

/// Show connectivity and queued work.
async fn cmd_status(catalog: &Catalog) -> Result<()> {
    println!("Service: {}", catalog.status());
    println!("Pending operations: {}", catalog.pending_count().await);
    println!("Movies in local mirror: {}", catalog.mirror_snapshot().await.len());
    Ok(())
}

/// Show queued operations.
async fn cmd_pending(catalog: &Catalog) -> Result<()> {
    let operations = catalog.pending_operations().await;

    if operations.is_empty() {
        println!("Nothing pending.");
        return Ok(());
    }

    println!("{} pending operations:", operations.len());
    for (index, operation) in operations.iter().enumerate() {
        let recorded = chrono::DateTime::from_timestamp_millis(operation.recorded_at_millis)
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| operation.recorded_at_millis.to_string());
        let target = match &operation.payload {
            OperationPayload::Movie(movie) => movie.name.clone(),
            OperationPayload::Id { id } => id.to_string(),
        };
        println!("  #{} {:<6} {} ({})", index, operation.kind, target, recorded);
    }

    Ok(())
}

/// Replay queued operations.
async fn cmd_sync(catalog: &Catalog) -> Result<()> {
    let report = catalog
        .sync_pending_operations()
        .await
        .context("Failed to sync pending operations")?;

    println!("Sync complete:");
    println!("  Replayed: {}", report.replayed);
    println!("  Dropped: {}", report.failed);
    println!("  Duration: {:?}", report.duration);
    Ok(())
}

/// Show collection statistics.
async fn cmd_stats(catalog: &Catalog) -> Result<()> {
    let stats = catalog.statistics().await.context("Failed to compute statistics")?;

    println!("Movies: {}", stats.total);
    if let Some(average) = stats.average_rating {
        println!("Average rating: {:.2}", average);
    }
    println!("By genre:");
    for (genre, count) in &stats.by_genre {
        println!("  {:<16} {}", genre, count);
    }
    println!("By year:");
    for (year, count) in &stats.by_year {
        println!("  {:<16} {}", year, count);
    }
    println!("Ratings:");
    for (rating, count) in &stats.rating_histogram {
        println!("  {:>2} {}", rating, "#".repeat(*count));
    }

    Ok(())
}

/// Run the probe loop and print status changes until interrupted.
async fn cmd_watch(catalog: Arc<Catalog>, config: &ClientConfig, mode: SyncMode) -> Result<()> {
    let (scheduler, handle) = ProbeScheduler::new(config.probe_interval(), mode);
    let mut changes = catalog.monitor().subscribe();
    let task = tokio::spawn(handle.run(catalog.clone()));

    println!(
        "Watching {} every {:?} (Ctrl-C to stop)",
        config.base_url,
        config.probe_interval()
    );
    let mut last = catalog.status();
    println!("Service: {}", last);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,

            change = changes.recv() => match change {
                Ok(change) if change.status != last => {
                    last = change.status;
                    println!(
                        "Service: {} ({} pending)",
                        last,
                        catalog.pending_count().await
                    );
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
        }
    }

    scheduler.shutdown().await;
    task.await.context("Probe scheduler task failed")?;
    Ok(())
}
