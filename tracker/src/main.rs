use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tracker::{
    alerts::LogAlertSink,
    config::{OffRouteMeasure, ProviderConfig, TrackingConfig},
    create_router,
    error::AppError,
    geo::path_length_km,
    gpx_export::{read_path, run_to_gpx_bytes},
    models::{units, Coordinate, Difficulty, Route, RunRecord, UserProfile},
    planner::{RouteDetails, RouteDraft},
    position::ReplaySource,
    providers::{
        DirectionsProvider, GeminiClient, Offline, OsrmClient, OverpassClient, PoiProvider,
        TextGenerator,
    },
    recording::RecordingPipeline,
    runner::{control, SessionOutcome, SessionRunner},
    session::LiveSession,
    storage::{JsonFileStore, RunStore},
    AppState,
};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Live run tracking against planned routes, with run history"
)]
struct Cli {
    /// Directory holding runs.json, routes.json and profile.json
    #[arg(long, env = "STRIDE_DATA_DIR", default_value = "data", global = true)]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Replay a recorded track as a live session against a planned route
    Replay(ReplayArgs),
    /// Snap points onto the walking network and save the result as a route
    Plan(PlanArgs),
    /// Serve the run history API
    Serve {
        #[arg(long, env = "STRIDE_ADDR", default_value = "0.0.0.0:8080")]
        addr: SocketAddr,
    },
    /// Print recorded runs and profile totals
    Runs,
}

#[derive(Debug, Args)]
struct ReplayArgs {
    /// Planned route as a GPX file
    #[arg(long, required_unless_present = "route_id", conflicts_with = "route_id")]
    route_gpx: Option<PathBuf>,

    /// Id of a saved route
    #[arg(long)]
    route_id: Option<String>,

    /// Track to replay; defaults to the planned path itself
    #[arg(long)]
    track: Option<PathBuf>,

    /// Delay between replayed samples
    #[arg(long, default_value_t = 1000)]
    cadence_ms: u64,

    /// Reported horizontal accuracy of replayed samples
    #[arg(long, default_value_t = 5.0)]
    accuracy_m: f64,

    /// Session clock period; lower it to replay faster than real time
    #[arg(long)]
    tick_ms: Option<u64>,

    #[arg(long)]
    off_route_m: Option<f64>,

    #[arg(long, value_enum)]
    off_route_measure: Option<OffRouteMeasure>,

    /// OSM amenity looked up around the route start
    #[arg(long)]
    poi_category: Option<String>,

    /// Skip every network provider
    #[arg(long)]
    offline: bool,

    /// Write the finished run as GPX to this path
    #[arg(long)]
    export: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct PlanArgs {
    /// Saved route to extend; it keeps its id when saved again
    #[arg(long)]
    route_id: Option<String>,

    /// Required for a new route; an edited route keeps its name otherwise
    #[arg(long, required_unless_present = "route_id")]
    name: Option<String>,

    /// Point as `lat,lon`; repeat in drawing order
    #[arg(
        long = "point",
        value_parser = parse_coordinate,
        required_unless_present = "route_id"
    )]
    points: Vec<Coordinate>,

    /// Route back to the first point
    #[arg(long)]
    close_loop: bool,

    #[arg(long)]
    description: Option<String>,

    /// Defaults to the edited route's difficulty, else easy
    #[arg(long, value_parser = parse_difficulty)]
    difficulty: Option<Difficulty>,

    #[arg(long = "tag")]
    tags: Vec<String>,

    /// Skip every network provider
    #[arg(long)]
    offline: bool,
}

fn parse_coordinate(value: &str) -> Result<Coordinate, String> {
    let (lat, lon) = value
        .split_once(',')
        .ok_or_else(|| format!("expected lat,lon, got {value:?}"))?;
    let lat: f64 = lat.trim().parse().map_err(|_| format!("bad latitude {lat:?}"))?;
    let lon: f64 = lon.trim().parse().map_err(|_| format!("bad longitude {lon:?}"))?;
    let coordinate = Coordinate::new(lat, lon);
    if !coordinate.is_valid() {
        return Err(format!("{value:?} is outside WGS84 bounds"));
    }
    Ok(coordinate)
}

fn parse_difficulty(value: &str) -> Result<Difficulty, String> {
    match value.to_ascii_lowercase().as_str() {
        "easy" => Ok(Difficulty::Easy),
        "moderate" => Ok(Difficulty::Moderate),
        "hard" => Ok(Difficulty::Hard),
        other => Err(format!("unknown difficulty {other:?}")),
    }
}

struct Providers {
    directions: Arc<dyn DirectionsProvider>,
    pois: Arc<dyn PoiProvider>,
    text: Arc<dyn TextGenerator>,
}

fn providers(offline: bool) -> Result<Providers, AppError> {
    if offline {
        tracing::info!("Offline mode: no directions, points of interest or coaching");
        return Ok(Providers {
            directions: Arc::new(Offline),
            pois: Arc::new(Offline),
            text: Arc::new(Offline),
        });
    }
    let config = ProviderConfig::from_env();
    let http = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()?;
    Ok(Providers {
        directions: Arc::new(OsrmClient::new(http.clone(), &config)),
        pois: Arc::new(OverpassClient::new(http.clone(), &config)),
        text: Arc::new(GeminiClient::new(http, &config)),
    })
}

fn read_gpx_file(path: &Path) -> Result<Vec<Coordinate>, AppError> {
    let file = std::fs::File::open(path).map_err(|source| AppError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(read_path(std::io::BufReader::new(file))?)
}

fn route_from_gpx(path: &Path) -> Result<Route, AppError> {
    let points = read_gpx_file(path)?;
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Imported route".into());
    Ok(Route {
        id: uuid::Uuid::new_v4().to_string(),
        name,
        description: String::new(),
        distance_km: path_length_km(&points),
        path: points,
        elevation_gain_m: 0.0,
        difficulty: Difficulty::default(),
        tags: Vec::new(),
        created_at: Utc::now(),
    })
}

async fn replay(store: Arc<dyn RunStore>, args: ReplayArgs) -> Result<(), AppError> {
    let mut tracking = TrackingConfig::from_env()?;
    if let Some(m) = args.off_route_m {
        tracking.off_route_threshold_m = m;
    }
    if let Some(measure) = args.off_route_measure {
        tracking.off_route_measure = measure;
    }
    if let Some(category) = args.poi_category {
        tracking.poi_category = category;
    }
    if let Some(ms) = args.tick_ms {
        tracking.tick_period = Duration::from_millis(ms.max(1));
    }
    tracking.validate()?;

    let route = match (&args.route_gpx, &args.route_id) {
        (Some(path), _) => route_from_gpx(path)?,
        (None, Some(id)) => store.get_route(id).await?,
        (None, None) => {
            return Err(AppError::InvalidArgument(
                "either --route-gpx or --route-id is required".into(),
            ))
        }
    };
    let track = match &args.track {
        Some(path) => read_gpx_file(path)?,
        None => route.path.clone(),
    };
    tracing::info!(
        "Replaying {} samples against '{}' ({:.2} km)",
        track.len(),
        route.name,
        route.distance_km
    );

    let tick_period = tracking.tick_period;
    let session = LiveSession::new(route, tracking)?;
    let mut source = ReplaySource::new(track, Duration::from_millis(args.cadence_ms))
        .with_accuracy(args.accuracy_m);
    let replay_length = source.duration() + tick_period;

    let Providers {
        directions,
        pois,
        text,
    } = providers(args.offline)?;
    let pipeline = RecordingPipeline::new(text, Arc::clone(&store));
    let runner = SessionRunner::new(directions, pois, Arc::new(LogAlertSink), pipeline);

    let (control, commands) = control();
    tokio::spawn(async move {
        let sent = tokio::select! {
            _ = tokio::time::sleep(replay_length) => control.finish().await,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, cancelling session");
                control.cancel().await
            }
        };
        if sent.is_err() {
            tracing::debug!("Session ended before the replay did");
        }
    });

    match runner.run(session, &mut source, commands).await? {
        SessionOutcome::Cancelled => println!("Session cancelled, nothing recorded."),
        SessionOutcome::Finished(record) => {
            let profile = store.profile().await?;
            print_run(&record, &profile);
            if let Some(path) = args.export {
                let bytes = run_to_gpx_bytes(&record)?;
                tokio::fs::write(&path, bytes)
                    .await
                    .map_err(|source| AppError::Io {
                        path: path.display().to_string(),
                        source,
                    })?;
                println!("GPX written to {}", path.display());
            }
        }
    }
    Ok(())
}

async fn plan(store: Arc<dyn RunStore>, args: PlanArgs) -> Result<(), AppError> {
    let Providers {
        directions, text, ..
    } = providers(args.offline)?;

    let existing = match &args.route_id {
        Some(id) => Some(store.get_route(id).await?),
        None => None,
    };
    let mut draft = existing.as_ref().map(RouteDraft::edit).unwrap_or_default();
    for point in args.points {
        draft.add_point(directions.as_ref(), point).await?;
    }
    if args.close_loop {
        draft.close_loop(directions.as_ref()).await?;
    }

    let details = match existing {
        Some(route) => RouteDetails {
            name: args.name.unwrap_or(route.name),
            // a changed path gets a fresh description unless one is given
            description: args.description,
            difficulty: args.difficulty.unwrap_or(route.difficulty),
            tags: if args.tags.is_empty() { route.tags } else { args.tags },
        },
        None => RouteDetails {
            name: args.name.unwrap_or_default(),
            description: args.description,
            difficulty: args.difficulty.unwrap_or_default(),
            tags: args.tags,
        },
    };
    let route = draft.finalize(details, text.as_ref()).await?;
    store.save_route(&route).await?;

    let system = store.profile().await?.unit_system;
    println!("Saved route {} ({})", route.name, route.id);
    println!(
        "  {} | {} gain | {} points",
        units::format_distance(route.distance_km, system),
        units::format_elevation(route.elevation_gain_m, system),
        route.path.len()
    );
    println!("  {}", route.description);
    Ok(())
}

async fn serve(store: Arc<dyn RunStore>, addr: SocketAddr) -> Result<(), AppError> {
    let app = create_router(AppState { store });
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| AppError::Io {
            path: addr.to_string(),
            source,
        })?;
    tracing::info!("starting stride API on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await
        .map_err(|source| AppError::Io {
            path: addr.to_string(),
            source,
        })
}

async fn list_runs(store: Arc<dyn RunStore>) -> Result<(), AppError> {
    let profile = store.profile().await?;
    let runs = store.list_runs().await?;
    println!(
        "{}: {} over {} runs",
        profile.username,
        units::format_distance(profile.stats.total_distance_km, profile.unit_system),
        profile.stats.total_runs
    );
    for run in &runs {
        print_run(run, &profile);
    }
    Ok(())
}

fn print_run(run: &RunRecord, profile: &UserProfile) {
    let system = profile.unit_system;
    println!(
        "{}  {}  {}  {}  {} {}",
        run.started_at.format("%Y-%m-%d %H:%M"),
        run.route_name,
        units::format_distance(run.distance_km, system),
        units::format_elapsed(run.duration_seconds),
        units::format_pace(run.average_pace.map(|p| p.seconds_per_km()), system),
        system.pace_unit()
    );
    if let Some(tips) = &run.coaching_tips {
        println!("    {tips}");
    }
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stride=info,tracker=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let store: Arc<dyn RunStore> = Arc::new(JsonFileStore::open(cli.data_dir.clone()).await?);

    match cli.command {
        Command::Replay(args) => replay(store, args).await,
        Command::Plan(args) => plan(store, args).await,
        Command::Serve { addr } => serve(store, addr).await,
        Command::Runs => list_runs(store).await,
    }
}
