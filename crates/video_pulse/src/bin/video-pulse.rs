use std::sync::Arc;

use clap::Parser;
use job_datastore::PgDataStore;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use video_pulse::{
    client::{TerminalView, WatchClient, WatchOutcome},
    config::{Cli, Command, ServeArgs, WatchArgs},
    job::JobId,
    openai::WhisperTranscriber,
    registry::JobRegistry,
    server::{self, AppState, BackendStatus},
    sweeper,
    telemetry::init_tracing_subscriber,
    yt::audio_handler::YtDlp,
    JobProcessorBuilder,
};

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let store = Arc::new(PgDataStore::init(&args.database_url).await?);
    let yt_dlp = YtDlp::new_with_cookies(args.cookies_path.clone())?;

    let transcriber =
        WhisperTranscriber::new(&args.openai_key, yt_dlp.clone()).with_model(&args.whisper_model);
    let summarizer = args.summarizer()?;
    tracing::info!(
        summarizer = %args.summarizer,
        fallback = ?args.fallback_summarizer.0,
        "Summarizer configured"
    );

    let processor = JobProcessorBuilder::new(&args.workdir)
        .store(Arc::clone(&store))
        .audio_handler(yt_dlp)
        .transcriber(transcriber)
        .summarizer(summarizer)
        .with_chunking(args.chunk_duration)
        .build();

    let registry = Arc::new(JobRegistry::new(args.job_retention()));
    let shutdown = CancellationToken::new();

    let state = AppState {
        registry: Arc::clone(&registry),
        pipeline: Arc::new(processor),
        store,
        backend_status: Arc::new(BackendStatus::new(
            args.summarizer,
            &args.ollama_base_url,
            &args.ollama_model,
        )),
        sse_max_lifetime: args.sse_max_lifetime(),
        shutdown: shutdown.clone(),
    };

    let schedule = sweeper::parse_schedule(&args.sweep_schedule)?;
    tokio::spawn(shutdown_signal(shutdown.clone()));

    let listener = tokio::net::TcpListener::bind(args.bind_addr()).await?;
    let http = async {
        let res = server::serve(listener, server::create_router(state), shutdown.clone()).await;
        // stop the sweeper too when the server exits on its own
        shutdown.cancel();
        res
    };

    tracing::info!(schedule = %args.sweep_schedule, "Starting job sweeper...");
    let (served, swept) = tokio::join!(
        http,
        sweeper::run_sweeper(registry, schedule, shutdown.clone())
    );

    if let Err(e) = swept {
        tracing::error!(error = ?e, "Job sweeper failed");
    }
    served
}

async fn watch(args: WatchArgs) -> anyhow::Result<()> {
    let mut view = TerminalView::default();
    let job_id = JobId::from(args.job_id);

    let outcome = WatchClient::new(&args.server)
        .watch(&job_id, |instruction| {
            if let Some(line) = view.apply(instruction) {
                println!("{line}");
            }
        })
        .await?;

    let WatchOutcome::Finished { url } = outcome;
    println!("Result: {url}");
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }

    shutdown.cancel();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let _guard = sentry::init((
        std::env::var("SENTRY_DSN").unwrap_or_default(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: Some("production".into()),
            ..Default::default()
        },
    ));

    let cli = Cli::parse();

    match cli.command {
        Command::Serve(args) => {
            init_tracing_subscriber("info")?;
            serve(args).await
        }
        Command::Watch(args) => {
            init_tracing_subscriber("warn")?;
            watch(args).await
        }
    }
}
