use anyhow::Context;
use clap::Parser;
use interfaces::defs::SceneController;
use interfaces::MemorySceneController;
use obs_control::ObsConfig;
use scene_switcher::{
    connect_obs, detectors, AppConfig, DefaultOpener, Fetcher, SceneSwitcher,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Switch the OBS program scene to whichever camera sees the most cats.
#[derive(Parser, Debug)]
#[command(name = "scene-switcher", version, about)]
struct Args {
    /// JSON config file with sources, detector and tuning
    #[arg(short, long, env = "SCENE_SWITCHER_CONFIG", default_value = "scene-switcher.json")]
    config: PathBuf,

    /// OBS connection as obsws://[:password@]host[:port]; overrides host, port and password
    #[arg(long, env = "OBS_URI", hide_env_values = true)]
    obs_uri: Option<String>,

    #[arg(long, env = "OBS_HOST")]
    obs_host: Option<String>,

    #[arg(long, env = "OBS_PORT")]
    obs_port: Option<u16>,

    #[arg(long, env = "OBS_PASSWORD", hide_env_values = true)]
    obs_password: Option<String>,

    /// Cycles between switching decisions
    #[arg(long)]
    cadence: Option<u32>,

    /// Hold time after a switch, in milliseconds
    #[arg(long)]
    cooldown_ms: Option<u64>,

    /// Log decisions without touching OBS
    #[arg(long)]
    dry_run: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

impl Args {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(host) = &self.obs_host {
            config.obs.host = host.clone();
        }
        if let Some(port) = self.obs_port {
            config.obs.port = port;
        }
        if let Some(password) = &self.obs_password {
            config.obs.password = Some(password.clone());
        }
        if let Some(cadence) = self.cadence {
            config.switcher.cadence = cadence;
        }
        if let Some(cooldown_ms) = self.cooldown_ms {
            config.switcher.cooldown_ms = cooldown_ms;
        }
    }

    fn obs_config(&self, config: &AppConfig) -> anyhow::Result<ObsConfig> {
        let base = config.obs.to_obs_config();
        match &self.obs_uri {
            Some(uri) => Ok(ObsConfig::from_uri(uri)?.with_request_timeout(base.request_timeout)),
            None => Ok(base),
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    info!("Starting scene switcher");

    let mut config = AppConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    args.apply(&mut config);
    config.validate()?;

    let fetcher = Arc::new(Fetcher::new(config.http.clone())?);
    let detector = detectors::build(&config.detector, fetcher.clone())?;

    // Step 1: scene controller
    let controller: Box<dyn SceneController> = if args.dry_run {
        let initial = config
            .sources
            .first()
            .map(|s| s.label.clone())
            .unwrap_or_default();
        warn!("Dry run: decisions are logged, OBS is not touched");
        Box::new(MemorySceneController::new(initial))
    } else {
        let obs_config = args.obs_config(&config)?;
        match connect_obs(obs_config, config.switcher.connect_attempts).await {
            Ok(client) => Box::new(client),
            Err(e) => {
                error!("{}", e);
                return Err(e.into());
            }
        }
    };

    // Step 2: sources
    let opener = DefaultOpener::new(fetcher);
    let switcher = match SceneSwitcher::start(
        &config.sources,
        &opener,
        detector,
        controller,
        &config.switcher,
    )
    .await
    {
        Ok(switcher) => switcher,
        Err(e) => {
            error!("{}", e);
            return Err(e.into());
        }
    };

    // Step 3: run until Ctrl-C
    let report = switcher.run(shutdown_signal()).await;
    for (resource, reason) in &report.failures {
        warn!("Teardown: {}: {}", resource, reason);
    }

    info!("Scene switcher stopped");
    Ok(())
}
