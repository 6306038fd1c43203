use std::{path::PathBuf, process::ExitCode};

use clap::{ArgAction, Parser};
use tracing::error;
use tracing_subscriber::{filter::LevelFilter, EnvFilter};
use track_telem::{
    channel::ChannelConfig,
    keys::{EphemeralKeyStore, KeyStore, PemKeyStore},
    model::NoisySpeed,
    protocol::VehicleIdentity,
    sim::{self, SimConfig, ThreadSleep, DEFAULT_AVG_SPEED_KMH, DEFAULT_INTERVAL_S},
    TTResult,
};

#[derive(Parser, Debug)]
#[command(name = "track-telem")]
#[command(about = "Input track and simulate sending realtime metrics from an autonomous vehicle")]
struct Cli {
    /// Collector address to send to via UDP, host:port
    address: String,

    /// GPX track file
    #[arg(short, long, default_value = "TTK.gpx")]
    file: PathBuf,

    /// Sending rate in seconds
    #[arg(short, long, default_value_t = DEFAULT_INTERVAL_S,
          value_parser = clap::value_parser!(u32).range(1..=255))]
    rate: u32,

    /// Vehicle average velocity, km/h
    #[arg(long, default_value_t = DEFAULT_AVG_SPEED_KMH)]
    velocity: f64,

    /// Directory holding public.pem / private.pem, created on first run
    #[arg(long, default_value = "keys")]
    key_dir: PathBuf,

    /// Use a throwaway key pair instead of the key directory
    #[arg(long)]
    ephemeral_keys: bool,

    /// Vehicle id [default: random]
    #[arg(long, allow_negative_numbers = true)]
    vehicle_id: Option<i64>,

    #[arg(long, default_value_t = VehicleIdentity::DEFAULT_TYPE)]
    vehicle_type: i64,

    /// Vehicle model, at most 16 ASCII characters are sent
    #[arg(long, default_value = VehicleIdentity::DEFAULT_MODEL)]
    vehicle_model: String,

    /// More logging, repeat for more
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn identity(&self) -> VehicleIdentity {
        let mut identity = VehicleIdentity::random(&mut rand::thread_rng());
        if let Some(id) = self.vehicle_id {
            identity.id = id;
        }
        identity.vehicle_type = self.vehicle_type;
        identity.model = self.vehicle_model.clone();
        identity
    }

    fn level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::INFO,
            1 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    }
}

fn run(cli: &Cli) -> TTResult<usize> {
    let config = SimConfig {
        interval_s: cli.rate,
        avg_speed_kmh: cli.velocity,
        identity: cli.identity(),
    };
    let keys: Box<dyn KeyStore> = if cli.ephemeral_keys {
        Box::new(EphemeralKeyStore::default())
    } else {
        Box::new(PemKeyStore::new(&cli.key_dir))
    };
    sim::run(
        config,
        &cli.file,
        ChannelConfig::new(cli.address.clone()),
        keys.as_ref(),
        &mut NoisySpeed::new(rand::thread_rng()),
        &mut ThreadSleep,
    )
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::builder()
        .with_default_directive(cli.level().into())
        .from_env_lossy();
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).finish();

    // Scoped to this run rather than installed as the process-wide default.
    tracing::subscriber::with_default(subscriber, || match run(&cli) {
        Ok(sent) => {
            tracing::info!("Done, {sent} messages sent");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    })
}
