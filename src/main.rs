use netsim::apps::PingPongPlugin;
use netsim::{NetworkId, SimConfig, SimulationBuilder};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = match load_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("netsim: {}", e);
            std::process::exit(2);
        }
    };

    info!(
        seed = config.seed,
        workers = config.workers,
        "running ping-pong demo scenario"
    );

    // Two networks a 10ms link apart, a pinger on one and an echoer on the
    // other, placed on different workers by the round-robin.
    let result = SimulationBuilder::new(config)
        .plugin(Box::new(PingPongPlugin))
        .network(NetworkId(1), 10)
        .network(NetworkId(2), 10)
        .link(NetworkId(1), NetworkId(2), 10)
        .node(0, NetworkId(2), "pong.example", "pingpong", &[])
        .node(
            0,
            NetworkId(1),
            "ping.example",
            "pingpong",
            &["--peer", "pong.example", "--count", "100"],
        )
        .end_at(5_000)
        .run();

    match result {
        Ok(report) => {
            println!("{}", report.summary());
            if !report.is_success() {
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("netsim: {}", e);
            std::process::exit(2);
        }
    }
}

fn load_config() -> Result<SimConfig, Box<dyn std::error::Error>> {
    let mut config = match std::env::args().nth(1) {
        Some(path) => {
            let doc = std::fs::read_to_string(&path)?;
            SimConfig::from_toml_str(&doc)?
        }
        None => SimConfig::default(),
    };
    config = config.with_env_overrides();
    // The demo is about parallel execution; give it at least two workers.
    config.workers = config.workers.max(2);
    Ok(config.validated()?)
}
