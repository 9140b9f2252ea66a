//! `hydra-client` — thin process entry point.
//!
//! This binary exists only to show how the library wires together. It
//! cannot drive a real sync: a concrete `Connector` bridging to an actual
//! socket and wire codec is a separate concern this crate's covered
//! surface doesn't include.

use std::path::PathBuf;

use clap::Parser;
use hydra::HydraConfig;

#[derive(Parser)]
#[command(name = "hydra-client", about = "Inspect a Hydra working directory")]
struct Args {
    /// Working directory containing hydra.cfg, posts/, and peers/.
    #[arg(long, default_value = ".")]
    working_dir: PathBuf,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = HydraConfig::load(&args.working_dir)?;
    tracing::info!(
        identity = %config.identity,
        nickname = %config.nickname,
        "loaded hydra identity"
    );
    Ok(())
}
