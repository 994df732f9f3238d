use clap::Parser;

use lantern::config::{Cli, Config};
use lantern::handlers::default_router;
use lantern::server::Server;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = Config::resolve(&cli)?;

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_max_level(cfg.log_level()?)
        .init();

    let router = default_router(cfg.directory.clone());
    tracing::info!(handlers = router.len(), "Routes registered");

    let mut server = Server::bind(cfg.socket_addr()?, router)?;
    server.run()
}
