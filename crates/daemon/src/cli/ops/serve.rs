use std::net::SocketAddr;

use clap::Args;

use plume_daemon::{spawn_service, Config};

#[derive(Args, Debug, Clone)]
pub struct Serve {
    /// Listen address override
    #[arg(long)]
    pub listen: Option<SocketAddr>,
}

impl Serve {
    pub async fn run(self, mut config: Config) -> anyhow::Result<()> {
        if let Some(listen) = self.listen {
            config.listen_addr = listen;
        }

        let service = spawn_service(&config).await?;
        tokio::signal::ctrl_c().await?;
        tracing::info!("shutting down");
        service.shutdown().await;
        Ok(())
    }
}
