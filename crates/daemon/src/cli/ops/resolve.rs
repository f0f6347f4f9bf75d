use std::fmt;

use clap::Args;

use common::{ResolvedIdentity, Resolver, ResolverConfig, RetryPolicy};
use plume_daemon::Config;

#[derive(Args, Debug, Clone)]
pub struct Resolve {
    /// Handle or DID to resolve
    pub input: String,
}

#[derive(Debug)]
pub struct ResolveOutput {
    pub resolved: ResolvedIdentity,
}

impl fmt::Display for ResolveOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(handle) = &self.resolved.handle {
            writeln!(f, "handle: {handle}")?;
        }
        writeln!(f, "did:    {}", self.resolved.did)?;
        write!(f, "pds:    {}", self.resolved.pds)
    }
}

impl Resolve {
    pub async fn run(self, config: Config) -> anyhow::Result<()> {
        let resolver = Resolver::new(ResolverConfig {
            plc_directory: config.plc_directory.clone(),
            handle_resolver: config.handle_resolver.clone(),
            retry: RetryPolicy::default(),
        })
        .map_err(|e| anyhow::anyhow!("failed to build resolver: {e}"))?;

        let resolved = resolver.resolve(&self.input).await?;
        println!("{}", ResolveOutput { resolved });
        Ok(())
    }
}
