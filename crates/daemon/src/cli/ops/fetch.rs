use std::fmt;

use clap::Args;

use common::manifest::Manifest;
use common::vfs::DirectoryNode;
use common::{fetch_site, PdsClient, Resolver, ResolverConfig, RetryPolicy};
use plume_daemon::Config;

#[derive(Args, Debug, Clone)]
pub struct Fetch {
    /// Handle or DID owning the site
    pub input: String,
    /// Site name (record key)
    pub site: String,
}

#[derive(Debug)]
pub struct FetchOutput {
    pub manifest: Manifest,
}

fn write_tree(f: &mut fmt::Formatter<'_>, node: &DirectoryNode, depth: usize) -> fmt::Result {
    let indent = "  ".repeat(depth);
    for (name, dir) in &node.dirs {
        writeln!(f, "{indent}{name}/")?;
        write_tree(f, dir, depth + 1)?;
    }
    for (name, entry) in &node.files {
        writeln!(f, "{indent}{name}  ({})", entry.cid)?;
    }
    Ok(())
}

impl fmt::Display for FetchOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "site:  {}", self.manifest.site)?;
        writeln!(f, "files: {}", self.manifest.file_count)?;
        if let Some(created) = &self.manifest.created_at {
            writeln!(f, "created: {created}")?;
        }
        writeln!(f)?;
        write_tree(f, &self.manifest.root, 0)
    }
}

impl Fetch {
    pub async fn run(self, config: Config) -> anyhow::Result<()> {
        let resolver = Resolver::new(ResolverConfig {
            plc_directory: config.plc_directory.clone(),
            handle_resolver: config.handle_resolver.clone(),
            retry: RetryPolicy::default(),
        })
        .map_err(|e| anyhow::anyhow!("failed to build resolver: {e}"))?;
        let client = PdsClient::new(RetryPolicy::default())
            .map_err(|e| anyhow::anyhow!("failed to build PDS client: {e}"))?;

        let resolved = resolver.resolve(&self.input).await?;
        let manifest = fetch_site(&client, &resolved.pds, &resolved.did, &self.site)
            .await
            .map_err(|e| anyhow::anyhow!("failed to fetch site: {e}"))?
            .ok_or_else(|| {
                anyhow::anyhow!("no site {:?} published by {}", self.site, resolved.did)
            })?;

        println!("{}", FetchOutput { manifest });
        Ok(())
    }
}
