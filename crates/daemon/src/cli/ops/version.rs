use clap::Args;

#[derive(Args, Debug, Clone)]
pub struct Version;

impl Version {
    pub fn run(self) -> anyhow::Result<()> {
        println!("plume {}", env!("CARGO_PKG_VERSION"));
        Ok(())
    }
}
