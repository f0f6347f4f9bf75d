pub mod fetch;
pub mod resolve;
pub mod serve;
pub mod version;

pub use fetch::Fetch;
pub use resolve::Resolve;
pub use serve::Serve;
pub use version::Version;
