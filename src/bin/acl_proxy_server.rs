//!
//! acl-proxy server binary
//! -----------------------
//! Command-line entry point for the authorization config service. Options come from
//! `ACL_PROXY_*` environment variables and flags; see `--help`.

use acl_proxy::config::{Invocation, Options, USAGE};
use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let opts = match Options::from_process()? {
        Invocation::Help => {
            println!("{}", USAGE);
            return Ok(());
        }
        Invocation::Run(o) => o,
    };

    // RUST_LOG wins over -D/-V when set
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(opts.log_level()));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    println!(
        "acl-proxy starting: listen={}:{}, data_dir={}",
        opts.host,
        opts.port,
        opts.data_dir.display()
    );
    acl_proxy::server::run(opts).await
}
