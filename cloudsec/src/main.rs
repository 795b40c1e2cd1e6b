use clap::Parser;
use cloudsec::{crash, logging, CloudSecProvider};
use tfplug::ServerConfig;

const PROVIDER_ADDRESS: &str = "registry.terraform.io/cloudsec/cloudsec";

#[derive(Parser, Debug)]
#[command(name = "terraform-provider-cloudsec", version, about)]
struct Args {
    /// Serve without TLS and print TF_REATTACH_PROVIDERS for a debugger session
    #[arg(long)]
    debug: bool,
}

/// Go-style single-dash long flags (`-debug`) as clap expects them
fn normalize_args(args: impl Iterator<Item = String>) -> Vec<String> {
    args.map(|arg| {
        if arg.starts_with('-') && !arg.starts_with("--") && arg.len() > 2 {
            format!("-{}", arg)
        } else {
            arg
        }
    })
    .collect()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse_from(normalize_args(std::env::args()));

    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    logging::init();
    crash::install_panic_hook();

    let config = ServerConfig::new(PROVIDER_ADDRESS).with_debug(args.debug);

    tfplug::serve(CloudSecProvider::new(), config).await?;

    Ok(())
}
