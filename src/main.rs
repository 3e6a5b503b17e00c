use anyhow::{bail, Context};
use cloudsdk_http::{ClientConfig, ServiceClientFactory};
use tracing_subscriber::EnvFilter;

const CONFIG_PREFIX: &str = "CLOUDSDK";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let Some(path) = args.next() else {
        bail!("usage: cloudsdk-http <path>");
    };

    #[cfg(feature = "env-file")]
    let config = ClientConfig::from_env_file(CONFIG_PREFIX);
    #[cfg(not(feature = "env-file"))]
    let config = ClientConfig::from_env(CONFIG_PREFIX);
    let config = config.context("loading client configuration")?;

    let factory = ServiceClientFactory::new(config);
    let client = factory.create_client().context("building HTTP client")?;

    let mut request = client.create_request(http::Method::GET);
    request.append_path_part(&path);
    let response = client
        .execute(request)
        .await
        .with_context(|| format!("GET {}", path))?;

    println!("{}", response.status());
    println!("{}", response.text()?);

    let metrics = factory.metrics().snapshot();
    tracing::info!(
        requests = metrics.requests,
        max_latency = ?metrics.max_latency,
        "done"
    );
    Ok(())
}
