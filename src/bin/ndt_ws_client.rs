use clap::Parser;
use ndt_ws_client::client::ClientBuilder;
use ndt_ws_client::emitter::{Emitter, HumanReadableEmitter, JsonEmitter};
use ndt_ws_client::params;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Clone, Debug, clap::ValueEnum)]
enum Format {
    Human,
    Json,
}

#[derive(Parser, Debug)]
struct Cli {
    /// NDT server hostname
    server: String,
    /// Control port
    #[arg(long, default_value_t = params::DEFAULT_CONTROL_PORT)]
    port: u16,
    /// URL path of the NDT endpoint
    #[arg(long, default_value = params::DEFAULT_PATH)]
    path: String,
    /// Connect with wss:// instead of ws://
    #[arg(long)]
    tls: bool,
    /// Output format to use: 'human' or 'json' for batch processing
    #[arg(long, default_value = "human")]
    format: Format,
    /// Skip the download (S2C) measurement
    #[arg(long)]
    no_download: bool,
    /// Skip the upload (C2S) measurement
    #[arg(long)]
    no_upload: bool,
    /// Skip the metadata exchange
    #[arg(long)]
    no_meta: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();

    let mut tests = 0u8;
    if !cli.no_download {
        tests |= params::TEST_S2C;
    }
    if !cli.no_upload {
        tests |= params::TEST_C2S;
    }
    if !cli.no_meta {
        tests |= params::TEST_META;
    }
    if tests == 0 {
        eprintln!("error: nothing to do, every test is disabled");
        std::process::exit(1);
    }

    let mut emitter: Box<dyn Emitter> = match cli.format {
        Format::Human => Box::new(HumanReadableEmitter::new(std::io::stdout())),
        Format::Json => Box::new(JsonEmitter::new(std::io::stdout())),
    };

    let client = ClientBuilder::new(cli.server)
        .port(cli.port)
        .path(cli.path)
        .secure(cli.tls)
        .tests(tests)
        .build();

    match client.run(emitter.as_mut()).await {
        Ok(summary) => {
            emitter.on_summary(&summary);
            Ok(())
        }
        // run() already delivered on_error through the emitter
        Err(_) => std::process::exit(1),
    }
}
