use clap::{Parser, Subcommand};
use gbm_sim::api::{self, BondArgs, CapmArgs, FuturesArgs, SimulateArgs};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
    name = "gbm-sim",
    version,
    about = "Monte Carlo portfolio simulator (lognormal GBM) with CAPM, bond and futures calculators"
)]
struct Cli {
    #[arg(
        long,
        global = true,
        default_value = "info",
        help = "Log level (trace, debug, info, warn, error); RUST_LOG takes precedence"
    )]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a Monte Carlo simulation and print its statistics
    Simulate(SimulateArgs),
    /// Serve the JSON API over HTTP
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
    /// CAPM expected return
    Capm(CapmArgs),
    /// Present value of an annual-coupon bond
    Bond(BondArgs),
    /// Margin, leverage and liquidation price of a long futures position
    Futures(FuturesArgs),
}

fn init_tracing(log_level: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let result = match cli.command {
        Command::Simulate(args) => api::simulate_command(args),
        Command::Serve { port } => api::run_http_server(port)
            .await
            .map(|()| String::new())
            .map_err(|e| format!("Server error: {e}")),
        Command::Capm(args) => api::capm_command(args),
        Command::Bond(args) => api::bond_command(args),
        Command::Futures(args) => api::futures_command(args),
    };

    match result {
        Ok(output) if output.is_empty() => {}
        Ok(output) => println!("{output}"),
        Err(msg) => {
            eprintln!("{msg}");
            std::process::exit(1);
        }
    }
}
