use clap::{parser::ValueSource, ArgMatches, CommandFactory, FromArgMatches, Parser};
use leadflow_http::serve;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:7800";

#[derive(Parser)]
#[command(name = "leadflow", version, about = "Marketing CRM API server")]
struct Cli {
    #[arg(long, env = "LEADFLOW_DATA_DIR", default_value = "./data")]
    data_dir: String,
    #[arg(long, env = "LEADFLOW_BIND_ADDR")]
    bind_addr: Option<String>,
    #[arg(long, env = "LEADFLOW_PORT")]
    port: Option<u16>,

    /// Bind to 127.0.0.1:0 (OS-assigned ephemeral port). Prints resolved address at startup.
    #[arg(long)]
    auto_port: bool,

    /// Require this key in `x-leadflow-api-key` on every /1/* route except webhooks.
    #[arg(long, env = "LEADFLOW_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// HMAC secret for inbound webhook signatures.
    #[arg(long, env = "LEADFLOW_WEBHOOK_SECRET", hide_env_values = true)]
    webhook_secret: Option<String>,

    /// Seconds between follow-up scheduler passes (0 disables it).
    #[arg(long, env = "LEADFLOW_FOLLOWUP_TICK_SECS")]
    followup_tick_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cmd = Cli::command();
    let matches = cmd.get_matches();
    let cli = Cli::from_arg_matches(&matches)?;

    let bind_addr = resolve_bind_addr(&cli, &matches)
        .map_err(|msg| std::io::Error::new(std::io::ErrorKind::InvalidInput, msg))?;

    std::env::set_var("LEADFLOW_DATA_DIR", &cli.data_dir);
    std::env::set_var("LEADFLOW_BIND_ADDR", &bind_addr);
    if let Some(key) = &cli.api_key {
        std::env::set_var("LEADFLOW_API_KEY", key);
    }
    if let Some(secret) = &cli.webhook_secret {
        std::env::set_var("LEADFLOW_WEBHOOK_SECRET", secret);
    }
    if let Some(secs) = cli.followup_tick_secs {
        std::env::set_var("LEADFLOW_FOLLOWUP_TICK_SECS", secs.to_string());
    }
    serve().await
}

fn resolve_bind_addr(cli: &Cli, matches: &ArgMatches) -> Result<String, String> {
    if cli.auto_port && is_set_on_command_line(matches, "bind_addr") {
        return Err("--auto-port cannot be used with --bind-addr".to_string());
    }

    if cli.auto_port && is_set_on_command_line(matches, "port") {
        return Err("--auto-port cannot be used with --port".to_string());
    }

    if is_set_on_command_line(matches, "bind_addr") {
        if let Some(bind_addr) = &cli.bind_addr {
            return Ok(bind_addr.clone());
        }
    }

    if cli.auto_port {
        return Ok("127.0.0.1:0".to_string());
    }

    if is_set_on_command_line(matches, "port") {
        if let Some(port) = cli.port {
            return Ok(format!("127.0.0.1:{port}"));
        }
    }

    if let Some(bind_addr) = &cli.bind_addr {
        return Ok(bind_addr.clone());
    }

    if let Some(port) = cli.port {
        return Ok(format!("127.0.0.1:{port}"));
    }

    Ok(DEFAULT_BIND_ADDR.to_string())
}

fn is_set_on_command_line(matches: &ArgMatches, arg: &str) -> bool {
    matches.value_source(arg) == Some(ValueSource::CommandLine)
}
