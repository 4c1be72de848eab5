mod cli;

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use rand::RngCore;
use streamctl::{config, context::AppContext, lifecycle::AppAction, proxy::TokenSigner, server};

async fn serve(host: Option<String>, port: Option<u16>, config_path: Option<&Path>) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    config::validate_config(&config)?;

    tracing::info!("Starting streamctl {}", env!("CARGO_PKG_VERSION"));
    let ctx = AppContext::open(config)?;
    server::start_server(ctx).await
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG if set, otherwise pick defaults from the verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "streamctl=trace,streamctl_remote=trace,streamctl_db=debug,streamctl_common=debug,tower_http=debug".to_string()
        } else {
            "streamctl=info,streamctl_remote=info,streamctl_db=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Serve { host, port } => block_on(serve(host, port, config_path)),
        Commands::Validate {
            config: validate_path,
        } => {
            let path = validate_path.or_else(|| config_path.map(Path::to_path_buf));
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("streamctl {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::CheckTools => check_tools(),
        Commands::Provision { login } => block_on(provision(&login, config_path)),
        Commands::Sync { login } => block_on(sync(&login, config_path)),
        Commands::App {
            login,
            action,
            role,
        } => block_on(app(&login, &action, role.into(), config_path)),
        Commands::IssueToken { login, ttl } => issue_token(&login, ttl, config_path),
        Commands::Usage { login, json } => block_on(usage(&login, json, config_path)),
        Commands::GenerateSecret => generate_secret(),
    }
}

fn block_on<F: std::future::Future<Output = Result<()>>>(fut: F) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(fut)
}

fn open_context(config_path: Option<&Path>) -> Result<AppContext> {
    let config = config::load_config_or_default(config_path)?;
    AppContext::open(config)
}

fn print_report(report: &streamctl::sync::SyncReport) {
    let mark = if report.success { "✓" } else { "!" };
    println!("{} {}", mark, report.message);
    for w in &report.warnings {
        println!("  warning: {}", w);
    }
}

async fn provision(login: &str, config_path: Option<&Path>) -> Result<()> {
    let ctx = open_context(config_path)?;
    let result = ctx.orchestrator.provision_tenant(login).await;
    ctx.shutdown().await;
    print_report(&result.with_context(|| format!("Failed to provision {login}"))?);
    Ok(())
}

async fn sync(login: &str, config_path: Option<&Path>) -> Result<()> {
    let ctx = open_context(config_path)?;
    let result = ctx.orchestrator.sync_tenant(login).await;
    ctx.shutdown().await;
    print_report(&result.with_context(|| format!("Failed to sync {login}"))?);
    Ok(())
}

async fn app(
    login: &str,
    action: &str,
    role: streamctl_common::Role,
    config_path: Option<&Path>,
) -> Result<()> {
    let action: AppAction = action.parse().map_err(anyhow::Error::msg)?;
    let ctx = open_context(config_path)?;

    let result = match ctx.orchestrator.resolve(login) {
        Ok((server, tenant)) => ctx.lifecycle.perform(action, &server, &tenant, role).await,
        Err(e) => Err(e),
    };
    ctx.shutdown().await;

    let outcome = result.with_context(|| format!("{action:?} failed for {login}"))?;
    let suffix = if outcome.already { " (no change)" } else { "" };
    println!("✓ {}{} [{}]", outcome.message, suffix, outcome.state);
    Ok(())
}

fn issue_token(login: &str, ttl: Option<u64>, config_path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let secret = config
        .proxy
        .token_secret
        .as_deref()
        .filter(|s| !s.is_empty())
        .context("proxy.token_secret is not configured")?;
    let signer = TokenSigner::new(secret);
    let token = signer.issue(login, ttl.unwrap_or(config.proxy.token_ttl_secs))?;
    println!("{}", token);
    Ok(())
}

async fn usage(login: &str, json: bool, config_path: Option<&Path>) -> Result<()> {
    let ctx = open_context(config_path)?;
    let result = ctx.orchestrator.usage(login).await;
    ctx.shutdown().await;
    let usage = result.with_context(|| format!("Failed to measure usage for {login}"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&usage)?);
        return Ok(());
    }

    println!("Tenant: {}", usage.login);
    match usage.percent {
        Some(p) => println!(
            "Used: {} of {} bytes ({:.1}%)",
            usage.used_bytes, usage.limit_bytes, p
        ),
        None => println!("Used: {} bytes (no limit)", usage.used_bytes),
    }
    for folder in &usage.folders {
        let stale = if folder.fresh { "" } else { " (cached)" };
        println!("  {:<24} {:>14}{}", folder.name, folder.bytes, stale);
    }
    Ok(())
}

fn check_tools() -> Result<()> {
    println!("Checking external tools...\n");

    // (name, required for the ssh transport)
    let tools = [
        ("sh", true),
        ("ssh", true),
        ("scp", true),
        ("sshpass", false),
    ];
    let mut all_ok = true;

    for (name, required) in tools {
        match which::which(name) {
            Ok(path) => println!("✓ {} - {}", name, path.display()),
            Err(_) if required => {
                all_ok = false;
                println!("✗ {}", name);
            }
            Err(_) => println!("- {} (optional, needed for password logins)", name),
        }
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Install them to use the ssh transport.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            config::load_config(p)?
        }
        None => {
            println!("No config file specified, using defaults");
            config::load_config_or_default(None)?
        }
    };
    let warnings = config::validate_config(&config)?;

    println!("✓ Configuration is valid");
    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!("  Database: {}", config.server.db_path.display());
    println!("  Transport: {:?}", config.remote.transport);
    println!("  Content root: {}", config.layout.content_root);
    println!("  Engine conf root: {}", config.engine.conf_root);
    println!("  Proxy cache: {}", config.proxy.cache_enabled);
    for w in &warnings {
        println!("  warning: {}", w);
    }

    Ok(())
}

fn generate_secret() -> Result<()> {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    println!("{}", hex::encode(bytes));
    Ok(())
}
