use colored::Colorize;
use weasel_server::{ServerConfig, WeaselServer};

use crate::cli::{CheckConfigArgs, Cli, Command, ServeArgs};

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Serve(args) => cmd_serve(args),
        Command::CheckConfig(args) => cmd_check_config(args),
        Command::DefaultConfig => {
            print!("{}", ServerConfig::default().to_toml_string()?);
            Ok(())
        }
    }
}

fn load_config(args: &ServeArgs) -> anyhow::Result<ServerConfig> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => {
            let mut config = ServerConfig::default();
            config.apply_env(|k| std::env::var(k).ok());
            config
        }
    };
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    config.validate()?;
    Ok(config)
}

fn cmd_serve(args: ServeArgs) -> anyhow::Result<()> {
    let config = load_config(&args)?;
    println!(
        "{} weasel on {} (default bucket: {})",
        "▶".green().bold(),
        config.bind_addr.to_string().bold(),
        config.sites.default_bucket.yellow()
    );
    let server = WeaselServer::new(config)?;
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(server.serve())?;
    Ok(())
}

fn cmd_check_config(args: CheckConfigArgs) -> anyhow::Result<()> {
    match ServerConfig::load(&args.config) {
        Ok(config) => {
            println!("{} {} is valid", "✓".green().bold(), args.config.display());
            println!("  Listen: {}", config.bind_addr.to_string().bold());
            println!("  Default bucket: {}", config.sites.default_bucket.yellow());
            for (host, bucket) in &config.sites.buckets {
                println!("  Host {} → {}", host.cyan(), bucket.yellow());
            }
            println!("  Change hook: {}", config.hook_path.cyan());
            if config.deploy.flush_cache {
                println!("  Deploy flush: {}", "enabled".green());
            }
            Ok(())
        }
        Err(e) => {
            println!("{} {}: {}", "✗".red().bold(), args.config.display(), e);
            Err(e.into())
        }
    }
}
