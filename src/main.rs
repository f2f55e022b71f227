use anyhow::{bail, Result};

use basicauth::admin_tool::{run_account_command, run_remote_command};
use basicauth::config::{build_cli, AccountCommand, LogConfig, RemoteCommand, ServerConfig};
use basicauth::server;
use basicauth::utils::initialize_logging;

#[tokio::main]
async fn main() -> Result<()> {
    // Install default crypto provider for rustls
    rustls::crypto::ring::default_provider()
        .install_default()
        .ok();

    let matches = build_cli().get_matches();

    let logging = LogConfig::from_matches(&matches);
    if let Err(e) = initialize_logging(logging.level, logging.file.as_deref()) {
        bail!("failed to initialize logging: {}", e);
    }

    match matches.subcommand() {
        Some(("serve", sub)) => {
            let config = ServerConfig::from_matches(sub)?;
            server::run(config).await
        }
        Some(("account", sub)) => {
            let (path, command) = AccountCommand::from_matches(sub)?;
            let output = tokio::task::spawn_blocking(move || run_account_command(&path, command))
                .await??;
            println!("{}", output);
            Ok(())
        }
        Some(("remote", sub)) => {
            let (config, command) = RemoteCommand::from_matches(sub)?;
            println!("{}", run_remote_command(&config, command).await?);
            Ok(())
        }
        Some((other, _)) => bail!("unknown command: {}", other),
        None => bail!("no command given"),
    }
}
