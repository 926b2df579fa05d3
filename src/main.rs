use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::{anyhow, Context};
use clap::Parser;

use sshm::{default_config_path, syscmd, App, AppOptions, Config, Terminal};

/// Browse, filter, tag and connect to SSH hosts from the terminal.
#[derive(Parser, Debug)]
#[command(name = "sshm", version, about)]
struct Args {
    /// Filter text applied before the first render (host name, address
    /// or #tag)
    filter: Option<String>,

    /// Custom config file path (default: ~/.ssh/config, then
    /// /etc/ssh/ssh_config)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Replace this process with the client on the first connect
    #[arg(short, long)]
    exit: bool,

    /// Always show the selected host's config params
    #[arg(short, long)]
    show: bool,

    /// Verbose in-app logging
    #[arg(short, long)]
    debug: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if !std::io::stdout().is_terminal() {
        return Err(anyhow!("not an interactive terminal :("));
    }

    // a broken config at startup is fatal, before any screen takeover
    let config = match &args.config {
        Some(path) => Config::parse_path(path)?,
        None => Config::parse(default_config_path()?)?,
    };
    let config_path = config.path().to_path_buf();

    let mut app = App::new(
        config,
        AppOptions {
            filter: args.filter,
            exit_on_connect: args.exit,
            show_detail: args.show,
            debug: args.debug,
        },
    )?;

    let exit_host = {
        let mut terminal = Terminal::new()?;
        app.run(&mut terminal)?
        // terminal drops here, restoring the screen before any handoff
    };

    if let Some(host) = exit_host {
        let client = app.client();
        let program = syscmd::lookup(client.name())
            .ok_or_else(|| anyhow!(syscmd::LaunchError::ClientNotFound(client.name().into())))?;
        let client_args = client.connect_args(&config_path, &host);
        syscmd::replace_process(&program, &client_args)
            .with_context(|| format!("failed to hand off to {}", client.name()))?;
    }

    Ok(())
}
