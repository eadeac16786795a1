//! Mount command - mount a WebDAV URI and hold it until interrupted.

use std::sync::mpsc;

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use tracing::instrument;
use url::Url;

use oxcrypt_davmount::{Cancellation, MountParam, MountParams, MountStrategy, StrategySelector};

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// WebDAV URI to mount (e.g. http://localhost:42427/a1b2c3/vault/)
    #[arg(value_name = "URI")]
    pub uri: Url,

    /// URI scheme gvfs should mount with (`dav`, or `davs` for TLS)
    #[arg(long, env = "OXDAVMOUNT_GVFS_SCHEME")]
    pub scheme: Option<String>,

    /// Mount parameter (repeatable), e.g. --param preferred-gvfs-scheme=davs
    #[arg(long = "param", value_name = "KEY=VALUE")]
    pub params: Vec<String>,

    /// Open the mounted volume in the file manager
    #[arg(long)]
    pub reveal: bool,

    /// Use this strategy instead of the first applicable one
    #[arg(long, value_name = "ID")]
    pub strategy: Option<String>,
}

#[instrument(level = "info", name = "cmd::mount", skip_all, fields(uri = %args.uri))]
pub fn execute(args: &Args, quiet: bool) -> Result<()> {
    let params = build_params(args)?;

    let selector = StrategySelector::new();
    let strategy = select_strategy(&selector, args.strategy.as_deref())?;
    if !quiet {
        eprintln!("Using {} strategy", strategy.display_name());
    }

    // The first Ctrl+C cancels a running mount tool or, once mounted,
    // ends the wait below.
    let cancel = Cancellation::new();
    let (shutdown_tx, shutdown_rx) = mpsc::channel();
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || {
            cancel.cancel();
            let _ = shutdown_tx.send(());
        })
        .context("Failed to set signal handler")?;
    }

    let mut mount = strategy
        .mount_cancellable(&args.uri, &params, &cancel)
        .with_context(|| format!("Failed to mount {}", args.uri))?;

    println!("{}", mount.locator());

    if args.reveal
        && let Err(e) = mount.reveal()
    {
        tracing::warn!("Failed to reveal {}: {}", mount.locator(), e);
    }

    if !quiet {
        eprintln!("Press Ctrl+C to unmount and exit");
    }
    // A closed channel means the handler is gone; unmount either way
    let _ = shutdown_rx.recv();

    if !quiet {
        eprintln!("Unmounting...");
    }
    mount.unmount().context("Failed to unmount")?;
    if !quiet {
        eprintln!("Unmounted successfully");
    }
    Ok(())
}

fn build_params(args: &Args) -> Result<MountParams> {
    let mut params = MountParams::new();
    for pair in &args.params {
        params
            .set_from_pair(pair)
            .with_context(|| format!("Invalid --param {pair:?}"))?;
    }
    // --scheme wins over an equivalent --param
    if let Some(scheme) = &args.scheme {
        params = params.with(MountParam::PreferredGvfsScheme, scheme.clone());
    }
    Ok(params)
}

fn select_strategy<'a>(
    selector: &'a StrategySelector,
    id: Option<&str>,
) -> Result<&'a dyn MountStrategy> {
    match id {
        Some(id) => {
            let strategy = selector.by_id(id).with_context(|| {
                let known: Vec<_> = selector.strategies().map(|s| s.id()).collect();
                format!("Unknown mount strategy {id:?} (known: {})", known.join(", "))
            })?;
            if !strategy.is_applicable(selector.host()) {
                tracing::warn!("Strategy {} does not apply to this host, trying anyway", id);
            }
            Ok(strategy)
        }
        None => selector
            .select()
            .context("No mount strategy applies to this host"),
    }
}
