use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::SiteConfig;
use crate::special::SpecialTreatmentLayout;

pub mod commands;

use commands::{cmd_capture, cmd_check, cmd_inspect, cmd_layout, cmd_restore, cmd_split};

#[derive(Parser, Debug)]
#[command(
    name = "sessionvault",
    version,
    about = "Capture and replay web session state (cookies, localStorage, IndexedDB)",
    after_help = "Session and dump files are written under an advisory lock held on a \
                  sidecar `<file>.lock` next to them; the sidecar stays after the write \
                  and is safe to delete when no sessionvault process is running.",
    arg_required_else_help = true
)]
pub struct Cli {
    /// Special-treatment layout JSON (overrides SV_LAYOUT_FILE).
    #[arg(long, global = true)]
    layout_file: Option<PathBuf>,

    /// Session file extension (overrides SV_FILE_EXT).
    #[arg(long, global = true)]
    ext: Option<String>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Capture a session from a page dump and save it.
    Capture {
        #[arg(long)]
        dump: PathBuf,
        #[arg(long)]
        out: PathBuf,
        #[arg(long)]
        site_name: Option<String>,
        #[arg(long)]
        site_url: Option<String>,
    },
    /// Replay a session file into a page dump.
    Restore {
        #[arg(long)]
        session: PathBuf,
        #[arg(long)]
        dump: PathBuf,
    },
    /// Summarize a session file (databases, object stores, record counts).
    Inspect {
        #[arg(long)]
        session: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Verify a session file carries an active login.
    Check {
        #[arg(long)]
        session: PathBuf,
    },
    /// Split a multi-profile file into one session file per profile.
    Split {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },
    /// Print the effective special-treatment layout.
    Layout {
        #[arg(long)]
        json: bool,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut cfg = SiteConfig::from_env()?;
    if let Some(p) = cli.layout_file.as_deref() {
        cfg = cfg.with_layout(SpecialTreatmentLayout::load(p)?);
    }
    if let Some(ext) = cli.ext.as_deref() {
        cfg = cfg.with_file_ext(ext);
    }
    log::debug!("{}", cfg);

    match cli.cmd {
        Cmd::Capture {
            dump,
            out,
            site_name,
            site_url,
        } => {
            if let Some(name) = site_name {
                cfg = cfg.with_site_name(name);
            }
            if let Some(url) = site_url {
                cfg = cfg.with_site_url(url);
            }
            cmd_capture(&cfg, &dump, &out)?;
        }
        Cmd::Restore { session, dump } => cmd_restore(&cfg.layout, &session, &dump)?,
        Cmd::Inspect { session, json } => cmd_inspect(&session, json)?,
        Cmd::Check { session } => cmd_check(&cfg, &session)?,
        Cmd::Split { input, out } => {
            cmd_split(&cfg, &input, &out)?;
        }
        Cmd::Layout { json } => cmd_layout(&cfg, json)?,
    }
    Ok(())
}
