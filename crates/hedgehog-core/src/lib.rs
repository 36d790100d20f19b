pub mod calendar;
pub mod cli;
pub mod commands;
pub mod config;
pub mod controller;
pub mod datetime;
pub mod error;
pub mod persistence;
pub mod render;
pub mod store;
pub mod task;

use std::ffi::OsString;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tracing::{
  debug,
  info
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args)?;
  let cli = cli::GlobalCli::parse_from(
    pre.cleaned_args
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting hedgehog CLI"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.hedgehogrc.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );

  let data_dir =
    config::resolve_data_dir(
      &cfg,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  let backend =
    persistence::FileKeyValueStore::open(
      &data_dir
    )
    .with_context(|| {
      format!(
        "failed to open task storage \
         at {}",
        data_dir.display()
      )
    })?;

  let mut renderer =
    render::Renderer::new(&cfg)?;

  let runtime =
    tokio::runtime::Builder::new_current_thread()
      .enable_all()
      .build()
      .context(
        "failed to start async runtime"
      )?;

  runtime.block_on(async {
    let today =
      datetime::to_project_date(
        Utc::now()
      );
    let mut controller =
      controller::ViewController::open(
        persistence::PersistenceGateway::new(
          backend
        ),
        today
      )
      .await
      .with_context(|| {
        format!(
          "refusing to continue; fix or \
           move {} first",
          data_dir
            .join(format!(
              "{}.json",
              persistence::TASKS_KEY
            ))
            .display()
        )
      })?;

    commands::dispatch(
      &mut controller,
      &mut renderer,
      cli.command
    )
    .await
  })?;

  info!("done");
  Ok(())
}
