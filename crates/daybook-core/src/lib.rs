pub mod cli;
pub mod commands;
pub mod config;
pub mod datastore;
pub mod datetime;
pub mod grid;
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
    "starting daybook CLI"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.daybookrc.as_deref()
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

  let storage =
    datastore::FileStorage::open(
      &data_dir
    )
    .with_context(|| {
      format!(
        "failed to open storage at {}",
        data_dir.display()
      )
    })?;
  let store =
    datastore::DataStore::new(storage);

  let timezone =
    datetime::TimezonePolicy::resolve(
      cfg.timezone()
    );
  let now = Utc::now();
  let today = timezone.local_date(now);
  let selected = match cli.date.as_deref()
  {
    | Some(expr) => {
      datetime::parse_date_expr(
        expr, today
      )?
    }
    | None => today
  };
  let now_ms = u64::try_from(
    now.timestamp_millis()
  )
  .context(
    "system clock is before 1970"
  )?;
  debug!(
    timezone = %timezone.label(),
    %today,
    %selected,
    "resolved selected date"
  );

  let session = commands::Session {
    today,
    selected,
    now_ms,
    week_start: cfg.week_start()
  };

  let mut renderer =
    render::Renderer::new(&cfg);
  let inv = cli::Invocation::parse(
    &cfg, cli.rest
  )?;

  commands::dispatch(
    &store,
    &cfg,
    &mut renderer,
    session,
    inv
  )?;

  info!("done");
  Ok(())
}
