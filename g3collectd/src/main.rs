/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use anyhow::{Context, anyhow};
use log::{debug, error, info, warn};

use g3collectd::config::ProcessConfig;
use g3collectd::plugin::Registry;
use g3collectd::schedule::Scheduler;

fn main() -> anyhow::Result<()> {
    let Some(proc_args) =
        g3collectd::opts::parse_clap().context("failed to parse command line options")?
    else {
        return Ok(());
    };

    // set up process logger early, only proc args is used inside
    let _log_guard = g3collectd::log::setup(proc_args.verbose_level)
        .map_err(|e| anyhow!("failed to setup logger: {e}"))?;

    let config = g3collectd::config::load(&proc_args.config_file)
        .context(format!("failed to load config, opts: {proc_args:?}"))?;
    debug!("loaded config from {}", proc_args.config_file.display());

    let registry = g3collectd::build_registry(&config, |_| Ok(()))?;

    if proc_args.test_config {
        info!("the format of the config file is ok");
        return Ok(());
    }

    match tokio_run(config, registry) {
        Ok(_) => Ok(()),
        Err(e) => {
            error!("{e:?}");
            Err(e)
        }
    }
}

fn tokio_run(config: ProcessConfig, registry: Registry) -> anyhow::Result<()> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("g3collectd")
        .build()
        .context("failed to start runtime")?;
    rt.block_on(async move {
        let flush_timeout = config.global.shutdown_timeout;
        let scheduler = Scheduler::new(registry, config.global).start().await;

        let r = g3collectd::signal::wait_quit(&scheduler, flush_timeout).await;

        let report = scheduler.shutdown().await;
        if !report.is_ok() {
            warn!(
                "shutdown finished with {} errors, {} handlers abandoned",
                report.errors.len(),
                report.abandoned.len()
            );
        }
        r
    })
}
