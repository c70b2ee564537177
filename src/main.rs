mod cache;
mod client;
mod command;
mod config;
mod gateway;
mod plugins;
mod store;
mod system;
mod table;
mod types;

use std::path::PathBuf;
use std::time::Duration;
use std::{fs, thread};

use anyhow::Context;
use tokio::{runtime, task::JoinSet};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let initial_config =
        fs::read_to_string("./config.toml").context("could not find config file")?;
    let config = config::Config::load(&initial_config)?;
    let restart_delay = Duration::from_secs(config.restart_delay_seconds);

    let waiter_pool = runtime::Builder::new_multi_thread()
        .worker_threads(config.systems.len().max(1))
        .build()?;
    let mut waiters = JoinSet::new();

    let data_dir = config.data_dir.clone();
    let db_path = config.db_path.clone();
    for (system_name, system_config) in config.systems.into_iter() {
        let system_handle =
            spawn_system(&system_name, system_config, data_dir.clone(), db_path.clone());

        waiters.spawn_blocking_on(
            move || -> String {
                let _ = system_handle.join();
                system_name
            },
            waiter_pool.handle(),
        );
    }

    runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(async {
            while let Some(system_join) = waiters.join_next().await {
                let Ok(system_name) = system_join else {
                    continue;
                };
                tracing::info!(
                    system = %system_name,
                    "system thread joined, reloading config and restarting"
                );
                tokio::time::sleep(restart_delay).await;

                let config_file = match fs::read_to_string("./config.toml") {
                    Ok(config_file) => config_file,
                    Err(err) => {
                        tracing::warn!("could not reread config file, keeping initial: {}", err);
                        initial_config.clone()
                    }
                };
                let updated_config = match config::Config::load(&config_file) {
                    Ok(updated_config) => updated_config,
                    Err(err) => {
                        tracing::error!(
                            system = %system_name,
                            "updated config does not parse, not restarting: {:#}",
                            err
                        );
                        continue;
                    }
                };

                match updated_config
                    .systems
                    .into_iter()
                    .find(|(name, _)| name.eq(&system_name))
                {
                    Some((_, system_config)) => {
                        let system_handle = spawn_system(
                            &system_name,
                            system_config,
                            updated_config.data_dir.clone(),
                            updated_config.db_path.clone(),
                        );
                        waiters.spawn_blocking_on(
                            move || -> String {
                                let _ = system_handle.join();
                                system_name
                            },
                            waiter_pool.handle(),
                        );
                    }
                    None => {
                        tracing::info!(
                            system = %system_name,
                            "system no longer configured, not restarting"
                        );
                    }
                }
            }
        });

    Ok(())
}

fn spawn_system(
    system_name: &str,
    system_config: config::System,
    data_dir: PathBuf,
    db_path: PathBuf,
) -> thread::JoinHandle<()> {
    let name = system_name.to_string();
    thread::spawn(move || {
        let thread_local_runtime = match runtime::Builder::new_current_thread().enable_all().build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                tracing::error!(system = %name, "could not build runtime: {}", err);
                return;
            }
        };

        thread_local_runtime.block_on(async {
            let mut system =
                match system::System::new(name.clone(), system_config, &data_dir, &db_path) {
                    Ok(system) => system,
                    Err(err) => {
                        tracing::error!(system = %name, "could not build system: {:#}", err);
                        return;
                    }
                };
            if let Err(err) = system.run().await {
                tracing::warn!(system = %name, "system stopped: {:#}", err);
            }
        });
    })
}
