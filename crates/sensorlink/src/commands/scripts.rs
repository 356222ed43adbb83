//! `sensorlink scripts` handlers.

use std::path::PathBuf;

use serde::Serialize;
use tabled::Tabled;

use sensorlink_core::{Script, ScriptWorker};

use super::{SensorView, sensor_row};
use crate::cli::{GlobalOpts, ScriptsArgs, ScriptsCommand};
use crate::config;
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
struct ScriptView {
    path: PathBuf,
    schedule: String,
}

#[derive(Tabled)]
struct ScriptRow {
    #[tabled(rename = "Script")]
    path: String,
    #[tabled(rename = "Schedule")]
    schedule: String,
}

pub async fn handle(args: &ScriptsArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match &args.command {
        ScriptsCommand::List { dir } => {
            let dir = match dir {
                Some(d) => d.clone(),
                None => {
                    let cfg = config::load(global)?;
                    cfg.agent
                        .scripts_dir
                        .unwrap_or_else(sensorlink_config::default_scripts_dir)
                }
            };
            if !dir.is_dir() {
                return Err(CliError::NoScriptsDir {
                    path: dir.display().to_string(),
                });
            }

            let worker = ScriptWorker::discover(&dir).await?;
            let scripts: Vec<ScriptView> = worker
                .jobs()
                .into_iter()
                .map(|(path, schedule, _)| ScriptView { path, schedule })
                .collect();

            let out = output::render_list(
                &global.output,
                &scripts,
                |s| ScriptRow {
                    path: s.path.display().to_string(),
                    schedule: s.schedule.clone(),
                },
                |s| s.path.display().to_string(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ScriptsCommand::Run { path, args } => {
            if !path.exists() {
                return Err(CliError::UnknownScript {
                    path: path.display().to_string(),
                });
            }
            let mut command_line = path.display().to_string();
            for arg in args {
                command_line.push(' ');
                command_line.push_str(arg);
            }

            let script = Script::load(&command_line).await?;
            tracing::debug!(script = %script.path().display(), schedule = %script.schedule(), "script loaded");
            let entities = script.execute().await?;
            let views: Vec<SensorView> = entities.iter().map(SensorView::from).collect();

            let out = output::render_list(
                &global.output,
                &views,
                sensor_row,
                |v| v.id.clone(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}
