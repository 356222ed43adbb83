//! `sensorlink config` handlers.

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config;
use crate::error::CliError;
use crate::output;

pub fn handle(args: &ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let color = output::should_color(&global.color);

    match &args.command {
        ConfigCommand::Path => {
            output::print_output(&config::effective_path(global).display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::Init => {
            let path = config::effective_path(global);
            let written = sensorlink_config::init_config(&path)?;
            let msg = if written {
                format!("{} {}", output::success("wrote", color), path.display())
            } else {
                format!("{} {}", output::muted("exists", color), path.display())
            };
            output::print_output(&msg, global.quiet);
            Ok(())
        }

        ConfigCommand::Show => {
            let mut cfg = config::load(global)?;
            if cfg.server.token.is_some() {
                cfg.server.token = Some("<redacted>".into());
            }
            let rendered = toml::to_string_pretty(&cfg)?;
            output::print_output(rendered.trim_end(), global.quiet);
            Ok(())
        }

        ConfigCommand::SetToken { token } => {
            if token.trim().is_empty() {
                return Err(CliError::Validation {
                    field: "token".into(),
                    reason: "must not be empty".into(),
                });
            }
            sensorlink_config::store_token(token.trim())?;
            let msg = output::success("token stored in system keyring", color);
            output::print_output(&msg, global.quiet);
            Ok(())
        }
    }
}
