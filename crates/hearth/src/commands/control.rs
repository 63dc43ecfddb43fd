//! Setpoint, mode, and away handlers.
//!
//! Each sends one command through the session and waits for the server's
//! answer, then prints the resulting state of the affected thermostat.

use tracing::info;

use hearth_core::{AwayState, Command, SnapshotSet, ThermostatDisplay};

use crate::cli::{AwayArgs, BoundArg, GlobalOpts, SetArgs, SetCommand};
use crate::error::CliError;
use crate::output;

use super::util::{self, Session};

/// Translate `set` arguments into a command against `snapshot`.
fn build_set(args: &SetArgs, snapshot: &SnapshotSet) -> Result<Command, CliError> {
    let device = util::resolve_thermostat(snapshot, args.device.as_deref())?;
    let command = match args.command {
        SetCommand::Temp { value } => Command::SetTargetTemperature {
            device_id: device.device_id.clone(),
            value_f: value,
        },
        SetCommand::Range { low, high } => Command::SetTemperatureRange {
            device_id: device.device_id.clone(),
            low_f: low,
            high_f: high,
        },
        SetCommand::Mode { mode } => Command::SetHvacMode {
            device_id: device.device_id.clone(),
            mode: mode.into(),
        },
        SetCommand::Step { delta, bound } => {
            let stepped = match bound {
                BoundArg::Target => Command::step_target(&device, delta),
                BoundArg::Low => Command::step_low(&device, delta),
                BoundArg::High => Command::step_high(&device, delta),
            };
            stepped.map_err(|e| CliError::from_core(e, ""))?
        }
    };
    Ok(command)
}

/// `away` with no state flips the structure's current one.
fn build_away(args: &AwayArgs, snapshot: &SnapshotSet) -> Result<Command, CliError> {
    let structure = util::resolve_structure(snapshot, args.structure.as_deref())?;
    let away = args
        .state
        .map_or_else(|| structure.away.toggled(), AwayState::from);
    Ok(Command::SetAway {
        structure_id: structure.structure_id.clone(),
        away,
    })
}

/// Send `command`, wait for completion, and print what changed.
async fn run(session: &Session, command: Command, global: &GlobalOpts) -> Result<(), CliError> {
    info!(command = command.target(), "sending command");
    let timeout = session.controller.config().timeout;
    let dispatcher = session.controller.dispatcher();
    let completed = tokio::time::timeout(timeout, dispatcher.execute(command.clone()))
        .await
        .map_err(|_| CliError::Timeout {
            seconds: timeout.as_secs(),
        })?;
    completed.map_err(|e| session.core_err(e))?;

    let snapshot = session.controller.snapshot();
    let displays: Vec<ThermostatDisplay> = match &command {
        Command::SetAway { structure_id, .. } => snapshot
            .displays()
            .into_iter()
            .filter(|d| {
                snapshot
                    .structure(structure_id)
                    .is_some_and(|s| s.thermostat_ids.contains(&d.device_id))
            })
            .collect(),
        other => snapshot
            .displays()
            .into_iter()
            .filter(|d| d.device_id == other.target())
            .collect(),
    };
    let color = output::should_color(global.color);
    let out = output::render_thermostats(global.output, &displays, color)?;
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn set(args: SetArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let (session, snapshot) = util::connect(global).await?;
    let result = match build_set(&args, &snapshot) {
        Ok(command) => run(&session, command, global).await,
        Err(e) => Err(e),
    };
    session.controller.shutdown().await;
    result
}

pub async fn away(args: AwayArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let (session, snapshot) = util::connect(global).await?;
    let result = match build_away(&args, &snapshot) {
        Ok(command) => run(&session, command, global).await,
        Err(e) => Err(e),
    };
    session.controller.shutdown().await;
    result
}
