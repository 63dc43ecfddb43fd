//! Output formatting: table or JSON.
//!
//! Table uses `tabled`, JSON serializes the core types directly so scripts
//! see the same shapes the library exposes.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use serde::Serialize;
use tabled::{Table, Tabled, settings::Style};

use hearth_core::{ControlLayout, HvacActivity, SessionState, ThermostatDisplay};

use crate::cli::{ColorMode, OutputFormat};
use crate::error::CliError;

// ── Color helpers ────────────────────────────────────────────────────

/// Determine whether color output should be enabled.
pub fn should_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

fn paint_activity(activity: HvacActivity, color: bool) -> String {
    let text = activity.to_string();
    if !color {
        return text;
    }
    match activity {
        HvacActivity::Heating => text.red().to_string(),
        HvacActivity::Cooling => text.cyan().to_string(),
        HvacActivity::Idle => text.dimmed().to_string(),
    }
}

pub fn paint_state(state: SessionState, color: bool) -> String {
    let text = state.to_string();
    if !color {
        return text;
    }
    match state {
        SessionState::Live => text.green().to_string(),
        SessionState::Degraded | SessionState::Authenticating => text.yellow().to_string(),
        SessionState::Revoked | SessionState::Unauthenticated => text.red().to_string(),
        SessionState::Closed => text.dimmed().to_string(),
    }
}

// ── Thermostat rows ──────────────────────────────────────────────────

#[derive(Tabled)]
struct ThermostatRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Home")]
    structure: String,
    #[tabled(rename = "Mode")]
    mode: String,
    #[tabled(rename = "Ambient")]
    ambient: String,
    #[tabled(rename = "Setpoint")]
    setpoint: String,
    #[tabled(rename = "Activity")]
    activity: String,
}

fn thermostat_row(display: &ThermostatDisplay, color: bool) -> ThermostatRow {
    let setpoint = match display.layout {
        ControlLayout::Away if color => "away".yellow().to_string(),
        layout => layout.to_string(),
    };
    ThermostatRow {
        id: display.device_id.clone(),
        name: display.name.clone(),
        structure: display.structure_name.clone().unwrap_or_else(|| "-".into()),
        mode: display.hvac_mode.to_string(),
        ambient: format!("{}°F", display.ambient_f),
        setpoint,
        activity: paint_activity(display.activity, color),
    }
}

/// Render thermostat display state in the chosen format.
pub fn render_thermostats(
    format: OutputFormat,
    displays: &[ThermostatDisplay],
    color: bool,
) -> Result<String, CliError> {
    match format {
        OutputFormat::Table => {
            if displays.is_empty() {
                return Ok("No thermostats.".into());
            }
            let rows: Vec<ThermostatRow> =
                displays.iter().map(|d| thermostat_row(d, color)).collect();
            Ok(render_table(&rows))
        }
        OutputFormat::Json => render_json(displays, false),
        OutputFormat::JsonCompact => render_json(displays, true),
    }
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

// ── Format-specific renderers ────────────────────────────────────────

fn render_table<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

pub fn render_json<T: Serialize + ?Sized>(data: &T, compact: bool) -> Result<String, CliError> {
    let out = if compact {
        serde_json::to_string(data)?
    } else {
        serde_json::to_string_pretty(data)?
    };
    Ok(out)
}
