//! Status and watch handlers.

use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use hearth_core::{SessionEvent, SnapshotSet};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

use super::util;

fn print_snapshot(snapshot: &SnapshotSet, global: &GlobalOpts) -> Result<(), CliError> {
    let color = output::should_color(global.color);
    let out = output::render_thermostats(global.output, &snapshot.displays(), color)?;
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn status(global: &GlobalOpts) -> Result<(), CliError> {
    let (session, snapshot) = util::connect(global).await?;
    let printed = print_snapshot(&snapshot, global);
    if global.output == OutputFormat::Table && !global.quiet {
        let color = output::should_color(global.color);
        let pending = session.controller.pending_commands().len();
        eprintln!(
            "profile {} · session {}{}",
            session.profile,
            output::paint_state(session.controller.state(), color),
            if pending > 0 {
                format!(" · {pending} pending")
            } else {
                String::new()
            }
        );
    }
    session.controller.shutdown().await;
    printed
}

pub async fn watch(args: WatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let (session, snapshot) = util::connect(global).await?;
    let result = match print_snapshot(&snapshot, global) {
        Ok(()) if !args.once => follow(&session, global).await,
        other => other,
    };
    session.controller.shutdown().await;
    result
}

/// Print every change until Ctrl-C or the session ends.
async fn follow(session: &util::Session, global: &GlobalOpts) -> Result<(), CliError> {
    let color = output::should_color(global.color);
    let mut events = session.controller.events();
    let mut states = session.controller.subscribe_state();
    states.mark_unchanged();
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);

    loop {
        tokio::select! {
            _ = &mut interrupt => {
                debug!("interrupted");
                return Ok(());
            }
            changed = states.changed() => {
                if changed.is_err() {
                    return Err(CliError::SessionClosed);
                }
                let state = *states.borrow_and_update();
                if !global.quiet {
                    eprintln!("session {}", output::paint_state(state, color));
                }
            }
            event = events.recv() => match event {
                Ok(SessionEvent::Updated(snapshot) | SessionEvent::Ready(snapshot)) => {
                    print_snapshot(&snapshot, global)?;
                }
                Ok(SessionEvent::Error(kind)) if kind.needs_reauth() => {
                    return Err(CliError::AuthFailed {
                        profile: session.profile.clone(),
                        message: kind.to_string(),
                    });
                }
                Ok(SessionEvent::Error(kind)) => warn!(%kind, "session error"),
                Ok(SessionEvent::NeedsAuth) => {
                    return Err(CliError::NeedsAuth {
                        profile: session.profile.clone(),
                    });
                }
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "watch lagged"),
                Err(RecvError::Closed) => return Err(CliError::SessionClosed),
            },
        }
    }
}
