//! Login and logout handlers.

use dialoguer::Input;
use tracing::info;

use hearth_core::SessionState;

use crate::cli::{GlobalOpts, LoginArgs};
use crate::error::CliError;

use super::util::{self, prompt_err};

pub async fn login(args: LoginArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let session = util::open_session(global)?;
    let flow = session.controller.authorization_flow();

    let input = if let Some(code) = args.code {
        code
    } else {
        eprintln!("Open this URL to authorize hearth:\n\n  {}\n", flow.url());
        Input::<String>::new()
            .with_prompt("Paste the authorization code or redirect URL")
            .interact_text()
            .map_err(prompt_err)?
    };

    let result = session
        .controller
        .complete_authorization(&flow, &input)
        .await;
    session.controller.shutdown().await;

    match result.map_err(|e| session.core_err(e))? {
        SessionState::Live | SessionState::Degraded => {
            info!(profile = %session.profile, "authorized");
            if !global.quiet {
                eprintln!("✓ Signed in (profile '{}')", session.profile);
            }
            Ok(())
        }
        state => Err(CliError::AuthFailed {
            profile: session.profile,
            message: format!("new credential was not accepted (session {state})"),
        }),
    }
}

pub async fn logout(global: &GlobalOpts) -> Result<(), CliError> {
    let session = util::open_session(global)?;
    session
        .controller
        .logout()
        .await
        .map_err(|e| session.core_err(e))?;
    if !global.quiet {
        eprintln!("✓ Signed out (profile '{}')", session.profile);
    }
    Ok(())
}
