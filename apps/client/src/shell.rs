//! The read-eval-print loop over standard input.

use crate::api::ApiClient;
use crate::commands::{self, Flow, Line};
use crate::error::ClientError;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

const SIGNED_OUT_PROMPT: &str = "(no authorization)> ";
const SIGNED_IN_PROMPT: &str = "> ";

/// Reads commands until `exit`, end of input or Ctrl-C.
///
/// # Errors
/// [`ClientError::Io`] when the terminal itself fails.
pub async fn run(mut api: ApiClient) -> Result<(), ClientError> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = std::io::stdout();

    loop {
        prompt(&api, &mut stdout)?;
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                writeln!(stdout)?;
                break;
            },
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }
        if matches!(step(&mut api, &line, &mut stdout).await?, Flow::Exit) {
            break;
        }
    }
    debug!("Shell finished");
    Ok(())
}

/// Handles one line. Command failures are reported to the user and the shell
/// keeps going; only a broken terminal ends it.
///
/// # Errors
/// [`ClientError::Io`] when `out` cannot be written.
pub async fn step(api: &mut ApiClient, line: &str, out: &mut impl Write) -> Result<Flow, ClientError> {
    let command = match Line::parse_input(line) {
        Ok(parsed) => parsed.command,
        Err(err) => {
            writeln!(out, "{}", err.render())?;
            return Ok(Flow::Continue);
        },
    };
    match commands::execute(api, command, out).await {
        Ok(flow) => Ok(flow),
        Err(err) if is_terminal_gone(&err) => Err(err),
        Err(err) => {
            if err.is_unauthorized() {
                api.sign_out();
            }
            debug!(error = %err, "Command failed");
            writeln!(out, "Error: {err}")?;
            Ok(Flow::Continue)
        },
    }
}

fn prompt(api: &ApiClient, out: &mut impl Write) -> Result<(), ClientError> {
    let text = if api.session().is_authenticated() { SIGNED_IN_PROMPT } else { SIGNED_OUT_PROMPT };
    write!(out, "{text}")?;
    out.flush()?;
    Ok(())
}

fn is_terminal_gone(err: &ClientError) -> bool {
    matches!(err, ClientError::Io { source, .. } if source.kind() == std::io::ErrorKind::BrokenPipe)
}
