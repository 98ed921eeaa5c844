use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::tasks::panel::PanelHandle;

/// One line of operator input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    Next,
    Previous,
    Pause,
    Resume,
    Stop,
    Start(i64),
    Set { name: String, value: String },
    Unset(String),
    Status,
}

impl ControlCommand {
    /// Parses a command line; blank lines yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(None);
        };
        let command = match verb.to_ascii_lowercase().as_str() {
            "next" | "n" => Self::Next,
            "prev" | "previous" | "p" => Self::Previous,
            "pause" => Self::Pause,
            "resume" => Self::Resume,
            "stop" => Self::Stop,
            "start" => match words.next() {
                None => Self::Start(0),
                Some(raw) => Self::Start(
                    raw.parse()
                        .map_err(|_| format!("start expects an index, got `{raw}`"))?,
                ),
            },
            "set" => {
                let name = words.next().ok_or("set expects <attribute> <value>")?;
                let value = words.collect::<Vec<_>>().join(" ");
                if value.is_empty() {
                    return Err(format!("set {name} expects a value"));
                }
                Self::Set {
                    name: name.to_owned(),
                    value,
                }
            }
            "unset" => Self::Unset(words.next().ok_or("unset expects <attribute>")?.to_owned()),
            "status" => Self::Status,
            other => return Err(format!("unknown command `{other}`")),
        };
        Ok(Some(command))
    }
}

/// Reads commands line by line from `input` and forwards them to the panel.
///
/// Returns when the input ends, the panel goes away, or `cancel` fires.
pub async fn run<R>(input: R, panel: PanelHandle, cancel: CancellationToken) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    loop {
        let line = select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            info!("control input closed");
            break;
        };
        let command = match ControlCommand::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(msg) => {
                warn!(input = %line, "{msg}");
                continue;
            }
        };
        if let Err(err) = dispatch(&panel, command).await {
            warn!("control task stopping: {err}");
            break;
        }
    }
    Ok(())
}

async fn dispatch(panel: &PanelHandle, command: ControlCommand) -> Result<()> {
    match command {
        ControlCommand::Next => panel.next().await,
        ControlCommand::Previous => panel.previous().await,
        ControlCommand::Pause => panel.pause().await,
        ControlCommand::Resume => panel.resume().await,
        ControlCommand::Stop => panel.stop().await,
        ControlCommand::Start(index) => panel.start(index).await,
        ControlCommand::Set { name, value } => panel.set_attribute(name, Some(value)).await,
        ControlCommand::Unset(name) => panel.set_attribute(name, None).await,
        ControlCommand::Status => {
            let snap = panel.snapshot().await?;
            info!(
                state = ?snap.state,
                index = snap.current_index,
                slides = snap.slide_count,
                timer_running = snap.timer_running,
                attributes = ?snap.attributes,
                "panel status"
            );
            Ok(())
        }
    }
}
