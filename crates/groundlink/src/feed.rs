//! Event Feed
//!
//! Line-oriented push channel: one JSON envelope per line, read from a file
//! or stdin. Opening the source reports the link as connected, reaching the
//! end of input reports it as disconnected.

use std::path::PathBuf;
use std::str::FromStr;

use groundlink_types::LinkStatus;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{debug, info};

use crate::error::Result;
use crate::session::SessionHandle;

/// Where envelopes are read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedSource {
    Stdin,
    File(PathBuf),
}

impl FromStr for FeedSource {
    type Err = std::convert::Infallible;

    /// `-` selects stdin, anything else is a file path
    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match value {
            "-" => Self::Stdin,
            path => Self::File(PathBuf::from(path)),
        })
    }
}

impl std::fmt::Display for FeedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdin => write!(f, "stdin"),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Forward every non-blank line of `reader` to the session.
///
/// Returns the number of frames sent.
pub async fn pump<R>(reader: R, session: &SessionHandle) -> Result<u64>
where
    R: AsyncBufRead + Unpin,
{
    session.set_link(LinkStatus::Connected).await?;

    let mut lines = reader.lines();
    let mut frames = 0u64;
    let outcome = loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if let Err(e) = session.send_frame(line).await {
                    break Err(e);
                }
                frames += 1;
            }
            Ok(None) => break Ok(frames),
            Err(e) => break Err(e.into()),
        }
    };

    // The link is down whichever way the input ended
    session.set_link(LinkStatus::Disconnected).await?;
    debug!(frames, "Feed drained");
    outcome
}

/// Open `source` and pump it into the session
pub async fn run_feed(source: FeedSource, session: SessionHandle) -> Result<u64> {
    info!(%source, "Reading events");

    let frames = match &source {
        FeedSource::Stdin => pump(BufReader::new(tokio::io::stdin()), &session).await?,
        FeedSource::File(path) => {
            let file = tokio::fs::File::open(path).await?;
            pump(BufReader::new(file), &session).await?
        }
    };

    info!(%source, frames, "Feed finished");
    Ok(frames)
}
