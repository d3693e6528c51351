//! App log retrieval and per-service demultiplexing.
//!
//! The platform serves aggregated logs as
//! `YYYY-MM-DDTHH:MM:SSZ <kind>/<name>/<instance> <message>` lines. `service`
//! lines are routed under their service name; `system` lines are routed under
//! the service their instance id belongs to.

use std::borrow::Cow;
use std::collections::HashSet;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader};

use devloop_core::types::LogsOptions;
use devloop_core::{Console, Provider, Shutdown};

/// Initial capacity of the line buffer.
pub const SCAN_START_SIZE: usize = 4096;

/// Longest accepted log line.
pub const SCAN_MAX_SIZE: usize = 20 * 1024 * 1024;

static RE_APP_LOG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{4}-\d{2}-\d{2})T(\d{2}:\d{2}:\d{2})Z ([^/]+)/([^/]+)/([^ ]+) (.*)$")
        .expect("static log line pattern")
});

static RE_SCREEN_COMMAND: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1b\[\d+;\d+H").expect("static ansi pattern"));

/// One parsed log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub date: String,
    pub time: String,
    pub kind: String,
    pub name: String,
    pub instance: String,
    pub message: String,
}

impl LogLine {
    /// Parse a wire line; `None` for anything not in the log format.
    pub fn parse(line: &str) -> Option<Self> {
        let caps = RE_APP_LOG.captures(line)?;
        Some(Self {
            date: caps[1].to_string(),
            time: caps[2].to_string(),
            kind: caps[3].to_string(),
            name: caps[4].to_string(),
            instance: caps[5].to_string(),
            message: caps[6].to_string(),
        })
    }

    /// Routing key and message for this line, or `None` when it is filtered.
    pub fn route(&self, interest: &HashSet<String>) -> Option<(String, String)> {
        match self.kind.as_str() {
            "service" => interest.contains(&self.name).then(|| {
                (
                    self.name.clone(),
                    strip_screen_commands(&self.message).into_owned(),
                )
            }),
            "system" => {
                let service = self.instance.split('-').next().unwrap_or_default();
                interest
                    .contains(service)
                    .then(|| (service.to_string(), self.message.clone()))
            }
            _ => None,
        }
    }
}

/// Remove ANSI cursor-positioning sequences.
pub fn strip_screen_commands(data: &str) -> Cow<'_, str> {
    RE_SCREEN_COMMAND.replace_all(data, "")
}

/// Newline-delimited reader with a bounded line buffer.
pub struct LineScanner<R> {
    reader: R,
    line: Vec<u8>,
    max: usize,
}

impl<R: AsyncRead + Unpin> LineScanner<BufReader<R>> {
    pub fn new(reader: R) -> Self {
        Self::with_limit(BufReader::with_capacity(SCAN_START_SIZE, reader), SCAN_MAX_SIZE)
    }
}

impl<R: AsyncBufRead + Unpin> LineScanner<R> {
    pub fn with_limit(reader: R, max: usize) -> Self {
        Self {
            reader,
            line: Vec::with_capacity(SCAN_START_SIZE.min(max)),
            max,
        }
    }

    /// Next line without its terminator; `None` at end of stream.
    ///
    /// A line longer than the limit is an `InvalidData` error.
    pub async fn next_line(&mut self) -> io::Result<Option<String>> {
        self.line.clear();
        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                if self.line.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(self.take_line()));
            }

            let (chunk, found) = match available.iter().position(|b| *b == b'\n') {
                Some(i) => (&available[..i], Some(i + 1)),
                None => (available, None),
            };
            if self.line.len() + chunk.len() > self.max {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("line exceeds {} bytes", self.max),
                ));
            }
            self.line.extend_from_slice(chunk);
            let consumed = found.unwrap_or(chunk.len());
            self.reader.consume(consumed);
            if found.is_some() {
                return Ok(Some(self.take_line()));
            }
        }
    }

    fn take_line(&mut self) -> String {
        if self.line.last() == Some(&b'\r') {
            self.line.pop();
        }
        String::from_utf8_lossy(&self.line).into_owned()
    }
}

/// Route every line of one log stream to the console until it ends.
pub async fn write_logs<R: AsyncRead + Unpin>(
    reader: R,
    console: &Console,
    interest: &HashSet<String>,
    shutdown: &mut Shutdown,
) {
    let mut scanner = LineScanner::new(reader);
    loop {
        let next = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return,
            next = scanner.next_line() => next,
        };
        match next {
            Ok(Some(line)) => {
                let Some(parsed) = LogLine::parse(&line) else {
                    continue;
                };
                if let Some((key, message)) = parsed.route(interest) {
                    console.line(&key, message);
                }
            }
            Ok(None) => return,
            Err(err) => {
                console.control(format!("scan error: {err}"));
                return;
            }
        }
    }
}

/// Reconnecting app log follower.
pub struct LogStreamMultiplexer {
    provider: Arc<dyn Provider>,
    app: String,
    console: Console,
    interest: HashSet<String>,
    retry: Duration,
}

impl LogStreamMultiplexer {
    pub fn new(
        provider: Arc<dyn Provider>,
        app: impl Into<String>,
        console: Console,
        interest: HashSet<String>,
    ) -> Self {
        Self {
            provider,
            app: app.into(),
            console,
            interest,
            retry: Duration::from_secs(1),
        }
    }

    pub fn with_retry(mut self, retry: Duration) -> Self {
        self.retry = retry;
        self
    }

    /// Fetch, drain, wait, repeat until cancelled.
    pub async fn run(self, mut shutdown: Shutdown) {
        loop {
            if shutdown.is_cancelled() {
                return;
            }
            let opts = LogsOptions {
                prefix: true,
                since: Some(Duration::from_secs(1)),
            };
            let fetched = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return,
                fetched = self.provider.app_logs(&self.app, opts) => fetched,
            };
            match fetched {
                Ok(stream) => {
                    write_logs(stream, &self.console, &self.interest, &mut shutdown).await;
                }
                Err(err) => tracing::warn!(app = %self.app, error = %err, "log fetch failed, retrying"),
            }

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return,
                _ = tokio::time::sleep(self.retry) => {}
            }
        }
    }
}
