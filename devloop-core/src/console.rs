//! User-facing terminal output.
//!
//! Every line is tagged with a routing key: a service name, or one of the
//! fixed tags below. Message bodies may carry `<dir>`, `<service>` and
//! `<error>` markup; rendering it is the sink's job, not the caller's.

use std::collections::HashSet;
use std::io::Write;
use std::sync::Arc;

use colored::{Color, Colorize};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Routing key for session control messages.
pub const CONTROL_TAG: &str = "devloop";

/// Routing key for build progress and build logs.
pub const BUILD_TAG: &str = "build";

static RE_MARKUP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<(dir|service|error)>(.*?)</(?:dir|service|error)>").expect("static markup pattern")
});

const PALETTE: [Color; 6] = [
    Color::Blue,
    Color::Green,
    Color::Yellow,
    Color::Magenta,
    Color::Cyan,
    Color::BrightBlue,
];

/// A line sink.
pub trait Output: Send + Sync {
    fn line(&self, key: &str, message: &str);
}

/// Cheap-to-clone handle every task writes through.
#[derive(Clone)]
pub struct Console {
    out: Arc<dyn Output>,
}

impl Console {
    pub fn new(out: Arc<dyn Output>) -> Self {
        Self { out }
    }

    /// Write one line under `key`. Trailing newlines are trimmed.
    pub fn line(&self, key: &str, message: impl AsRef<str>) {
        let message = message.as_ref().trim_end_matches(['\r', '\n']);
        self.out.line(key, message);
    }

    /// Write one line under the control tag.
    pub fn control(&self, message: impl AsRef<str>) {
        self.line(CONTROL_TAG, message);
    }
}

/// Render markup tags as terminal colors, or strip them when `color` is off.
pub fn render_markup(message: &str, color: bool) -> String {
    RE_MARKUP
        .replace_all(message, |caps: &Captures<'_>| {
            let body = &caps[2];
            if !color {
                return body.to_string();
            }
            match &caps[1] {
                "dir" => body.cyan().to_string(),
                "service" => body.bold().to_string(),
                _ => body.red().to_string(),
            }
        })
        .into_owned()
}

/// Writes `key | message` lines to stdout with the key right-aligned.
pub struct PrefixOutput {
    width: usize,
    keys: Vec<String>,
    color: bool,
}

impl PrefixOutput {
    /// `services` fixes the alignment width alongside the built-in tags.
    pub fn new<'a>(services: impl IntoIterator<Item = &'a str>, color: bool) -> Self {
        let mut seen = HashSet::new();
        let mut keys: Vec<String> = [CONTROL_TAG, BUILD_TAG]
            .into_iter()
            .chain(services)
            .filter(|k| seen.insert(k.to_string()))
            .map(str::to_string)
            .collect();
        keys.sort();
        let width = keys.iter().map(String::len).max().unwrap_or(0);
        Self { width, keys, color }
    }

    fn format(&self, key: &str, message: &str) -> String {
        let padded = format!("{key:>width$}", width = self.width);
        let body = render_markup(message, self.color);
        if !self.color {
            return format!("{padded} | {body}");
        }
        let color = self
            .keys
            .iter()
            .position(|k| k == key)
            .map(|i| PALETTE[i % PALETTE.len()])
            .unwrap_or(Color::White);
        let prefix = if key == CONTROL_TAG || key == BUILD_TAG {
            padded.dimmed().to_string()
        } else {
            padded.color(color).to_string()
        };
        format!("{prefix} | {body}")
    }
}

impl Output for PrefixOutput {
    fn line(&self, key: &str, message: &str) {
        let formatted = self.format(key, message);
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        let _ = writeln!(handle, "{formatted}");
    }
}
