//! Output formatting for CLI commands
//!
//! Command results go to stdout as JSON; logs stay on stderr.

use serde::Serialize;

#[derive(Debug, Clone, Copy, Default)]
pub struct OutputContext {
    pretty: bool,
}

impl OutputContext {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    /// Copy with pretty-printing switched on when `pretty` is set
    pub fn with_pretty(self, pretty: bool) -> Self {
        Self {
            pretty: self.pretty || pretty,
        }
    }

    pub fn is_pretty(&self) -> bool {
        self.pretty
    }

    /// Render a value as JSON in the configured style
    pub fn render<T: Serialize>(&self, value: &T) -> serde_json::Result<String> {
        if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        }
    }

    pub fn print<T: Serialize>(&self, value: &T) {
        match self.render(value) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("Failed to serialize output: {e}"),
        }
    }
}
