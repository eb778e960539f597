// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Terminal rendering of agent progress

use std::io::{self, Write};

use crossterm::style::{Color, ResetColor, SetForegroundColor};
use crossterm::QueueableCommand;
use serde_json::Value;

use crate::agent::{AgentObserver, RunOutcome};

/// Longest argument summary shown after a tool name
const ARG_PREVIEW_CHARS: usize = 60;

/// Renders turns, tool calls and streamed text to a writer
pub struct TerminalObserver<W: Write + Send> {
    out: W,
    colors: bool,
    /// Whether the cursor sits mid-line after streamed text
    mid_line: bool,
}

impl TerminalObserver<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout(), true)
    }
}

impl TerminalObserver<io::Stderr> {
    /// Progress on stderr, leaving stdout for the report
    pub fn stderr() -> Self {
        Self::new(io::stderr(), true)
    }
}

impl<W: Write + Send> TerminalObserver<W> {
    pub fn new(out: W, colors: bool) -> Self {
        Self {
            out,
            colors,
            mid_line: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn color(&mut self, color: Color) -> io::Result<()> {
        if self.colors {
            self.out.queue(SetForegroundColor(color))?;
        }
        Ok(())
    }

    fn reset(&mut self) -> io::Result<()> {
        if self.colors {
            self.out.queue(ResetColor)?;
        }
        Ok(())
    }

    fn end_line(&mut self) -> io::Result<()> {
        if self.mid_line {
            writeln!(self.out)?;
            self.mid_line = false;
        }
        Ok(())
    }

    fn write_turn(&mut self, turn: usize, max_turns: u32) -> io::Result<()> {
        self.end_line()?;
        self.color(Color::DarkGrey)?;
        writeln!(self.out, "── turn {turn}/{max_turns} ──")?;
        self.reset()?;
        self.out.flush()
    }

    fn write_delta(&mut self, text: &str) -> io::Result<()> {
        write!(self.out, "{text}")?;
        self.mid_line = !text.ends_with('\n');
        self.out.flush()
    }

    fn write_text(&mut self, text: &str) -> io::Result<()> {
        self.end_line()?;
        writeln!(self.out, "{text}")?;
        self.out.flush()
    }

    fn write_tool_call(&mut self, name: &str, input: &Value) -> io::Result<()> {
        self.end_line()?;
        self.color(Color::DarkGrey)?;
        write!(self.out, "  ╭─ ")?;
        self.color(Color::Magenta)?;
        write!(self.out, "{name}")?;
        let args = summarize_args(input);
        if !args.is_empty() {
            self.color(Color::DarkGrey)?;
            write!(self.out, " → ")?;
            self.color(Color::Cyan)?;
            write!(self.out, "{args}")?;
        }
        self.reset()?;
        writeln!(self.out)?;
        self.out.flush()
    }

    fn write_tool_result(&mut self, result: &str) -> io::Result<()> {
        self.color(Color::DarkGrey)?;
        write!(self.out, "  ╰─ ")?;
        match error_message(result) {
            Some(message) => {
                self.color(Color::Red)?;
                write!(self.out, "✗ {}", clip(&message, 80))?;
            }
            None => {
                self.color(Color::Green)?;
                write!(self.out, "✓ ")?;
                self.reset()?;
                write!(
                    self.out,
                    "{} lines, {} chars",
                    result.lines().count(),
                    result.chars().count()
                )?;
            }
        }
        self.reset()?;
        writeln!(self.out)?;
        self.out.flush()
    }

    fn write_finished(&mut self, outcome: &RunOutcome) -> io::Result<()> {
        self.end_line()?;
        match outcome {
            RunOutcome::Completed(_) => Ok(()),
            RunOutcome::TimedOut | RunOutcome::Interrupted => {
                self.color(Color::Yellow)?;
                writeln!(self.out, "{}", outcome.text())?;
                self.reset()?;
                self.out.flush()
            }
        }
    }
}

impl<W: Write + Send> AgentObserver for TerminalObserver<W> {
    fn on_turn_start(&mut self, turn: usize, max_turns: u32) {
        report(self.write_turn(turn, max_turns));
    }

    fn on_text_delta(&mut self, text: &str) {
        report(self.write_delta(text));
    }

    fn on_text(&mut self, text: &str) {
        report(self.write_text(text));
    }

    fn on_tool_call(&mut self, name: &str, input: &Value) {
        report(self.write_tool_call(name, input));
    }

    fn on_tool_result(&mut self, _name: &str, result: &str) {
        report(self.write_tool_result(result));
    }

    fn on_finished(&mut self, outcome: &RunOutcome) {
        report(self.write_finished(outcome));
    }
}

fn report(result: io::Result<()>) {
    if let Err(e) = result {
        tracing::debug!(error = %e, "terminal write failed");
    }
}

/// `key=value` pairs of a tool's arguments, clipped
fn summarize_args(input: &Value) -> String {
    let Some(map) = input.as_object() else {
        return String::new();
    };
    let joined = map
        .iter()
        .map(|(k, v)| match v {
            Value::String(s) => format!("{k}={s}"),
            other => format!("{k}={other}"),
        })
        .collect::<Vec<_>>()
        .join(" ");
    clip(&joined, ARG_PREVIEW_CHARS)
}

fn error_message(result: &str) -> Option<String> {
    let value: Value = serde_json::from_str(result).ok()?;
    value.get("error")?.as_str().map(str::to_string)
}

fn clip(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let head: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn render(f: impl FnOnce(&mut TerminalObserver<Vec<u8>>)) -> String {
        let mut observer = TerminalObserver::new(Vec::new(), false);
        f(&mut observer);
        String::from_utf8(observer.into_inner()).unwrap()
    }

    #[test]
    fn test_tool_call_and_result() {
        let out = render(|o| {
            o.on_turn_start(1, 50);
            o.on_tool_call("decompile", &json!({"function": "main"}));
            o.on_tool_result("decompile", "int main() {\n  return 0;\n}");
        });
        assert_eq!(
            out,
            "── turn 1/50 ──\n  ╭─ decompile → function=main\n  ╰─ ✓ 3 lines, 26 chars\n"
        );
    }

    #[test]
    fn test_error_result() {
        let out = render(|o| o.on_tool_result("x", r#"{"error": "IoError: gone"}"#));
        assert_eq!(out, "  ╰─ ✗ IoError: gone\n");
    }

    #[test]
    fn test_streamed_text_ends_line() {
        let out = render(|o| {
            o.on_text_delta("Hello ");
            o.on_text_delta("there");
            o.on_finished(&RunOutcome::Interrupted);
        });
        assert_eq!(out, "Hello there\nAnalysis interrupted.\n");
    }

    #[test]
    fn test_clip() {
        assert_eq!(clip("short", 10), "short");
        assert_eq!(clip("abcdefghijkl", 8), "abcde...");
    }
}
