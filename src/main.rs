// SPDX-License-Identifier: MIT
//
// n-tea: live input event viewer.
//
// Puts the terminal in raw mode and shows every decoded event as it
// arrives, newest at the bottom. Useful for checking what a terminal
// actually sends for a key chord, a mouse drag, or a focus change, and
// for watching the diff renderer repaint in place.
//
//   n-tea [--inline] [--mouse] [--all-motion] [--no-focus] [--json]
//
//   --inline       paint below the prompt instead of on the alternate screen
//   --mouse        report mouse presses, releases, wheel, and drags
//   --all-motion   also report motion with no button held (implies --mouse)
//   --no-focus     do not request focus in/out reports
//   --json         show events in the wire format instead of as text
//
// Press q or Ctrl+C to quit. Set RUST_LOG=debug to see runtime logs on
// stderr.

use std::collections::VecDeque;
use std::env;
use std::fmt::Write as _;
use std::process;

use n_tty::ansi::MouseMode;
use n_tty::event_loop::{Action, App, EventLoop, LoopConfig};
use n_tty::input::MouseAction;
use n_tty::{Event, KeyCode, SessionRegistry};

/// Events kept on screen in alt-screen mode when the height is unknown.
const DEFAULT_HISTORY: usize = 20;

/// Lines of history shown in inline mode.
const INLINE_HISTORY: usize = 8;

// ─── Options ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Options {
    config: LoopConfig,
    json: bool,
}

/// Map command-line flags onto a loop configuration.
fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Options, String> {
    let mut config = LoopConfig {
        report_focus: true,
        ..LoopConfig::default()
    };
    let mut json = false;

    for arg in args {
        match arg.as_str() {
            "--inline" => config.alt_screen = false,
            "--mouse" => {
                config.mouse.get_or_insert(MouseMode::CellMotion);
            }
            "--all-motion" => config.mouse = Some(MouseMode::AllMotion),
            "--no-focus" => config.report_focus = false,
            "--json" => json = true,
            other => return Err(format!("unknown option: {other}")),
        }
    }
    Ok(Options { config, json })
}

// ─── Viewer ─────────────────────────────────────────────────────────────────

struct Viewer {
    events: VecDeque<String>,
    capacity: usize,
    inline: bool,
    json: bool,
    size: (u16, u16),
    total: u64,
}

impl Viewer {
    fn new(options: &Options) -> Self {
        let inline = !options.config.alt_screen;
        let capacity = if inline { INLINE_HISTORY } else { DEFAULT_HISTORY };
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
            inline,
            json: options.json,
            size: (0, 0),
            total: 0,
        }
    }

    fn record(&mut self, event: &Event) {
        let line = if self.json {
            event
                .to_json()
                .unwrap_or_else(|e| format!("<unencodable event: {e}>"))
        } else {
            describe(event)
        };
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(line);
        self.total += 1;
    }
}

impl App for Viewer {
    fn on_event(&mut self, event: &Event) -> Action {
        if let Event::Key(key) = event {
            if key.code == KeyCode::CtrlC || (key.name == "q" && !key.alt) {
                return Action::Quit;
            }
        }
        if let Event::Resize { width, height } = *event {
            self.size = (width, height);
            // Header and footer take two rows.
            if !self.inline {
                self.capacity = usize::from(height.saturating_sub(2)).max(1);
                while self.events.len() > self.capacity {
                    self.events.pop_front();
                }
            }
        }
        self.record(event);
        Action::Continue
    }

    fn view(&self) -> String {
        let mut out = format!(
            "n-tea  {}x{}  {} events",
            self.size.0, self.size.1, self.total
        );
        for line in &self.events {
            out.push('\n');
            out.push_str(line);
        }
        out.push_str("\nq or ctrl+c to quit");
        out
    }
}

/// One-line, human-readable rendering of an event.
fn describe(event: &Event) -> String {
    match event {
        Event::Key(key) => {
            let mut s = format!("key    {:<14} code {}", key.name, key.code.value());
            if !key.runes.is_empty() {
                let runes: Vec<String> =
                    key.runes.iter().map(|c| format!("U+{:04X}", u32::from(*c))).collect();
                let _ = write!(s, "  runes {}", runes.join(" "));
            }
            s
        }
        Event::Mouse(m) => {
            let action = match m.action {
                MouseAction::Press => "press",
                MouseAction::Release => "release",
                MouseAction::Motion => "motion",
            };
            let mut s = format!("mouse  {action:<8} button {} at {},{}", m.button, m.x, m.y);
            for (held, name) in [(m.ctrl(), "ctrl"), (m.alt(), "alt"), (m.shift(), "shift")] {
                if held {
                    let _ = write!(s, " +{name}");
                }
            }
            s
        }
        Event::Resize { width, height } => format!("resize {width}x{height}"),
        Event::Focus { focused: true } => String::from("focus  gained"),
        Event::Focus { focused: false } => String::from("focus  lost"),
    }
}

// ─── Main ───────────────────────────────────────────────────────────────────

fn main() {
    env_logger::init();

    let options = parse_args(env::args().skip(1)).unwrap_or_else(|e| {
        eprintln!("n-tea: {e}");
        eprintln!("usage: n-tea [--inline] [--mouse] [--all-motion] [--no-focus] [--json]");
        process::exit(2);
    });
    log::debug!(
        "starting viewer: alt_screen={} mouse={:?} focus={} paste={} json={}",
        options.config.alt_screen,
        options.config.mouse,
        options.config.report_focus,
        options.config.bracketed_paste,
        options.json
    );

    let registry = SessionRegistry::new();
    let handle = registry.create();
    let result = registry
        .get(handle)
        .and_then(|session| EventLoop::new(session, options.config).run(&mut Viewer::new(&options)));
    registry.destroy(handle);
    log::debug!("viewer exited: {result:?}");

    if let Err(e) = result {
        eprintln!("n-tea: {e}");
        process::exit(1);
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
