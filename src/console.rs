//! Terminal output: titled panels and the startup banner.

use std::io::IsTerminal;

use crossterm::style::{Color, Stylize};

const BANNER: &str = r"
     ___ _   _ ____ ___ ____ ____ _____
    |_  | | | |  _ \_ _/ ___|  _ \_   _|
      | | | | | | | | | |  _| |_) || |
  /\__/ / |_| | |_| | | |_| |  __/ | |
  \____/ \___/|____/___\____|_|    |_|
";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    Normal,
    Message,
    Warning,
    Error,
    Success,
    HumanInteraction,
}

impl Style {
    fn color(self) -> Option<Color> {
        match self {
            Style::Normal => None,
            Style::Message => Some(Color::Cyan),
            Style::Warning => Some(Color::Yellow),
            Style::Error => Some(Color::Red),
            Style::Success => Some(Color::Green),
            Style::HumanInteraction => Some(Color::Magenta),
        }
    }
}

/// Writes panels to stdout. A quiet console drops everything, which keeps
/// one-shot JSON output clean.
#[derive(Debug, Clone)]
pub struct Console {
    quiet: bool,
    color: bool,
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

impl Console {
    pub fn new() -> Self {
        Self {
            quiet: false,
            color: std::io::stdout().is_terminal(),
        }
    }

    pub fn quiet() -> Self {
        Self {
            quiet: true,
            color: false,
        }
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    pub fn panel(&self, title: &str, text: &str, style: Style) {
        if self.quiet {
            return;
        }
        let width = crossterm::terminal::size()
            .map(|(cols, _)| cols as usize)
            .unwrap_or(80)
            .clamp(20, 120);
        println!("{}", self.paint(&render_panel(title, text, width), style));
    }

    pub fn print(&self, text: &str, style: Style) {
        if !self.quiet {
            println!("{}", self.paint(text, style));
        }
    }

    pub fn banner(&self) {
        if self.quiet {
            return;
        }
        println!("{}", self.paint(BANNER, Style::Message));
        self.print("AI Assistant for JUDI.jl", Style::Success);
        self.print("Type your prompt below, or type 'q' to quit.\n", Style::Normal);
    }

    fn paint(&self, text: &str, style: Style) -> String {
        match (self.color, style.color()) {
            (true, Some(color)) => text.with(color).to_string(),
            _ => text.to_string(),
        }
    }
}

/// Boxed panel with the title in the top border.
pub fn render_panel(title: &str, text: &str, width: usize) -> String {
    let head = format!("╭─ {title} ");
    let fill = width.saturating_sub(head.chars().count());
    let mut out = format!("{head}{}\n", "─".repeat(fill));
    for line in text.trim_end().lines() {
        out.push_str("│ ");
        out.push_str(line);
        out.push('\n');
    }
    out.push('╰');
    out.push_str(&"─".repeat(width.saturating_sub(1)));
    out
}
