use std::{
    cmp::max,
    fmt,
    io::{self, BufRead},
    thread,
};

use colored::*;
use crossbeam_channel::{Receiver, select};
use scriptunit::{
    ExecutionState, LineNo, ProgressEvent, Script, ScriptEngine, ScriptUnit, StateEvent, UnitEvent,
};
use strum::IntoEnumIterator;

const CONTEXT_LINES: LineNo = 3;

#[derive(Debug, Clone, PartialEq, strum::EnumIter)]
pub enum Command {
    Abort,
    Break,
    Breakpoint(Option<LineNo>),
    Clear(Option<LineNo>),
    Continue,
    Error(String),
    Help,
    List,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Abort => write!(f, "abort"),
            Command::Break => write!(f, "break"),
            Command::Breakpoint(Some(line)) => write!(f, "breakpoint {}", line),
            Command::Breakpoint(None) => write!(f, "breakpoint"),
            Command::Clear(Some(line)) => write!(f, "clear {}", line),
            Command::Clear(None) => write!(f, "clear"),
            Command::Continue => write!(f, "continue"),
            Command::Error(e) => write!(f, "error {}", e),
            Command::Help => write!(f, "help"),
            Command::List => write!(f, "list"),
        }
    }
}

impl Command {
    pub fn help(&self) -> String {
        match self {
            Command::Abort => format!("{:<20}{}", "a[bort]", "Abort the run"),
            Command::Break => format!("{:<20}{}", "b[reak]", "Pause at the next line"),
            Command::Breakpoint(_) => format!(
                "{:<20}{}",
                "bp [line]", "Set a breakpoint at the line, or list breakpoints"
            ),
            Command::Clear(_) => format!(
                "{:<20}{}",
                "cl[ear] [line]", "Clear the breakpoint at the line, or all breakpoints"
            ),
            Command::Continue => format!("{:<20}{}", "c[ontinue]", "Continue execution"),
            Command::Error(_) => "".to_string(),
            Command::Help => format!("{:<20}{}", "h[elp]", "Print command help"),
            Command::List => format!("{:<20}{}", "l[ist]", "List source code around the current line"),
        }
    }
}

impl From<&str> for Command {
    fn from(s: &str) -> Self {
        match s.split_whitespace().collect::<Vec<&str>>().as_slice() {
            ["abort"] | ["a"] => Command::Abort,
            ["break"] | ["b"] => Command::Break,
            ["breakpoint", line] | ["bp", line] => {
                parse_line(line).map_or_else(Command::Error, |line| Command::Breakpoint(Some(line)))
            }
            ["breakpoint"] | ["bp"] => Command::Breakpoint(None),
            ["clear", line] | ["cl", line] => {
                parse_line(line).map_or_else(Command::Error, |line| Command::Clear(Some(line)))
            }
            ["clear"] | ["cl"] => Command::Clear(None),
            ["continue"] | ["c"] => Command::Continue,
            ["help"] | ["h"] => Command::Help,
            ["list"] | ["l"] => Command::List,
            _ => Command::Error(format!(
                "Unknown command: {}. Type 'help' for a list of commands",
                s.trim()
            )),
        }
    }
}

fn parse_line(s: &str) -> Result<LineNo, String> {
    match s.parse::<LineNo>() {
        Ok(line) if line > 0 => Ok(line),
        _ => Err(format!("Invalid line number: {}", s)),
    }
}

/// Reads stdin line by line on its own thread; the channel disconnects at end of file.
pub(crate) fn read_commands() -> Receiver<String> {
    let (tx, rx) = crossbeam_channel::unbounded();
    let spawned = thread::Builder::new()
        .name("scriptunit-stdin".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "failed to read stdin");
                        break;
                    }
                }
            }
        });

    if let Err(err) = spawned {
        tracing::warn!(error = %err, "commands from stdin are unavailable");
    }
    rx
}

/// Prints unit events and applies console commands until a run concludes.
pub(crate) struct Session<'a, E: ScriptEngine> {
    unit: &'a ScriptUnit<E>,
    trace: bool,
    paused: bool,
    // Cleared at end of input; breaks are then resumed without asking.
    interactive: bool,
}

impl<'a, E: ScriptEngine> Session<'a, E> {
    pub(crate) fn new(unit: &'a ScriptUnit<E>, trace: bool) -> Self {
        Self {
            unit,
            trace,
            paused: false,
            interactive: true,
        }
    }

    pub(crate) fn drive(&mut self, events: &Receiver<UnitEvent>, commands: Receiver<String>) {
        let mut commands = commands;

        loop {
            let mut end_of_input = false;

            select! {
                recv(events) -> event => match event {
                    Ok(UnitEvent::State(event)) => {
                        if self.on_state(&event) {
                            return;
                        }
                    }
                    Ok(UnitEvent::Progress(event)) => self.on_progress(&event),
                    Err(_) => return,
                },
                recv(commands) -> line => match line {
                    Ok(line) => self.on_input(&line),
                    Err(_) => end_of_input = true,
                },
            }

            if end_of_input {
                commands = crossbeam_channel::never();
                self.interactive = false;
                if self.paused {
                    self.unit.resume();
                }
            }
        }
    }

    /// Returns `true` once the run has concluded.
    fn on_state(&mut self, event: &StateEvent) -> bool {
        match &event.error {
            Some(err) => println!("[state] {}: {} ({})", event.unit, paint(event.state), err),
            None => println!("[state] {}: {}", event.unit, paint(event.state)),
        }

        match event.state {
            ExecutionState::Breaking => {
                self.paused = true;
                if let Some(line) = self.unit.current_line() {
                    print_source(self.unit.script(), line, 0);
                }
                if !self.interactive {
                    self.unit.resume();
                }
            }
            ExecutionState::Running => self.paused = false,
            _ => {}
        }

        event.state.is_terminal()
    }

    fn on_progress(&self, event: &ProgressEvent) {
        if self.trace {
            println!("[line] {}", event.line);
        }
    }

    fn on_input(&mut self, input: &str) {
        if input.trim().is_empty() {
            return;
        }

        match Command::from(input) {
            Command::Abort => self.unit.abort(),
            Command::Break => self.unit.break_now(),
            Command::Breakpoint(Some(line)) => {
                self.unit.set_breakpoint(line);
                println!("Breakpoint set at line {}", line);
            }
            Command::Breakpoint(None) => {
                let lines = self.unit.breakpoints();
                if lines.is_empty() {
                    println!("No breakpoints");
                } else {
                    let lines: Vec<String> = lines.iter().map(LineNo::to_string).collect();
                    println!("Breakpoints: {}", lines.join(", "));
                }
            }
            Command::Clear(Some(line)) => {
                if self.unit.clear_breakpoint(line) {
                    println!("Cleared breakpoint at line {}", line);
                } else {
                    println!("No breakpoint at line {}", line);
                }
            }
            Command::Clear(None) => {
                self.unit.clear_all_breakpoints();
                println!("Cleared all breakpoints");
            }
            Command::Continue => {
                if self.paused {
                    self.unit.resume();
                } else {
                    println!("Not paused");
                }
            }
            Command::Help => {
                let commands: Vec<String> = Command::iter()
                    .filter(|c| !matches!(c, Command::Error(_)))
                    .map(|c| c.help())
                    .collect();
                println!("{}", commands.join("\n"));
            }
            Command::List => match self.unit.current_line() {
                Some(line) => print_source(self.unit.script(), line, CONTEXT_LINES),
                None => println!("No line has run yet"),
            },
            Command::Error(message) => eprintln!("{}", message.red()),
        }
    }
}

fn paint(state: ExecutionState) -> ColoredString {
    let name = state.as_str();
    match state {
        ExecutionState::Done => name.green(),
        ExecutionState::Error => name.red().bold(),
        ExecutionState::Aborting | ExecutionState::Aborted => name.yellow(),
        ExecutionState::Breaking => name.cyan().bold(),
        _ => name.normal(),
    }
}

fn print_source(script: &Script, current: LineNo, context: LineNo) {
    let last = LineNo::try_from(script.line_count()).unwrap_or(LineNo::MAX);
    let start = max(current.saturating_sub(context), 1);
    let end = current.saturating_add(context).min(last);
    // Widened to leave room for the "=>" marker.
    let line_number_width = max(end.to_string().len() + 4, 7);

    let listing: Vec<String> = (start..=end)
        .filter_map(|n| script.line(n).map(|text| (n, text)))
        .map(|(n, text)| {
            if n == current {
                format!(
                    "=>{:>line_number_width$}| {}",
                    n.to_string().yellow().bold(),
                    text.yellow().bold(),
                    line_number_width = line_number_width - 2
                )
            } else {
                format!("{:>line_number_width$}| {}", n.to_string().blue(), text)
            }
        })
        .collect();

    if !listing.is_empty() {
        println!("{}", listing.join("\n"));
    }
}
