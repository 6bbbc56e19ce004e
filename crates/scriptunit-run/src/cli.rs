use std::{io, path::PathBuf, process::ExitCode, sync::Arc};

use clap::Parser;
use crossbeam_channel::Receiver;
use scriptunit::{
    ChannelSink, Error, ExecutionState, HostFunction, LineNo, Script, ScriptUnit, TracingSink,
    UnitEvent, Value,
};
use scriptunit_lua::LuaEngine;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    config::Config,
    console::{self, Session},
};

const EXIT_ABORTED: u8 = 130;

#[derive(Parser, Debug)]
#[command(name = "scriptunit")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(after_help = "# Examples:\n\n\
    ## Run a script and print its state changes:\n\
    scriptunit blink.lua\n\n\
    ## Stop at lines 4 and 9, then type `c` to continue:\n\
    scriptunit -b 4 -b 9 blink.lua\n\n\
    ## Bind globals and print the returned value:\n\
    scriptunit -s pin=13 -s label=led --execute blink.lua\n\n\
    ## Print every line as it runs:\n\
    scriptunit --trace blink.lua")]
#[command(
    about = "Runs a Lua script under a controller with breakpoints, pause and abort.",
    long_about = None
)]
pub struct Cli {
    /// Script file to run
    #[arg(value_name = "SCRIPT")]
    script: PathBuf,

    /// Read configuration from this file instead of the configuration directory
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Run without the line probe: no breakpoints, no progress lines
    #[arg(long)]
    no_debug: bool,

    /// Set a breakpoint at the line
    #[arg(short = 'b', long = "breakpoint", value_name = "LINE")]
    breakpoints: Vec<LineNo>,

    /// Bind a global before the run; the value is read as a bool, integer, float or string
    #[arg(short = 's', long = "set", value_name = "NAME=VALUE", value_parser = parse_binding)]
    bindings: Vec<(String, Value)>,

    /// Add a directory to the module search path
    #[arg(short = 'L', long = "search-path", value_name = "DIR")]
    search_paths: Vec<PathBuf>,

    /// Print the value returned by the script
    #[arg(long)]
    execute: bool,

    /// Print each line number as the script reaches it
    #[arg(long)]
    trace: bool,

    /// Run without os, io and module loading
    #[arg(long)]
    sandbox: bool,

    /// Raise the log level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    pub fn run(self) -> miette::Result<ExitCode> {
        let mut config = Config::load(self.config.as_deref())?;
        config.apply_env();
        init_tracing(&config.log_level, self.verbose);

        let (unit, events) = self.build_unit(&config)?;
        let commands = console::read_commands();
        let mut session = Session::new(&unit, self.trace);

        let outcome = if self.execute {
            let handle = unit.execute()?;
            session.drive(&events, commands);
            handle.join().map(Some)
        } else {
            let handle = unit.run()?;
            session.drive(&events, commands);
            handle.join().map(|()| None)
        };

        match (outcome, unit.state()) {
            (Err(Error::Aborted), _) | (Ok(_), ExecutionState::Aborted) => {
                Ok(ExitCode::from(EXIT_ABORTED))
            }
            (Err(err), _) => Err(err.into()),
            (Ok(_), ExecutionState::Error) => match unit.last_error() {
                Some(err) => Err(Error::Runtime(err).into()),
                None => Ok(ExitCode::FAILURE),
            },
            (Ok(value), _) => {
                if let Some(value) = value {
                    println!("{}", value);
                }
                Ok(ExitCode::SUCCESS)
            }
        }
    }

    fn build_unit(
        &self,
        config: &Config,
    ) -> miette::Result<(ScriptUnit<LuaEngine>, Receiver<UnitEvent>)> {
        let script = Script::load(&self.script)?;
        let engine = if self.sandbox {
            LuaEngine::sandboxed()
        } else {
            LuaEngine::new()
        };
        let (sink, events) = ChannelSink::new();

        let mut builder = ScriptUnit::builder(engine, script)
            .debug(config.debug && !self.no_debug)
            .subscribe(Arc::new(sink))
            .subscribe(Arc::new(TracingSink))
            .global("print", print_function());

        for (name, value) in config.globals().into_iter().chain(self.bindings.iter().cloned()) {
            builder = builder.global(name, value);
        }
        for path in config.search_paths.iter().chain(&self.search_paths) {
            builder = builder.search_path(path.clone());
        }
        for line in config.breakpoints.iter().chain(&self.breakpoints) {
            builder = builder.breakpoint(*line);
        }

        Ok((builder.build()?, events))
    }
}

pub fn init_tracing(log_level: &str, verbose: u8) {
    let level = match verbose {
        0 => log_level,
        1 => "scriptunit=debug",
        _ => "scriptunit=trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(io::stderr))
        .try_init()
        .ok();
}

// Writes through the same stdout as the event lines so the two stay in order.
fn print_function() -> HostFunction {
    HostFunction::new("print", |args| {
        let fields: Vec<String> = args.iter().map(Value::to_string).collect();
        println!("{}", fields.join("\t"));
        Ok(Value::Nil)
    })
}

fn parse_binding(s: &str) -> Result<(String, Value), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got `{}`", s))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing name in `{}`", s));
    }
    Ok((name.to_string(), parse_scalar(value)))
}

fn parse_scalar(s: &str) -> Value {
    if let Ok(b) = s.parse::<bool>() {
        Value::Bool(b)
    } else if let Ok(n) = s.parse::<i64>() {
        Value::Integer(n)
    } else if let Some(n) = s
        .parse::<f64>()
        .ok()
        .filter(|_| s.chars().any(|c| c.is_ascii_digit()))
    {
        Value::Number(n)
    } else {
        Value::String(s.to_string())
    }
}
