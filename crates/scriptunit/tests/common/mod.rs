#![allow(dead_code)]
//! A deterministic line-oriented engine for exercising the controller.
//!
//! Every non-blank source line is one instruction, and the probe is called
//! before each instruction runs:
//!
//! | instruction     | effect                                                   |
//! |-----------------|----------------------------------------------------------|
//! | `nop`           | nothing                                                  |
//! | `probe N`       | reports this statement to the probe N times              |
//! | `loop L N`      | jumps back to line L, N times; L may be its own line     |
//! | `forever L`     | always jumps back to line L                              |
//! | `fail MSG`      | raises a runtime error                                   |
//! | `return [V]`    | returns V (integer or string), or the accumulator        |
//! | `get NAME`      | loads a binding into the accumulator                     |
//! | `call NAME N`   | calls a host function binding with N                     |
//! | `allow_break`   | script-side soft break checkpoint                        |
//! | `debug_break`   | breaks at the next statement                             |
//! | `sleep MS`      | sleeps through the control handle                        |
//! | `swallow`       | ignores the next abort from the probe once               |
//! | `panic`         | panics on the worker                                     |
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use crossbeam_channel::Receiver;
use scriptunit::{
    CompileError, EventSink, ExecContext, ExecError, ExecutionState, LineNo, ProgressEvent, Script,
    ScriptEngine, ScriptError, ScriptUnit, StateEvent, UnitEvent, Value, Visit,
};

pub const TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    Nop,
    Probe(usize),
    Loop(LineNo, usize),
    Forever(LineNo),
    Fail(String),
    Return(Option<Value>),
    Get(String),
    Call(String, i64),
    AllowBreak,
    DebugBreak,
    Sleep(u64),
    Swallow,
    Panic,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StepEngine;

#[derive(Debug)]
pub struct Program {
    steps: Vec<(LineNo, Instr)>,
}

impl ScriptEngine for StepEngine {
    type Unit = Program;

    fn compile(&self, script: &Script) -> Result<Program, CompileError> {
        let mut steps = Vec::new();
        for (index, text) in script.source().lines().enumerate() {
            let line = index as LineNo + 1;
            let text = text.trim();
            if text.is_empty() {
                continue;
            }
            let instr = parse(text).ok_or_else(|| CompileError {
                script: script.name().to_string(),
                message: format!("unknown instruction `{}`", text),
                line: Some(line),
            })?;
            steps.push((line, instr));
        }
        Ok(Program { steps })
    }

    fn execute(&self, program: &Program, context: ExecContext) -> Result<Value, ExecError> {
        let bindings: HashMap<String, Value> = context.bindings.iter().cloned().collect();
        let mut loops: HashMap<usize, usize> = HashMap::new();
        let mut acc = Value::Nil;
        let mut swallow = false;
        let mut pc = 0;

        let probe = |line: LineNo, visit: Visit, swallow: &mut bool| -> Result<(), ExecError> {
            if context.on_line(line, visit).is_abort() {
                if *swallow {
                    *swallow = false;
                } else {
                    return Err(ExecError::Aborted);
                }
            }
            Ok(())
        };

        while let Some((line, instr)) = program.steps.get(pc) {
            let line = *line;
            probe(line, Visit::New, &mut swallow)?;
            pc += 1;

            match instr {
                Instr::Nop => {}
                Instr::Probe(n) => {
                    for _ in 1..*n {
                        probe(line, Visit::Same, &mut swallow)?;
                    }
                }
                Instr::Loop(target, n) => {
                    let remaining = loops.entry(pc).or_insert(*n);
                    if *remaining > 0 {
                        *remaining -= 1;
                        pc = index_of(program, *target);
                    } else {
                        loops.remove(&pc);
                    }
                }
                Instr::Forever(target) => pc = index_of(program, *target),
                Instr::Fail(message) => return Err(ScriptError::new(message.clone()).at_line(line).into()),
                Instr::Return(value) => return Ok(value.clone().unwrap_or(acc)),
                Instr::Get(name) => acc = bindings.get(name).cloned().unwrap_or_default(),
                Instr::Call(name, arg) => match bindings.get(name) {
                    Some(Value::Function(func)) => {
                        acc = func
                            .call(vec![Value::Integer(*arg)])
                            .map_err(|message| ScriptError::new(message).at_line(line))?;
                    }
                    _ => return Err(ScriptError::new(format!("`{}` is not callable", name)).at_line(line).into()),
                },
                Instr::AllowBreak => {
                    if context.control.allow_break().is_abort() {
                        return Err(ExecError::Aborted);
                    }
                }
                Instr::DebugBreak => context.control.request_break_now(),
                Instr::Sleep(ms) => {
                    if context.control.sleep(Duration::from_millis(*ms)).is_abort() {
                        return Err(ExecError::Aborted);
                    }
                }
                Instr::Swallow => swallow = true,
                Instr::Panic => panic!("engine panicked on line {}", line),
            }
        }

        Ok(acc)
    }
}

fn index_of(program: &Program, line: LineNo) -> usize {
    program
        .steps
        .iter()
        .position(|(l, _)| *l == line)
        .unwrap_or(program.steps.len())
}

fn parse(text: &str) -> Option<Instr> {
    let mut words = text.split_whitespace();
    let op = words.next()?;
    let instr = match op {
        "nop" => Instr::Nop,
        "probe" => Instr::Probe(words.next()?.parse().ok()?),
        "loop" => Instr::Loop(words.next()?.parse().ok()?, words.next()?.parse().ok()?),
        "forever" => Instr::Forever(words.next()?.parse().ok()?),
        "fail" => Instr::Fail(words.collect::<Vec<_>>().join(" ")),
        "return" => Instr::Return(words.next().map(|v| match v.parse::<i64>() {
            Ok(n) => Value::Integer(n),
            Err(_) => Value::from(v),
        })),
        "get" => Instr::Get(words.next()?.to_string()),
        "call" => Instr::Call(words.next()?.to_string(), words.next()?.parse().ok()?),
        "allow_break" => Instr::AllowBreak,
        "debug_break" => Instr::DebugBreak,
        "sleep" => Instr::Sleep(words.next()?.parse().ok()?),
        "swallow" => Instr::Swallow,
        "panic" => Instr::Panic,
        _ => return None,
    };
    Some(instr)
}

/// Records every event it receives.
#[derive(Debug, Default)]
pub struct Recorder {
    states: Mutex<Vec<StateEvent>>,
    lines: Mutex<Vec<LineNo>>,
}

impl Recorder {
    pub fn states(&self) -> Vec<ExecutionState> {
        self.states.lock().unwrap().iter().map(|event| event.state).collect()
    }

    pub fn state_events(&self) -> Vec<StateEvent> {
        self.states.lock().unwrap().clone()
    }

    pub fn lines(&self) -> Vec<LineNo> {
        self.lines.lock().unwrap().clone()
    }
}

impl EventSink for Recorder {
    fn on_state(&self, event: &StateEvent) {
        self.states.lock().unwrap().push(event.clone());
    }

    fn on_progress(&self, event: &ProgressEvent) {
        self.lines.lock().unwrap().push(event.line);
    }
}

/// Runs a callback on the worker whenever `state` is published.
pub struct OnState<F> {
    state: ExecutionState,
    callback: F,
}

impl<F: Fn() + Send + Sync> OnState<F> {
    pub fn new(state: ExecutionState, callback: F) -> Arc<Self> {
        Arc::new(Self { state, callback })
    }
}

impl<F: Fn() + Send + Sync> EventSink for OnState<F> {
    fn on_state(&self, event: &StateEvent) {
        if event.state == self.state {
            (self.callback)();
        }
    }
}

pub fn script(source: &str) -> Script {
    Script::from_source("steps", source)
}

/// Builds a debug-enabled unit with a recorder attached after construction.
pub fn unit(source: &str) -> (ScriptUnit<StepEngine>, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let unit = ScriptUnit::new(StepEngine, script(source)).unwrap();
    unit.subscribe(recorder.clone());
    (unit, recorder)
}

/// Receives events until `state` is published, panicking after [`TIMEOUT`].
pub fn wait_for(events: &Receiver<UnitEvent>, state: ExecutionState) -> StateEvent {
    loop {
        match events.recv_timeout(TIMEOUT) {
            Ok(UnitEvent::State(event)) if event.state == state => return event,
            Ok(_) => {}
            Err(err) => panic!("timed out waiting for {}: {}", state, err),
        }
    }
}
