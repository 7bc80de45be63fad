//! Command decoding and the dispatcher state machine.
//!
//! The dispatcher peeks the opcode at the head of the queue and only pops a
//! command once every byte of its fixed-size payload has arrived. At most one
//! move, delay or tool wait is in flight; a new command is decoded only after
//! the previous one has finished, within the same slice.

use std::fmt;
use std::sync::Arc;

use eyre::WrapErr;

use extruder_traits::{Clock, Motion, Point};

use crate::config::CommandsCfg;
use crate::error::{ProtocolFault, Result};
use crate::heater::HeaterZone;
use crate::hw_error::map_hw_error;
use crate::queue::CommandQueue;
use crate::timeout::Timeout;
use crate::util::{interval_elapsed, secs_to_ms};

pub const QUEUE_POINT_ABS: u8 = 129;
pub const SET_POSITION: u8 = 130;
pub const DELAY: u8 = 133;
pub const WAIT_FOR_TOOL: u8 = 135;

/// Longest encoded command.
pub const MAX_COMMAND_LEN: usize = 17;

/// Total encoded length (opcode included) of a recognised opcode.
pub fn command_len(opcode: u8) -> Option<usize> {
    match opcode {
        QUEUE_POINT_ABS => Some(17),
        SET_POSITION => Some(13),
        DELAY => Some(5),
        WAIT_FOR_TOOL => Some(6),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    QueuePointAbs { target: Point, step_rate: i32 },
    SetPosition(Point),
    Delay { micros: u32 },
    WaitForTool { tool: u8, ping_ms: u16, timeout_s: u16 },
}

impl Command {
    pub fn opcode(&self) -> u8 {
        match self {
            Command::QueuePointAbs { .. } => QUEUE_POINT_ABS,
            Command::SetPosition(_) => SET_POSITION,
            Command::Delay { .. } => DELAY,
            Command::WaitForTool { .. } => WAIT_FOR_TOOL,
        }
    }

    pub fn encoded_len(&self) -> usize {
        match self {
            Command::QueuePointAbs { .. } => 17,
            Command::SetPosition(_) => 13,
            Command::Delay { .. } => 5,
            Command::WaitForTool { .. } => 6,
        }
    }

    /// Little-endian wire encoding.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        out.push(self.opcode());
        match *self {
            Command::QueuePointAbs { target, step_rate } => {
                push_point(&mut out, target);
                out.extend_from_slice(&step_rate.to_le_bytes());
            }
            Command::SetPosition(p) => push_point(&mut out, p),
            Command::Delay { micros } => out.extend_from_slice(&micros.to_le_bytes()),
            Command::WaitForTool {
                tool,
                ping_ms,
                timeout_s,
            } => {
                out.push(tool);
                out.extend_from_slice(&ping_ms.to_le_bytes());
                out.extend_from_slice(&timeout_s.to_le_bytes());
            }
        }
        out
    }

    /// Parse a complete command from the front of `bytes`.
    fn parse(bytes: &[u8]) -> Option<Self> {
        let op = *bytes.first()?;
        let len = command_len(op)?;
        let b = bytes.get(..len)?;
        Some(match op {
            QUEUE_POINT_ABS => Command::QueuePointAbs {
                target: Point::new(le_i32(b, 1), le_i32(b, 5), le_i32(b, 9)),
                step_rate: le_i32(b, 13),
            },
            SET_POSITION => Command::SetPosition(Point::new(le_i32(b, 1), le_i32(b, 5), le_i32(b, 9))),
            DELAY => Command::Delay {
                micros: u32::from_le_bytes([b[1], b[2], b[3], b[4]]),
            },
            _ => Command::WaitForTool {
                tool: b[1],
                ping_ms: u16::from_le_bytes([b[2], b[3]]),
                timeout_s: u16::from_le_bytes([b[4], b[5]]),
            },
        })
    }
}

fn push_point(out: &mut Vec<u8>, p: Point) {
    out.extend_from_slice(&p.x.to_le_bytes());
    out.extend_from_slice(&p.y.to_le_bytes());
    out.extend_from_slice(&p.z.to_le_bytes());
}

fn le_i32(b: &[u8], at: usize) -> i32 {
    i32::from_le_bytes([b[at], b[at + 1], b[at + 2], b[at + 3]])
}

/// Result of looking at the head of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decode {
    Command(Command),
    Incomplete {
        opcode: u8,
        available: usize,
        required: usize,
    },
    Unknown(u8),
    Empty,
}

/// Decode the command at the head of `queue` without consuming anything.
pub fn decode(queue: &CommandQueue) -> Decode {
    let Some(opcode) = queue.peek(0) else {
        return Decode::Empty;
    };
    let Some(required) = command_len(opcode) else {
        return Decode::Unknown(opcode);
    };
    let mut buf = [0u8; MAX_COMMAND_LEN];
    if !queue.copy_prefix(&mut buf[..required]) {
        return Decode::Incomplete {
            opcode,
            available: queue.len(),
            required,
        };
    }
    match Command::parse(&buf[..required]) {
        Some(cmd) => Decode::Command(cmd),
        None => Decode::Unknown(opcode),
    }
}

/// Dispatcher mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Ready,
    Moving,
    Delay,
    WaitOnTool,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mode::Ready => "ready",
            Mode::Moving => "moving",
            Mode::Delay => "delay",
            Mode::WaitOnTool => "wait_on_tool",
        })
    }
}

/// What one dispatcher slice did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SliceOutcome {
    Paused,
    /// Still executing the previous command.
    Busy(Mode),
    /// Ready with nothing queued.
    Idle,
    Dispatched(Command),
    /// Head command has not fully arrived; nothing consumed.
    Incomplete {
        opcode: u8,
        available: usize,
        required: usize,
    },
    Rejected(ProtocolFault),
}

/// Tool readiness as seen by `WAIT_FOR_TOOL`.
pub trait ToolStatus {
    fn is_tool_ready(&self, tool: u8) -> bool;
}

impl<F: Fn(u8) -> bool> ToolStatus for F {
    fn is_tool_ready(&self, tool: u8) -> bool {
        self(tool)
    }
}

/// A tool is ready once its zone has reached target. Unknown tools never are.
impl ToolStatus for [HeaterZone] {
    fn is_tool_ready(&self, tool: u8) -> bool {
        self.iter()
            .find(|z| z.tool() == tool)
            .is_some_and(HeaterZone::has_reached_target)
    }
}

#[derive(Debug, Clone, Copy)]
struct ToolWait {
    tool: u8,
    ping_ms: u16,
    // armed with `Clock::millis` ticks
    deadline: Timeout,
    last_ping_ms: Option<u32>,
}

pub struct CommandDispatcher<M: Motion> {
    motion: M,
    queue: CommandQueue,
    mode: Mode,
    paused: bool,
    // armed with `Clock::micros` ticks
    delay: Timeout,
    tool_wait: Option<ToolWait>,
    fault: Option<ProtocolFault>,
    incomplete_since: Option<(u8, u32)>,
    stall_reported: bool,
    incomplete_timeout_ms: u32,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl<M: Motion> fmt::Debug for CommandDispatcher<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDispatcher")
            .field("mode", &self.mode)
            .field("paused", &self.paused)
            .field("queued", &self.queue.len())
            .field("fault", &self.fault)
            .finish()
    }
}

impl<M: Motion> CommandDispatcher<M> {
    pub fn new(motion: M, cfg: CommandsCfg, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        Self {
            motion,
            queue: CommandQueue::new(cfg.queue_capacity),
            mode: Mode::Ready,
            paused: false,
            delay: Timeout::new(),
            tool_wait: None,
            fault: None,
            incomplete_since: None,
            stall_reported: false,
            incomplete_timeout_ms: cfg.incomplete_timeout_ms,
            clock,
        }
    }

    /// One cooperative slice.
    pub fn run_slice<T: ToolStatus + ?Sized>(&mut self, tools: &T) -> Result<SliceOutcome> {
        if self.paused {
            return Ok(SliceOutcome::Paused);
        }

        if self.mode == Mode::Moving && !self.motion.is_running() {
            self.enter(Mode::Ready);
        }
        if self.mode == Mode::Delay && self.delay.has_elapsed(self.clock.micros()) {
            self.delay.clear();
            self.enter(Mode::Ready);
        }
        if self.mode == Mode::WaitOnTool && self.poll_tool(tools) {
            self.enter(Mode::Ready);
        }
        if self.mode != Mode::Ready {
            return Ok(SliceOutcome::Busy(self.mode));
        }

        match decode(&self.queue) {
            Decode::Empty => {
                self.incomplete_since = None;
                Ok(SliceOutcome::Idle)
            }
            Decode::Unknown(opcode) => {
                self.incomplete_since = None;
                self.queue.discard(1);
                let fault = ProtocolFault::UnknownOpcode(opcode);
                tracing::warn!(opcode, "unknown opcode discarded");
                self.latch(fault.clone());
                Ok(SliceOutcome::Rejected(fault))
            }
            Decode::Incomplete {
                opcode,
                available,
                required,
            } => Ok(self.watch_incomplete(opcode).map_or(
                SliceOutcome::Incomplete {
                    opcode,
                    available,
                    required,
                },
                SliceOutcome::Rejected,
            )),
            Decode::Command(cmd) => {
                self.incomplete_since = None;
                self.queue.discard(cmd.encoded_len());
                self.execute(cmd)?;
                Ok(SliceOutcome::Dispatched(cmd))
            }
        }
    }

    fn execute(&mut self, cmd: Command) -> Result<()> {
        tracing::debug!(?cmd, "dispatching");
        match cmd {
            Command::QueuePointAbs { target, step_rate } => {
                self.motion
                    .set_target(target, step_rate)
                    .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
                    .wrap_err("queueing move")?;
                self.enter(Mode::Moving);
            }
            Command::SetPosition(p) => {
                self.motion
                    .define_position(p)
                    .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
                    .wrap_err("defining position")?;
            }
            Command::Delay { micros } => {
                self.delay.start(self.clock.micros(), micros);
                self.enter(Mode::Delay);
            }
            Command::WaitForTool {
                tool,
                ping_ms,
                timeout_s,
            } => {
                let mut deadline = Timeout::new();
                deadline.start(self.clock.millis(), secs_to_ms(u32::from(timeout_s)));
                self.tool_wait = Some(ToolWait {
                    tool,
                    ping_ms,
                    deadline,
                    last_ping_ms: None,
                });
                self.enter(Mode::WaitOnTool);
            }
        }
        Ok(())
    }

    /// True when the tool wait is over, either ready or timed out.
    fn poll_tool<T: ToolStatus + ?Sized>(&mut self, tools: &T) -> bool {
        let Some(wait) = self.tool_wait.as_mut() else {
            return true;
        };
        let now = self.clock.millis();
        let due = wait
            .last_ping_ms
            .is_none_or(|last| interval_elapsed(now, last, u32::from(wait.ping_ms)));
        if due {
            wait.last_ping_ms = Some(now);
            if tools.is_tool_ready(wait.tool) {
                tracing::debug!(tool = wait.tool, "tool ready");
                self.tool_wait = None;
                return true;
            }
        }
        if wait.deadline.has_elapsed(now) {
            tracing::warn!(tool = wait.tool, "timed out waiting for tool");
            self.tool_wait = None;
            return true;
        }
        false
    }

    /// Track how long the head command has been incomplete. Returns the fault
    /// the first time the wait exceeds `incomplete_timeout_ms`.
    fn watch_incomplete(&mut self, opcode: u8) -> Option<ProtocolFault> {
        if self.incomplete_timeout_ms == 0 {
            return None;
        }
        let now = self.clock.millis();
        match self.incomplete_since {
            Some((op, since)) if op == opcode => {
                let waited_ms = now.wrapping_sub(since);
                if !self.stall_reported && waited_ms >= self.incomplete_timeout_ms {
                    self.stall_reported = true;
                    let fault = ProtocolFault::PayloadStalled { opcode, waited_ms };
                    tracing::warn!(opcode, waited_ms, "command payload stalled");
                    self.latch(fault.clone());
                    return Some(fault);
                }
                None
            }
            _ => {
                self.incomplete_since = Some((opcode, now));
                self.stall_reported = false;
                None
            }
        }
    }

    fn latch(&mut self, fault: ProtocolFault) {
        if self.fault.is_none() {
            self.fault = Some(fault);
        }
    }

    fn enter(&mut self, mode: Mode) {
        if self.mode != mode {
            tracing::debug!(from = %self.mode, to = %mode, "dispatcher mode");
            self.mode = mode;
        }
    }

    pub fn pause(&mut self, paused: bool) {
        if self.paused != paused {
            tracing::info!(paused, "command dispatch pause changed");
        }
        self.paused = paused;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Drop queued bytes, any in-flight delay or tool wait and the fault
    /// latch, and return to ready. A move already handed to the motion engine
    /// is not recalled.
    pub fn reset(&mut self) {
        self.queue.clear();
        self.delay.clear();
        self.tool_wait = None;
        self.fault = None;
        self.incomplete_since = None;
        self.stall_reported = false;
        self.enter(Mode::Ready);
    }

    /// Append transport bytes to the queue.
    pub fn enqueue(&mut self, bytes: &[u8]) -> Result<()> {
        self.queue.extend(bytes).map_err(eyre::Report::new)
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// First protocol fault since the last reset or `clear_fault`.
    pub fn fault(&self) -> Option<&ProtocolFault> {
        self.fault.as_ref()
    }

    pub fn clear_fault(&mut self) {
        self.fault = None;
    }

    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    pub fn queue_mut(&mut self) -> &mut CommandQueue {
        &mut self.queue
    }

    pub fn motion(&self) -> &M {
        &self.motion
    }

    pub fn motion_mut(&mut self) -> &mut M {
        &mut self.motion
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue_with(bytes: &[u8]) -> CommandQueue {
        let mut q = CommandQueue::new(64);
        q.extend(bytes).unwrap();
        q
    }

    #[test]
    fn decodes_each_opcode() {
        let cmds = [
            Command::QueuePointAbs {
                target: Point::new(1, -2, 3),
                step_rate: 400,
            },
            Command::SetPosition(Point::new(0, 0, -9)),
            Command::Delay { micros: 250_000 },
            Command::WaitForTool {
                tool: 1,
                ping_ms: 100,
                timeout_s: 60,
            },
        ];
        for cmd in cmds {
            let bytes = cmd.encode();
            assert_eq!(bytes.len(), command_len(cmd.opcode()).unwrap());
            assert_eq!(decode(&queue_with(&bytes)), Decode::Command(cmd));
        }
    }

    #[test]
    fn short_payload_is_incomplete() {
        let bytes = Command::Delay { micros: 5 }.encode();
        assert_eq!(
            decode(&queue_with(&bytes[..4])),
            Decode::Incomplete {
                opcode: DELAY,
                available: 4,
                required: 5
            }
        );
    }

    #[test]
    fn unknown_and_empty() {
        assert_eq!(decode(&queue_with(&[7, 1, 2])), Decode::Unknown(7));
        assert_eq!(decode(&CommandQueue::new(4)), Decode::Empty);
    }
}
