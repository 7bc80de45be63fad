use std::cell::Cell;
use std::sync::Arc;

use extruder_core::dispatcher::{DELAY, QUEUE_POINT_ABS, SET_POSITION};
use extruder_core::mocks::ScriptedMotion;
use extruder_core::{
    Command, CommandDispatcher, CommandsCfg, ControlError, Mode, ProtocolFault, SliceOutcome,
};
use extruder_traits::{ManualClock, Point};
use proptest::prelude::*;
use rstest::rstest;

fn dispatcher(clock: &ManualClock, polls_per_move: u32) -> CommandDispatcher<ScriptedMotion> {
    dispatcher_with(clock, polls_per_move, CommandsCfg::default())
}

fn dispatcher_with(
    clock: &ManualClock,
    polls_per_move: u32,
    cfg: CommandsCfg,
) -> CommandDispatcher<ScriptedMotion> {
    CommandDispatcher::new(
        ScriptedMotion::new(polls_per_move),
        cfg,
        Arc::new(clock.clone()),
    )
}

fn all_ready(_: u8) -> bool {
    true
}

fn mv(x: i32) -> Command {
    Command::QueuePointAbs {
        target: Point::new(x, 0, 0),
        step_rate: 1_000,
    }
}

#[test]
fn move_runs_until_motion_idle() {
    let clock = ManualClock::new();
    let mut d = dispatcher(&clock, 2);
    d.enqueue(&mv(10).encode()).unwrap();

    assert_eq!(d.run_slice(&all_ready).unwrap(), SliceOutcome::Dispatched(mv(10)));
    assert_eq!(d.mode(), Mode::Moving);
    assert_eq!(d.run_slice(&all_ready).unwrap(), SliceOutcome::Busy(Mode::Moving));
    assert_eq!(d.run_slice(&all_ready).unwrap(), SliceOutcome::Busy(Mode::Moving));
    assert_eq!(d.run_slice(&all_ready).unwrap(), SliceOutcome::Idle);
    assert_eq!(d.mode(), Mode::Ready);
    assert_eq!(d.motion().targets, vec![(Point::new(10, 0, 0), 1_000)]);
}

#[test]
fn next_move_starts_in_the_slice_the_previous_one_ends() {
    let clock = ManualClock::new();
    let mut d = dispatcher(&clock, 1);
    let mut bytes = mv(1).encode();
    bytes.extend(mv(2).encode());
    d.enqueue(&bytes).unwrap();

    assert_eq!(d.run_slice(&all_ready).unwrap(), SliceOutcome::Dispatched(mv(1)));
    assert_eq!(d.run_slice(&all_ready).unwrap(), SliceOutcome::Busy(Mode::Moving));
    assert_eq!(d.queue().len(), 17);
    assert_eq!(d.run_slice(&all_ready).unwrap(), SliceOutcome::Dispatched(mv(2)));
    assert!(d.queue().is_empty());
}

#[test]
fn partial_command_is_never_consumed() {
    let clock = ManualClock::new();
    let mut d = dispatcher(&clock, 0);
    let bytes = Command::Delay { micros: 10 }.encode();
    for (i, b) in bytes.iter().enumerate().take(4) {
        d.enqueue(&[*b]).unwrap();
        assert_eq!(
            d.run_slice(&all_ready).unwrap(),
            SliceOutcome::Incomplete {
                opcode: DELAY,
                available: i + 1,
                required: 5
            }
        );
        assert_eq!(d.queue().len(), i + 1);
    }
    d.enqueue(&bytes[4..]).unwrap();
    assert_eq!(
        d.run_slice(&all_ready).unwrap(),
        SliceOutcome::Dispatched(Command::Delay { micros: 10 })
    );
}

#[rstest]
fn partial_move_waits_for_its_full_payload(
    #[values(1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16)] prefix: usize,
) {
    let clock = ManualClock::new();
    let mut d = dispatcher(&clock, 1);
    let cmd = Command::QueuePointAbs {
        target: Point::new(100, 0, 0),
        step_rate: 500,
    };
    let bytes = cmd.encode();
    d.enqueue(&bytes[..prefix]).unwrap();

    for _ in 0..3 {
        assert_eq!(
            d.run_slice(&all_ready).unwrap(),
            SliceOutcome::Incomplete {
                opcode: QUEUE_POINT_ABS,
                available: prefix,
                required: 17
            }
        );
        assert_eq!(d.queue().len(), prefix);
        assert_eq!(d.mode(), Mode::Ready);
        assert!(d.motion().targets.is_empty());
    }

    d.enqueue(&bytes[prefix..]).unwrap();
    assert_eq!(d.run_slice(&all_ready).unwrap(), SliceOutcome::Dispatched(cmd));
    assert!(d.queue().is_empty());
    assert_eq!(d.mode(), Mode::Moving);
    assert_eq!(d.motion().targets, vec![(Point::new(100, 0, 0), 500)]);
}

#[test]
fn delay_holds_until_elapsed() {
    let clock = ManualClock::new();
    let mut d = dispatcher(&clock, 0);
    d.enqueue(&Command::Delay { micros: 1_000 }.encode()).unwrap();
    d.enqueue(&Command::SetPosition(Point::new(1, 2, 3)).encode())
        .unwrap();

    d.run_slice(&all_ready).unwrap();
    clock.advance_us(999);
    assert_eq!(d.run_slice(&all_ready).unwrap(), SliceOutcome::Busy(Mode::Delay));
    clock.advance_us(1);
    assert_eq!(
        d.run_slice(&all_ready).unwrap(),
        SliceOutcome::Dispatched(Command::SetPosition(Point::new(1, 2, 3)))
    );
}

#[test]
fn delay_across_micros_wrap() {
    let clock = ManualClock::starting_at_us(u64::from(u32::MAX) - 100);
    let mut d = dispatcher(&clock, 0);
    d.enqueue(&Command::Delay { micros: 500 }.encode()).unwrap();
    d.run_slice(&all_ready).unwrap();
    clock.advance_us(300);
    assert_eq!(d.run_slice(&all_ready).unwrap(), SliceOutcome::Busy(Mode::Delay));
    clock.advance_us(200);
    assert_eq!(d.run_slice(&all_ready).unwrap(), SliceOutcome::Idle);
}

#[test]
fn set_position_stays_ready() {
    let clock = ManualClock::new();
    let mut d = dispatcher(&clock, 0);
    let p = Point::new(-5, 6, 7);
    d.enqueue(&Command::SetPosition(p).encode()).unwrap();
    assert_eq!(
        d.run_slice(&all_ready).unwrap(),
        SliceOutcome::Dispatched(Command::SetPosition(p))
    );
    assert_eq!(d.mode(), Mode::Ready);
    assert_eq!(d.motion().positions, vec![p]);
}

#[test]
fn unknown_opcode_is_dropped_and_reported() {
    let clock = ManualClock::new();
    let mut d = dispatcher(&clock, 0);
    let p = Point::new(1, 1, 1);
    d.enqueue(&[7]).unwrap();
    d.enqueue(&Command::SetPosition(p).encode()).unwrap();

    assert_eq!(
        d.run_slice(&all_ready).unwrap(),
        SliceOutcome::Rejected(ProtocolFault::UnknownOpcode(7))
    );
    assert_eq!(d.queue().len(), 13);
    assert_eq!(d.fault(), Some(&ProtocolFault::UnknownOpcode(7)));
    assert_eq!(
        d.run_slice(&all_ready).unwrap(),
        SliceOutcome::Dispatched(Command::SetPosition(p))
    );
}

#[test]
fn pause_freezes_everything() {
    let clock = ManualClock::new();
    let mut d = dispatcher(&clock, 0);
    d.enqueue(&mv(3).encode()).unwrap();
    d.run_slice(&all_ready).unwrap();
    d.enqueue(&mv(4).encode()).unwrap();

    d.pause(true);
    assert!(d.is_paused());
    for _ in 0..3 {
        assert_eq!(d.run_slice(&all_ready).unwrap(), SliceOutcome::Paused);
    }
    // Motion finished long ago but the mode only moves on once resumed.
    assert_eq!(d.mode(), Mode::Moving);
    assert_eq!(d.queue().len(), 17);

    d.pause(false);
    assert_eq!(d.run_slice(&all_ready).unwrap(), SliceOutcome::Dispatched(mv(4)));
}

#[test]
fn tool_wait_polls_at_ping_interval() {
    let clock = ManualClock::new();
    let mut d = dispatcher(&clock, 0);
    let ready = Cell::new(false);
    let queries = Cell::new(0u32);
    let tools = |tool: u8| {
        assert_eq!(tool, 2);
        queries.set(queries.get() + 1);
        ready.get()
    };
    d.enqueue(
        &Command::WaitForTool {
            tool: 2,
            ping_ms: 100,
            timeout_s: 30,
        }
        .encode(),
    )
    .unwrap();

    assert!(matches!(d.run_slice(&tools).unwrap(), SliceOutcome::Dispatched(_)));
    assert_eq!(d.run_slice(&tools).unwrap(), SliceOutcome::Busy(Mode::WaitOnTool));
    assert_eq!(queries.get(), 1);

    ready.set(true);
    assert_eq!(d.run_slice(&tools).unwrap(), SliceOutcome::Busy(Mode::WaitOnTool));
    assert_eq!(queries.get(), 1);

    clock.advance_ms(100);
    assert_eq!(d.run_slice(&tools).unwrap(), SliceOutcome::Idle);
    assert_eq!(queries.get(), 2);
}

#[test]
fn tool_wait_times_out() {
    let clock = ManualClock::new();
    let mut d = dispatcher(&clock, 0);
    let never = |_: u8| false;
    d.enqueue(
        &Command::WaitForTool {
            tool: 0,
            ping_ms: 0,
            timeout_s: 1,
        }
        .encode(),
    )
    .unwrap();
    d.run_slice(&never).unwrap();
    clock.advance_ms(999);
    assert_eq!(d.run_slice(&never).unwrap(), SliceOutcome::Busy(Mode::WaitOnTool));
    clock.advance_ms(1);
    assert_eq!(d.run_slice(&never).unwrap(), SliceOutcome::Idle);
}

#[test]
fn incomplete_wait_for_tool_is_not_consumed() {
    let clock = ManualClock::new();
    let mut d = dispatcher(&clock, 0);
    let bytes = Command::WaitForTool {
        tool: 1,
        ping_ms: 10,
        timeout_s: 5,
    }
    .encode();
    d.enqueue(&bytes[..5]).unwrap();
    assert!(matches!(
        d.run_slice(&all_ready).unwrap(),
        SliceOutcome::Incomplete { required: 6, .. }
    ));
    assert_eq!(d.queue().len(), 5);
    assert_eq!(d.mode(), Mode::Ready);
}

#[test]
fn motion_error_drops_command() {
    let clock = ManualClock::new();
    let mut d = dispatcher(&clock, 3);
    d.motion_mut().fail_next = true;
    d.enqueue(&mv(9).encode()).unwrap();

    let err = d.run_slice(&all_ready).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ControlError>(),
        Some(ControlError::Hardware(_))
    ));
    assert_eq!(d.mode(), Mode::Ready);
    assert!(d.queue().is_empty());
    assert_eq!(d.run_slice(&all_ready).unwrap(), SliceOutcome::Idle);
}

#[test]
fn reset_clears_everything() {
    let clock = ManualClock::new();
    let mut d = dispatcher(&clock, 0);
    d.enqueue(&[200]).unwrap();
    d.run_slice(&all_ready).unwrap();
    d.enqueue(&Command::Delay { micros: 1_000_000 }.encode())
        .unwrap();
    d.run_slice(&all_ready).unwrap();
    d.enqueue(&[SET_POSITION, 1, 2]).unwrap();
    assert_eq!(d.mode(), Mode::Delay);

    d.reset();
    assert_eq!(d.mode(), Mode::Ready);
    assert!(d.queue().is_empty());
    assert!(d.fault().is_none());
    assert_eq!(d.run_slice(&all_ready).unwrap(), SliceOutcome::Idle);
}

#[test]
fn stalled_payload_is_reported_once() {
    let clock = ManualClock::new();
    let mut d = dispatcher_with(
        &clock,
        0,
        CommandsCfg {
            queue_capacity: 64,
            incomplete_timeout_ms: 50,
        },
    );
    d.enqueue(&[SET_POSITION, 0, 0]).unwrap();
    assert!(matches!(
        d.run_slice(&all_ready).unwrap(),
        SliceOutcome::Incomplete { .. }
    ));
    clock.advance_ms(50);
    assert_eq!(
        d.run_slice(&all_ready).unwrap(),
        SliceOutcome::Rejected(ProtocolFault::PayloadStalled {
            opcode: SET_POSITION,
            waited_ms: 50
        })
    );
    assert!(matches!(
        d.run_slice(&all_ready).unwrap(),
        SliceOutcome::Incomplete { .. }
    ));
    assert_eq!(d.queue().len(), 3);
}

#[test]
fn overflow_is_rejected() {
    let clock = ManualClock::new();
    let mut d = dispatcher_with(
        &clock,
        0,
        CommandsCfg {
            queue_capacity: 16,
            incomplete_timeout_ms: 0,
        },
    );
    let err = d.enqueue(&mv(1).encode()).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ProtocolFault>(),
        Some(ProtocolFault::QueueOverflow {
            capacity: 16,
            attempted: 17
        })
    ));
    assert!(d.queue().is_empty());
}

#[derive(Debug, Clone)]
enum Item {
    Cmd(Command),
    Junk(u8),
}

fn item_strategy() -> impl Strategy<Value = Item> {
    let point = (any::<i32>(), any::<i32>(), any::<i32>()).prop_map(|(x, y, z)| Point::new(x, y, z));
    prop_oneof![
        (point.clone(), any::<i32>())
            .prop_map(|(target, step_rate)| Item::Cmd(Command::QueuePointAbs { target, step_rate })),
        point.prop_map(|p| Item::Cmd(Command::SetPosition(p))),
        (0u32..1_000).prop_map(|micros| Item::Cmd(Command::Delay { micros })),
        (any::<u8>(), any::<u16>()).prop_map(|(tool, timeout_s)| Item::Cmd(Command::WaitForTool {
            tool,
            ping_ms: 0,
            timeout_s,
        })),
        any::<u8>()
            .prop_filter("not an opcode", |b| ![129, 130, 133, 135].contains(b))
            .prop_map(Item::Junk),
    ]
}

proptest! {
    #[test]
    fn chunked_stream_dispatches_in_order(
        items in proptest::collection::vec(item_strategy(), 0..30),
        chunk in 1usize..20,
    ) {
        let clock = ManualClock::new();
        let mut d = dispatcher(&clock, 1);
        let mut stream = Vec::new();
        for item in &items {
            match item {
                Item::Cmd(c) => stream.extend(c.encode()),
                Item::Junk(b) => stream.push(*b),
            }
        }

        let mut dispatched = Vec::new();
        let mut rejected = 0;
        let mut feed = stream.chunks(chunk);
        for _ in 0..10_000 {
            let before = d.queue().len();
            match d.run_slice(&all_ready).unwrap() {
                SliceOutcome::Dispatched(c) => dispatched.push(c),
                SliceOutcome::Rejected(_) => rejected += 1,
                SliceOutcome::Incomplete { .. } | SliceOutcome::Idle => {
                    prop_assert_eq!(d.queue().len(), before);
                    match feed.next() {
                        Some(bytes) => d.enqueue(bytes).unwrap(),
                        None => break,
                    }
                }
                SliceOutcome::Busy(_) => {}
                SliceOutcome::Paused => prop_assert!(false, "never paused"),
            }
            clock.advance_us(1_000);
        }

        let expected: Vec<Command> = items
            .iter()
            .filter_map(|i| match i {
                Item::Cmd(c) => Some(*c),
                Item::Junk(_) => None,
            })
            .collect();
        let junk = items.len() - expected.len();
        prop_assert_eq!(dispatched, expected);
        prop_assert_eq!(rejected, junk);
    }
}
