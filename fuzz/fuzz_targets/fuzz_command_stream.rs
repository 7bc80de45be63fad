#![no_main]
use std::sync::Arc;

use extruder_core::config::CommandsCfg;
use extruder_core::mocks::ScriptedMotion;
use extruder_core::{CommandDispatcher, SliceOutcome};
use extruder_traits::ManualClock;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // First byte picks the chunk size the stream arrives in.
    let Some((&chunk, stream)) = data.split_first() else {
        return;
    };
    let chunk = usize::from(chunk % 32) + 1;

    let clock = ManualClock::new();
    let cfg = CommandsCfg {
        queue_capacity: 64,
        incomplete_timeout_ms: 50,
    };
    let mut d = CommandDispatcher::new(ScriptedMotion::new(2), cfg, Arc::new(clock.clone()));
    let tools = |tool: u8| tool % 2 == 0;

    let mut fed = 0;
    for _ in 0..4 * stream.len() + 64 {
        let n = d.queue().remaining().min(chunk).min(stream.len() - fed);
        if n > 0 {
            d.enqueue(&stream[fed..fed + n]).expect("sized to free space");
            fed += n;
        }
        match d.run_slice(&tools) {
            Ok(SliceOutcome::Rejected(_)) => d.clear_fault(),
            Ok(_) => {}
            Err(_) => break,
        }
        assert!(d.queue().len() <= 64);
        clock.advance_ms(10);
    }
});
