#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse and validation errors are fine; panics are not.
    if let Ok(cfg) = extruder_config::load_toml(data) {
        if cfg.validate().is_ok() {
            // A validated config must also pass the builder's checks or fail cleanly.
            let store = extruder_core::mocks::MemoryStore::with_table(0, vec![(0, 300), (1023, 0)]);
            let clock = std::sync::Arc::new(extruder_traits::ManualClock::new());
            let _ = extruder_core::build_zones(&cfg, &store, clock);
        }
    }
});
