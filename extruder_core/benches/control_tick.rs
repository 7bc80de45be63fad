use std::sync::Arc;

use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use extruder_core::mocks::FixedAnalog;
use extruder_core::{
    CommandQueue, ControlInput, ControlStrategy, PidCfg, PidControl, ThermistorChannel,
    ThermistorTable, decode,
};
use extruder_traits::Point;

fn table() -> ThermistorTable {
    ThermistorTable::try_from(&extruder_config::default_thermistor_table())
        .unwrap_or_else(|e| panic!("default table: {e}"))
}

pub fn bench_interpolate(c: &mut Criterion) {
    let t = table();
    c.bench_function("thermistor_interpolate_sweep", |b| {
        b.iter(|| {
            let mut acc = 0i32;
            for raw in 0..1024u16 {
                acc += i32::from(t.interpolate(black_box(raw)));
            }
            black_box(acc)
        })
    });
}

pub fn bench_channel_update(c: &mut Criterion) {
    let mut ch: ThermistorChannel = ThermistorChannel::new(0, table());
    let mut analog = FixedAnalog::new(500);
    c.bench_function("thermistor_channel_update", |b| {
        b.iter(|| black_box(ch.update(&mut analog).ok()))
    });
}

pub fn bench_pid(c: &mut Criterion) {
    c.bench_function("pid_compute_1k", |b| {
        b.iter_batched(
            || PidControl::new(PidCfg::default()),
            |mut pid| {
                let mut duty = 0u8;
                for i in 0..1_000i16 {
                    duty = pid.compute(ControlInput {
                        current: i % 250,
                        target: 210,
                        max: 231,
                    });
                }
                black_box(duty)
            },
            BatchSize::SmallInput,
        )
    });
}

pub fn bench_decode(c: &mut Criterion) {
    let mut q = CommandQueue::new(64);
    let bytes = extruder_core::Command::QueuePointAbs {
        target: Point::new(1, 2, 3),
        step_rate: 100,
    }
    .encode();
    q.extend(&bytes).unwrap_or_else(|e| panic!("{e}"));
    c.bench_function("decode_queue_point", |b| b.iter(|| black_box(decode(&q))));
}

criterion_group!(
    benches,
    bench_interpolate,
    bench_channel_update,
    bench_pid,
    bench_decode
);
criterion_main!(benches);
