/*Measures the per-tick cost of the control algorithms and of encoding/decoding
the frames exchanged with the remote client. Both sit on the 10 ms loop budget. */
use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

use rts_control::control::algorithm::{ControlAlgorithm, clamp_actuation};
use rts_control::protocol::packet::{Frame, pack, unpack};

fn algorithm_update_bench(c: &mut Criterion) {
    let mut pid = ControlAlgorithm::pid(2.0, 0.5, 0.01);
    let mut velocity = ControlAlgorithm::velocity(ControlAlgorithm::pid(2.0, 0.5, 0.01));
    let mut measurement = 0.0;

    c.bench_function("pid_update_and_clamp", |b| {
        b.iter(|| {
            measurement += 0.1;
            let u = pid.update(black_box(measurement), black_box(100.0), 0.01);
            black_box(clamp_actuation(u));
        })
    });

    c.bench_function("velocity_pid_update", |b| {
        b.iter(|| {
            measurement += 0.1;
            black_box(velocity.update(black_box(measurement), black_box(5.0), 0.01));
        })
    });
}

fn packet_codec_bench(c: &mut Criterion) {
    let float = Frame::Float(2.5);
    let status = Frame::String("running=1 period=10.000ms echo=0 gain=100".into());
    let log = Frame::matrix(&vec![[0.0_f64; 7]; 6_000]);

    c.bench_function("pack_unpack_float", |b| {
        b.iter(|| {
            let bytes = pack(black_box(&float)).unwrap();
            black_box(unpack(&bytes).unwrap());
        })
    });

    c.bench_function("pack_unpack_status_string", |b| {
        b.iter(|| {
            let bytes = pack(black_box(&status)).unwrap();
            black_box(unpack(&bytes).unwrap());
        })
    });

    c.bench_function("pack_log_matrix_6000_rows", |b| {
        b.iter(|| black_box(pack(black_box(&log)).unwrap()))
    });
}

criterion_group!(benches, algorithm_update_bench, packet_codec_bench);
criterion_main!(benches);
