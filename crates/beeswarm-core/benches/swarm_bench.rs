use beeswarm_core::{SwarmConfig, SwarmController};
use beeswarm_field::EdgeMask;
use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use std::time::Duration;

const MASK_SIDE: u32 = 192;

/// Vertical stripes stand in for a contour-rich camera frame.
fn stripe_mask_data() -> Vec<u8> {
    let mut data = vec![0_u8; (MASK_SIDE * MASK_SIDE) as usize];
    for row in 0..MASK_SIDE {
        for col in 0..MASK_SIDE {
            if col % 12 == 0 {
                data[(row * MASK_SIDE + col) as usize] = 1;
            }
        }
    }
    data
}

fn bench_swarm_steps(c: &mut Criterion) {
    let mut group = c.benchmark_group("swarm_step");
    let samples: usize = std::env::var("BS_BENCH_SAMPLES")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(20);
    group.sample_size(samples);
    group.warm_up_time(Duration::from_secs(2));
    group.measurement_time(Duration::from_secs(8));

    let steps = 32;
    let data = stripe_mask_data();
    for &population in &[1_000_usize, 4_000, 8_000] {
        group.bench_function(format!("steps{steps}_bees{population}"), |b| {
            b.iter_batched(
                || {
                    let config = SwarmConfig {
                        extent_width: 1920,
                        extent_height: 1080,
                        stimulus_cell_size: 24,
                        population,
                        rng_seed: Some(0xBEE5),
                        history_capacity: 1,
                        ..SwarmConfig::default()
                    };
                    SwarmController::new(config).expect("controller")
                },
                |mut controller| {
                    let mask = EdgeMask::new(MASK_SIDE, MASK_SIDE, &data).expect("mask");
                    for _ in 0..steps {
                        controller.step(&mask, &[]);
                    }
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_swarm_steps);
criterion_main!(benches);
