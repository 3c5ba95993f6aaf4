//! Cost of the reader-side announcement calls in isolation, with no writer
//! contending for a grace period.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn bench_quiescent_state(c: &mut Criterion) {
    qsbr_rcu::register_thread();
    c.bench_function("quiescent_state", |b| {
        b.iter(|| black_box(qsbr_rcu::quiescent_state()));
    });
    qsbr_rcu::unregister_thread();
}

fn bench_read_lock_unlock(c: &mut Criterion) {
    qsbr_rcu::register_thread();
    c.bench_function("read_lock_unlock", |b| {
        b.iter(|| {
            qsbr_rcu::read_lock();
            black_box(());
            qsbr_rcu::read_unlock();
        });
    });
    qsbr_rcu::unregister_thread();
}

fn bench_read_ongoing(c: &mut Criterion) {
    qsbr_rcu::register_thread();
    c.bench_function("read_ongoing", |b| {
        b.iter(|| black_box(qsbr_rcu::read_ongoing()));
    });
    qsbr_rcu::unregister_thread();
}

criterion_group!(
    benches,
    bench_quiescent_state,
    bench_read_lock_unlock,
    bench_read_ongoing
);
criterion_main!(benches);
