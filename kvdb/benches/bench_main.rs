use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use kvdb::{Database, SetOptions};
use rand::Rng;

fn populated(n: usize) -> Database {
    let db = Database::open_memory();
    db.update(|tx| {
        for i in 0..n {
            tx.set(format!("key:{i:08}").as_bytes(), b"some modestly sized value", SetOptions::none())?;
        }
        Ok(())
    })
    .unwrap();
    db
}

fn bench_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("set");
    for n in [1usize, 8, 64] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            let db = Database::open_memory();
            let mut i = 0usize;
            b.iter(|| {
                db.update(|tx| {
                    for _ in 0..n {
                        tx.set(format!("key:{i:08}").as_bytes(), b"value", SetOptions::none())?;
                        i += 1;
                    }
                    Ok(())
                })
                .unwrap();
            });
        });
    }
    group.finish();
}

fn bench_get(c: &mut Criterion) {
    let db = populated(10_000);
    let mut rng = rand::thread_rng();
    c.bench_function("get random key of 10k", |b| {
        b.iter(|| {
            let i = rng.gen_range(0..10_000);
            let _ = db.view(|tx| tx.get(format!("key:{i:08}").as_bytes()).map(|_| ()));
        })
    });
}

fn bench_ascend(c: &mut Criterion) {
    let db = populated(10_000);
    c.bench_function("ascend all of 10k", |b| {
        b.iter(|| {
            db.view(|tx| {
                let mut count = 0usize;
                tx.ascend(|_item| {
                    count += 1;
                    true
                })?;
                Ok(count)
            })
            .unwrap();
        })
    });
}

criterion_group!(benches, bench_set, bench_get, bench_ascend);
criterion_main!(benches);
