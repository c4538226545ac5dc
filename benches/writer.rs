use {
    criterion::{criterion_group, criterion_main, Bencher, Criterion},
    rt_snapshot::{
        synced::Synced,
        tags::{Nort, Safe},
        value::Versioned,
    },
    std::{
        hint::black_box,
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
        thread,
    },
};

fn with_reader_in_background<T: Send + Sync + 'static>(
    bencher: &mut Bencher,
    store: Arc<Versioned<T, true>>,
    mut publish: impl FnMut(&Versioned<T, true>),
) {
    let stop = Arc::new(AtomicBool::new(false));
    let reader = thread::spawn({
        let store = Arc::clone(&store);
        let stop = Arc::clone(&stop);
        move || loop {
            for _ in 0..1000 {
                black_box(store.read(Safe).is_empty());
            }
            if stop.load(Ordering::Relaxed) {
                break;
            }
        }
    });

    bencher.iter(|| publish(&store));

    stop.store(true, Ordering::Relaxed);
    reader.join().unwrap();
}

fn publish(bencher: &mut Bencher) {
    let store = Arc::new(Versioned::<u64, true>::default());
    with_reader_in_background(bencher, store, |store| store.set(Nort, 1));
}

fn publish_large_value(bencher: &mut Bencher) {
    let store = Arc::new(Versioned::<Vec<u64>, true>::new(vec![0; 4096]));
    with_reader_in_background(bencher, store, |store| {
        store.modify(Nort, |mut value| {
            value[0] += 1;
            value
        });
    });
}

fn synced_set_publish(bencher: &mut Bencher) {
    let synced = Arc::new(Synced::<u64>::default());

    let stop = Arc::new(AtomicBool::new(false));
    let reader = thread::spawn({
        let synced = Arc::clone(&synced);
        let stop = Arc::clone(&stop);
        move || loop {
            for _ in 0..1000 {
                black_box(*synced.read_published(Safe));
            }
            if stop.load(Ordering::Relaxed) {
                break;
            }
        }
    });

    bencher.iter(|| synced.set_publish(Nort, 1));

    stop.store(true, Ordering::Relaxed);
    reader.join().unwrap();
}

fn publisher_benchmark(c: &mut Criterion) {
    c.bench_function("publish", publish);
    c.bench_function("publish_large_value", publish_large_value);
    c.bench_function("synced_set_publish", synced_set_publish);
}

criterion_group!(benches, publisher_benchmark);
criterion_main!(benches);
