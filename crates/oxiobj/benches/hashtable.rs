// Hashtable benchmarks
//
// Compares the runtime's open-addressing table against ahash's HashMap for
// the two key shapes the runtime uses: interned names and addresses.

use ahash::AHashMap;
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use oxiobj::runtime::Hashtable;
use oxiobj::runtime::hashtable::{hash_ptr, hash_str};

fn names(count: usize) -> Vec<&'static str> {
    (0..count)
        .map(|i| -> &'static str { Box::leak(format!("selectorName{i}:with:").into_boxed_str()) })
        .collect()
}

fn name_table() -> Hashtable<&'static str, usize> {
    Hashtable::new(|name: &&'static str| hash_str(name), |a, b| a == b).unwrap()
}

fn addr_table() -> Hashtable<usize, usize> {
    Hashtable::new(|addr: &usize| hash_ptr(*addr), |a, b| a == b).unwrap()
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert_names");

    for count in [64usize, 1_024, 16_384] {
        let keys = names(count);

        group.bench_with_input(BenchmarkId::new("hashtable", count), &keys, |b, keys| {
            b.iter(|| {
                let mut table = name_table();
                for (value, key) in keys.iter().enumerate() {
                    table.set(*key, value);
                }
                black_box(table.len())
            })
        });

        group.bench_with_input(BenchmarkId::new("ahash", count), &keys, |b, keys| {
            b.iter(|| {
                let mut map = AHashMap::new();
                for (value, key) in keys.iter().enumerate() {
                    map.insert(*key, value);
                }
                black_box(map.len())
            })
        });
    }

    group.finish();
}

fn bench_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("lookup_names");
    let keys = names(1_024);

    let mut table = name_table();
    let mut map = AHashMap::new();
    for (value, key) in keys.iter().enumerate() {
        table.set(*key, value);
        map.insert(*key, value);
    }

    group.bench_function("hashtable", |b| {
        b.iter(|| {
            for key in &keys {
                black_box(table.get(key));
            }
        })
    });

    group.bench_function("hashtable_find_borrowed", |b| {
        let probe = String::from("selectorName512:with:");
        b.iter(|| black_box(table.find(hash_str(&probe), |key| *key == probe)))
    });

    group.bench_function("ahash", |b| {
        b.iter(|| {
            for key in &keys {
                black_box(map.get(key));
            }
        })
    });

    group.finish();
}

fn bench_address_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("address_churn");

    // Set then delete, the weak table's access pattern.
    group.bench_function("hashtable", |b| {
        let mut table = addr_table();
        let mut addr = 0x1000usize;
        b.iter(|| {
            addr += 16;
            table.set(addr, addr);
            black_box(table.delete(&addr));
        })
    });

    group.bench_function("ahash", |b| {
        let mut map = AHashMap::new();
        let mut addr = 0x1000usize;
        b.iter(|| {
            addr += 16;
            map.insert(addr, addr);
            black_box(map.remove(&addr));
        })
    });

    group.finish();
}

criterion_group!(benches, bench_insert, bench_lookup, bench_address_churn);
criterion_main!(benches);
