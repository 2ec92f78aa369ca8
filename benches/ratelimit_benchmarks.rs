use apiguard::config::AppConfig;
use apiguard::ratelimit::{derive_key, LocalWindowStore, Policy};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn benchmark_local_check_single_key(c: &mut Criterion) {
    let store = LocalWindowStore::new();
    let policy = Policy::new(1_000_000, 60);
    let mut now = 0u64;

    c.bench_function("local_check_single_key", |b| {
        b.iter(|| {
            now += 1;
            black_box(store.check("ratelimit:ask:deadbeefdeadbeef", policy, now))
        })
    });
}

fn benchmark_local_check_saturated_window(c: &mut Criterion) {
    let store = LocalWindowStore::new();
    let policy = Policy::new(100, 60);

    // Fill the window so every benched check takes the denial path.
    for _ in 0..100 {
        store.check("ratelimit:ask:deadbeefdeadbeef", policy, 1000);
    }

    c.bench_function("local_check_denied", |b| {
        b.iter(|| black_box(store.check("ratelimit:ask:deadbeefdeadbeef", policy, 1000)))
    });
}

fn benchmark_local_check_key_scale(c: &mut Criterion) {
    let mut group = c.benchmark_group("local_check_key_scale");

    for num_keys in [10, 1_000, 100_000] {
        let store = LocalWindowStore::new();
        let policy = Policy::new(100, 60);
        for i in 0..num_keys {
            store.check(&format!("ratelimit:users:{:016x}", i), policy, 1000);
        }

        group.bench_with_input(
            BenchmarkId::from_parameter(num_keys),
            &num_keys,
            |b, &_num| {
                b.iter(|| black_box(store.check("ratelimit:users:0000000000000042", policy, 1000)))
            },
        );
    }
    group.finish();
}

fn benchmark_key_derivation(c: &mut Criterion) {
    c.bench_function("derive_key", |b| {
        b.iter(|| black_box(derive_key("203.0.113.9", "ask")))
    });
}

fn benchmark_config_parsing(c: &mut Criterion) {
    let yaml = r#"
server:
  host: "0.0.0.0"
  port: 8080

redis:
  url: "redis://127.0.0.1:6379"
  command_timeout_ms: 50

rate_limits:
  global:
    limit: 1000
    window_secs: 3600
  default:
    limit: 60
    window_secs: 60
  endpoints:
    ask: { limit: 20, window_secs: 300 }
    users: { limit: 5, window_secs: 60 }
"#;

    c.bench_function("config_parsing", |b| {
        b.iter(|| black_box(AppConfig::from_yaml(yaml)))
    });
}

criterion_group!(
    benches,
    benchmark_local_check_single_key,
    benchmark_local_check_saturated_window,
    benchmark_local_check_key_scale,
    benchmark_key_derivation,
    benchmark_config_parsing
);
criterion_main!(benches);
