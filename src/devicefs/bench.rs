use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::Rng;
use std::sync::Arc;

// Reference the main crate
extern crate devicefs;

use devicefs::devicefs::{DeviceFs, MemoryDriver};
use devicefs::types::{DeviceType, HandleId, O_RDONLY, O_RDWR};

const FILE_COUNT: usize = 32;

// Build a filesystem with FILE_COUNT preloaded files, all backed by one memory driver
fn setup_fs() -> DeviceFs {
    let mut driver = MemoryDriver::new();
    for i in 0..FILE_COUNT {
        driver = driver.with_content(&format!("file{}", i), &[0u8; 64]);
    }

    let fs = DeviceFs::new();
    fs.register_driver(DeviceType::EepromFs, "mem", Arc::new(driver))
        .unwrap();
    for i in 0..FILE_COUNT {
        fs.register_file(&format!("file{}", i), DeviceType::EepromFs, "mem")
            .unwrap();
    }
    fs
}

// Open and close a random file
pub fn bench_open_close(c: &mut Criterion) {
    let fs = setup_fs();
    let names: Vec<String> = (0..FILE_COUNT).map(|i| format!("file{}", i)).collect();
    let mut rng = rand::thread_rng();

    c.bench_function("open_close", |b: &mut criterion::Bencher| {
        b.iter(|| {
            let name = &names[rng.gen_range(0..FILE_COUNT)];
            let h = fs.open(black_box(name), O_RDONLY, 0).unwrap();
            fs.close(h).unwrap();
        })
    });
}

// Dispatch reads and writes across many open handles
pub fn bench_handle_dispatch(c: &mut Criterion) {
    let fs = setup_fs();
    let handles: Vec<HandleId> = (0..FILE_COUNT)
        .map(|i| fs.open(&format!("file{}", i), O_RDWR, 0).unwrap())
        .collect();
    let mut rng = rand::thread_rng();

    let mut group = c.benchmark_group("HandleDispatch");

    group.bench_function("fstat", |b: &mut criterion::Bencher| {
        b.iter(|| {
            let h = handles[rng.gen_range(0..handles.len())];
            black_box(fs.fstat(h).unwrap());
        })
    });

    group.bench_function("write_8", |b: &mut criterion::Bencher| {
        b.iter(|| {
            let h = handles[rng.gen_range(0..handles.len())];
            black_box(fs.write(h, black_box(b"abcdefgh")).unwrap());
        })
    });

    group.bench_function("read_8", |b: &mut criterion::Bencher| {
        let mut buf = [0u8; 8];
        b.iter(|| {
            let h = handles[rng.gen_range(0..handles.len())];
            black_box(fs.read(h, &mut buf).unwrap());
        })
    });

    group.finish();
}

// Rename back and forth with a handle held open
pub fn bench_rename(c: &mut Criterion) {
    let fs = setup_fs();
    let _held = fs.open("file0", O_RDONLY, 0).unwrap();

    c.bench_function("rename_pair", |b: &mut criterion::Bencher| {
        b.iter(|| {
            fs.rename("file0", "moved").unwrap();
            fs.rename("moved", "file0").unwrap();
        })
    });
}

// Reads from several threads sharing one dispatch layer
pub fn bench_concurrent_reads(c: &mut Criterion) {
    let fs = setup_fs();
    let handles: Vec<HandleId> = (0..FILE_COUNT)
        .map(|i| fs.open(&format!("file{}", i), O_RDONLY, 0).unwrap())
        .collect();

    c.bench_function("concurrent_reads_4x100", |b: &mut criterion::Bencher| {
        b.iter(|| {
            std::thread::scope(|s| {
                for _ in 0..4 {
                    s.spawn(|| {
                        let mut rng = rand::thread_rng();
                        let mut buf = [0u8; 8];
                        for _ in 0..100 {
                            let h = handles[rng.gen_range(0..handles.len())];
                            black_box(fs.read(h, &mut buf).unwrap());
                        }
                    });
                }
            });
        })
    });
}

criterion_group!(
    benches,
    bench_open_close,
    bench_handle_dispatch,
    bench_rename,
    bench_concurrent_reads
);
criterion_main!(benches);
