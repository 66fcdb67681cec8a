// DeviceFS dispatch tests

use super::*;
use crate::config::{ClosePolicy, DeviceFsConfig, ReferencePolicy};
use crate::types::{MAX_FILENAME_LEN, O_RDONLY, O_RDWR};
use std::collections::HashSet;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::thread;

fn memory_fs() -> (DeviceFs, Arc<MemoryDriver>) {
    let fs = DeviceFs::new();
    let driver = Arc::new(MemoryDriver::new());
    fs.register_driver(DeviceType::EepromFs, "mem", driver.clone())
        .unwrap();
    (fs, driver)
}

fn fs_with_policy(reference_policy: ReferencePolicy, close_policy: ClosePolicy) -> DeviceFs {
    DeviceFs::with_config(DeviceFsConfig {
        first_handle: 0,
        close_policy,
        reference_policy,
    })
}

/// Driver table that tags every read with a marker byte and counts closes
fn tagged_table(tag: u8, closes: Arc<AtomicUsize>) -> DriverTable {
    DriverTable::new()
        .with_open(|_name, _flags, _mode| Ok(0))
        .with_read(move |_fd, buf| {
            buf[0] = tag;
            Ok(1)
        })
        .with_close(move |_fd| {
            closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
}

#[test]
fn test_duplicate_driver_registration() {
    let fs = DeviceFs::new();
    fs.register_driver(DeviceType::Pin, "gpio", Arc::new(DriverTable::new()))
        .unwrap();

    let result = fs.register_driver(DeviceType::Pin, "gpio", Arc::new(MemoryDriver::new()));
    assert!(matches!(
        result,
        Err(DeviceFsError::DriverAlreadyRegistered { .. })
    ));
    assert_eq!(result.unwrap_err().status(), DeviceFsStatus::DriverAlreadyRegistered);

    let keys = fs.list_drivers();
    assert_eq!(keys, vec![DriverKey::new(DeviceType::Pin, "gpio")]);
}

#[test]
fn test_register_file_requires_driver() {
    let fs = DeviceFs::new();

    let result = fs.register_file("pinA", DeviceType::Pin, "gpio");
    assert!(matches!(result, Err(DeviceFsError::NoMatchingDriver { .. })));
    assert!(fs.list_files().is_empty());

    fs.register_driver(DeviceType::Pin, "gpio", Arc::new(MemoryDriver::character_device()))
        .unwrap();
    fs.register_file("pinA", DeviceType::Pin, "gpio").unwrap();

    let info = fs.file_info("pinA").unwrap();
    assert_eq!(info.device_type, DeviceType::Pin);
    assert_eq!(info.subtype, "gpio");
    assert!(info.open_handles.is_empty());
}

#[test]
fn test_register_file_duplicate_name() {
    let (fs, _) = memory_fs();
    fs.register_file("a.bin", DeviceType::EepromFs, "mem").unwrap();

    let result = fs.register_file("a.bin", DeviceType::EepromFs, "mem");
    assert!(matches!(result, Err(DeviceFsError::FilenameAlreadyExists(_))));
    assert_eq!(fs.list_files().len(), 1);
}

#[test]
fn test_open_missing_file() {
    let (fs, _) = memory_fs();
    let result = fs.open("missing.txt", O_RDONLY, 0);
    assert!(matches!(result, Err(DeviceFsError::FileNotFound(_))));
    assert_eq!(result.unwrap_err().raw_code(), -2);
}

#[test]
fn test_two_opens_give_distinct_handles() {
    let (fs, _) = memory_fs();
    fs.register_file("a.bin", DeviceType::EepromFs, "mem").unwrap();

    let h1 = fs.open("a.bin", O_RDWR, 0).unwrap();
    let h2 = fs.open("a.bin", O_RDWR, 0).unwrap();
    assert_ne!(h1, h2);

    let info = fs.file_info("a.bin").unwrap();
    assert!(info.open_handles.contains(&h1));
    assert!(info.open_handles.contains(&h2));
    assert_eq!(fs.handle_filename(h1).unwrap(), "a.bin");
    assert_eq!(fs.handle_filename(h2).unwrap(), "a.bin");
    assert_eq!(fs.open_handle_count(), 2);
}

#[test]
fn test_close_removes_handle_once() {
    let (fs, driver) = memory_fs();
    fs.register_file("a.bin", DeviceType::EepromFs, "mem").unwrap();

    let h = fs.open("a.bin", O_RDWR, 0).unwrap();
    fs.close(h).unwrap();

    assert!(fs.file_info("a.bin").unwrap().open_handles.is_empty());
    assert!(matches!(
        fs.handle_filename(h),
        Err(DeviceFsError::InvalidFileHandle(_))
    ));
    assert_eq!(driver.open_count(), 0);

    let result = fs.close(h);
    assert!(matches!(result, Err(DeviceFsError::InvalidFileHandle(id)) if id == h));
}

#[test]
fn test_read_write_through_handle() {
    let (fs, driver) = memory_fs();
    fs.register_file("log.txt", DeviceType::EepromFs, "mem").unwrap();

    let h = fs.open("log.txt", O_RDWR, 0).unwrap();
    assert_eq!(fs.write(h, b"hello").unwrap(), 5);
    assert_eq!(fs.fstat(h).unwrap().size, 5);
    fs.close(h).unwrap();

    let h = fs.open("log.txt", O_RDONLY, 0).unwrap();
    let mut buf = [0u8; 8];
    let n = fs.read(h, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"hello");
    assert_eq!(driver.content("log.txt").unwrap(), b"hello");
}

#[test]
fn test_rename_keeps_open_handles() {
    let (fs, driver) = memory_fs();
    fs.register_file("a.bin", DeviceType::EepromFs, "mem").unwrap();

    let h = fs.open("a.bin", O_RDWR, 0).unwrap();
    fs.write(h, b"abc").unwrap();

    fs.rename("a.bin", "b.bin").unwrap();

    // Same handle, same driver, new name
    let calls_before = driver.call_count();
    assert_eq!(fs.write(h, b"d").unwrap(), 1);
    assert_eq!(driver.call_count(), calls_before + 1);
    assert_eq!(fs.handle_filename(h).unwrap(), "b.bin");

    let info = fs.file_info("b.bin").unwrap();
    assert_eq!(info.device_type, DeviceType::EepromFs);
    assert_eq!(info.subtype, "mem");
    assert_eq!(info.open_handles, vec![h]);

    assert!(matches!(
        fs.open("a.bin", O_RDONLY, 0),
        Err(DeviceFsError::FileNotFound(_))
    ));
    let h2 = fs.open("b.bin", O_RDONLY, 0).unwrap();
    let mut buf = [0u8; 8];
    let n = fs.read(h2, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"abcd");
}

#[test]
fn test_rename_onto_existing_file() {
    let (fs, driver) = memory_fs();
    fs.register_file("a.bin", DeviceType::EepromFs, "mem").unwrap();
    fs.register_file("b.bin", DeviceType::EepromFs, "mem").unwrap();
    let h = fs.open("a.bin", O_RDWR, 0).unwrap();
    let calls_before = driver.call_count();

    let result = fs.rename("a.bin", "b.bin");
    assert!(matches!(result, Err(DeviceFsError::FilenameAlreadyExists(_))));

    // Driver never asked, both records untouched
    assert_eq!(driver.call_count(), calls_before);
    assert_eq!(fs.file_info("a.bin").unwrap().open_handles, vec![h]);
    assert!(fs.file_info("b.bin").unwrap().open_handles.is_empty());
}

#[test]
fn test_rename_missing_source() {
    let (fs, _) = memory_fs();
    let result = fs.rename("nope", "other");
    assert!(matches!(result, Err(DeviceFsError::FileNotFound(_))));
}

#[test]
fn test_rename_failure_keeps_old_key() {
    let fs = DeviceFs::new();
    let table = DriverTable::new().with_rename(|_src, _dst| Err(DriverFault::errno(libc::EROFS)));
    fs.register_driver(DeviceType::Rtc, "ds3231", Arc::new(table))
        .unwrap();
    fs.register_file("clock", DeviceType::Rtc, "ds3231").unwrap();

    let result = fs.rename("clock", "time");
    assert_eq!(result, Err(DeviceFsError::Downstream(-libc::EROFS)));
    assert!(fs.file_info("clock").is_ok());
    assert!(fs.file_info("time").is_err());
}

#[test]
fn test_reregister_driver_with_new_table() {
    let fs = DeviceFs::new();
    let closes = Arc::new(AtomicUsize::new(0));
    fs.register_driver(DeviceType::Pin, "gpio", Arc::new(tagged_table(b'1', closes.clone())))
        .unwrap();
    fs.register_file("pinA", DeviceType::Pin, "gpio").unwrap();

    fs.unregister_driver(DeviceType::Pin, "gpio").unwrap();
    assert!(matches!(
        fs.open("pinA", O_RDONLY, 0),
        Err(DeviceFsError::NoMatchingDriver { .. })
    ));

    fs.register_driver(DeviceType::Pin, "gpio", Arc::new(tagged_table(b'2', closes.clone())))
        .unwrap();
    let h = fs.open("pinA", O_RDONLY, 0).unwrap();
    let mut buf = [0u8; 1];
    fs.read(h, &mut buf).unwrap();
    assert_eq!(buf[0], b'2');
}

#[test]
fn test_unimplemented_operations() {
    let fs = DeviceFs::new();
    let table = DriverTable::new().with_open(|_name, _flags, _mode| Ok(7));
    fs.register_driver(DeviceType::Pin, "ro", Arc::new(table))
        .unwrap();
    fs.register_file("pinB", DeviceType::Pin, "ro").unwrap();

    let h = fs.open("pinB", O_RDONLY, 0).unwrap();
    assert_eq!(
        fs.write(h, b"1"),
        Err(DeviceFsError::DriverUnimplementedFunction(DriverOp::Write))
    );
    assert_eq!(
        fs.read(h, &mut [0u8; 1]),
        Err(DeviceFsError::DriverUnimplementedFunction(DriverOp::Read))
    );
    assert_eq!(
        fs.fstat(h),
        Err(DeviceFsError::DriverUnimplementedFunction(DriverOp::Fstat))
    );
    assert_eq!(
        fs.rename("pinB", "pinC"),
        Err(DeviceFsError::DriverUnimplementedFunction(DriverOp::Rename))
    );

    // No close entry: reported, but the handle is consumed
    assert_eq!(
        fs.close(h),
        Err(DeviceFsError::DriverUnimplementedFunction(DriverOp::Close))
    );
    assert!(matches!(fs.close(h), Err(DeviceFsError::InvalidFileHandle(_))));
}

#[test]
fn test_open_unimplemented_allocates_nothing() {
    let fs = DeviceFs::new();
    fs.register_driver(DeviceType::Rtc, "none", Arc::new(DriverTable::new()))
        .unwrap();
    fs.register_file("clock", DeviceType::Rtc, "none").unwrap();

    assert_eq!(
        fs.open("clock", O_RDONLY, 0),
        Err(DeviceFsError::DriverUnimplementedFunction(DriverOp::Open))
    );
    assert_eq!(fs.open_handle_count(), 0);
}

#[test]
fn test_downstream_codes_pass_through() {
    let fs = DeviceFs::new();
    let table = DriverTable::new()
        .with_open(|name, _flags, _mode| {
            if name == "busy" {
                Err(DriverFault::Code(-16))
            } else {
                Ok(0)
            }
        })
        .with_read(|_fd, _buf| Err(DriverFault::Code(-300)));
    fs.register_driver(DeviceType::SdcardFs, "spi", Arc::new(table))
        .unwrap();
    fs.register_file("busy", DeviceType::SdcardFs, "spi").unwrap();
    fs.register_file("data", DeviceType::SdcardFs, "spi").unwrap();

    let err = fs.open("busy", O_RDONLY, 0).unwrap_err();
    assert_eq!(err, DeviceFsError::Downstream(-16));
    assert_eq!(err.raw_code(), -16);
    assert_eq!(fs.open_handle_count(), 0);

    let h = fs.open("data", O_RDONLY, 0).unwrap();
    let err = fs.read(h, &mut [0u8; 4]).unwrap_err();
    assert_eq!(err.raw_code(), -300);
    assert_eq!(check_status(err.raw_code()), DeviceFsStatus::Downstream);
}

#[test]
fn test_invalid_handle_calls() {
    let (fs, _) = memory_fs();
    assert_eq!(fs.read(42, &mut [0u8; 1]), Err(DeviceFsError::InvalidFileHandle(42)));
    assert_eq!(fs.write(42, b"x"), Err(DeviceFsError::InvalidFileHandle(42)));
    assert_eq!(fs.fstat(42), Err(DeviceFsError::InvalidFileHandle(42)));
}

#[test]
fn test_names_over_bound_are_rejected() {
    let (fs, _) = memory_fs();
    let long_name = "f".repeat(MAX_FILENAME_LEN + 1);

    assert!(matches!(
        fs.register_file(&long_name, DeviceType::EepromFs, "mem"),
        Err(DeviceFsError::Invalid(_))
    ));
    assert!(matches!(
        fs.open(&long_name, O_RDONLY, 0),
        Err(DeviceFsError::Invalid(_))
    ));
    assert!(matches!(
        fs.register_driver(DeviceType::Pin, "a-very-long-subtype", Arc::new(DriverTable::new())),
        Err(DeviceFsError::Invalid(_))
    ));

    // Exactly at the bound is fine and no truncation happens
    let max_name = "f".repeat(MAX_FILENAME_LEN);
    fs.register_file(&max_name, DeviceType::EepromFs, "mem").unwrap();
    assert!(fs.open(&max_name, O_RDONLY, 0).is_ok());
}

#[test]
fn test_handles_never_reused() {
    let (fs, _) = memory_fs();
    fs.register_file("a", DeviceType::EepromFs, "mem").unwrap();
    fs.register_file("b", DeviceType::EepromFs, "mem").unwrap();

    let h1 = fs.open("a", O_RDONLY, 0).unwrap();
    fs.close(h1).unwrap();
    let h2 = fs.open("b", O_RDONLY, 0).unwrap();
    assert!(h2 > h1);

    // The stale handle must not alias the later file
    assert!(matches!(fs.read(h1, &mut [0u8; 1]), Err(DeviceFsError::InvalidFileHandle(_))));
}

#[test]
fn test_first_handle_from_config() {
    let fs = DeviceFs::with_config(DeviceFsConfig {
        first_handle: 3,
        ..DeviceFsConfig::default()
    });
    fs.register_driver(DeviceType::EepromFs, "mem", Arc::new(MemoryDriver::new()))
        .unwrap();
    fs.register_file("a", DeviceType::EepromFs, "mem").unwrap();
    assert_eq!(fs.open("a", O_RDONLY, 0).unwrap(), 3);
}

#[test]
fn test_handle_exhaustion_closes_driver_descriptor() {
    let fs = DeviceFs::with_config(DeviceFsConfig {
        first_handle: HandleId::MAX,
        ..DeviceFsConfig::default()
    });
    let driver = Arc::new(MemoryDriver::new());
    fs.register_driver(DeviceType::EepromFs, "mem", driver.clone())
        .unwrap();
    fs.register_file("a", DeviceType::EepromFs, "mem").unwrap();

    // The last id is still handed out
    assert_eq!(fs.open("a", O_RDONLY, 0).unwrap(), HandleId::MAX);
    assert!(matches!(
        fs.open("a", O_RDONLY, 0),
        Err(DeviceFsError::DriverError(_))
    ));
    assert_eq!(driver.open_count(), 1);
    assert_eq!(fs.open_handle_count(), 1);
}

#[test]
fn test_unregister_file_fails_while_open() {
    let fs = fs_with_policy(ReferencePolicy::FailWhileReferenced, ClosePolicy::ReleaseAlways);
    fs.register_driver(DeviceType::EepromFs, "mem", Arc::new(MemoryDriver::new()))
        .unwrap();
    fs.register_file("a", DeviceType::EepromFs, "mem").unwrap();
    let h = fs.open("a", O_RDONLY, 0).unwrap();

    let result = fs.unregister_file("a");
    assert!(matches!(result, Err(DeviceFsError::Invalid(_))));
    assert_eq!(fs.file_info("a").unwrap().open_handles, vec![h]);

    fs.close(h).unwrap();
    fs.unregister_file("a").unwrap();
    assert!(matches!(fs.file_info("a"), Err(DeviceFsError::FileNotFound(_))));
    assert!(matches!(fs.unregister_file("a"), Err(DeviceFsError::FileNotFound(_))));
}

#[test]
fn test_unregister_file_force_closes() {
    let fs = fs_with_policy(ReferencePolicy::ForceClose, ClosePolicy::ReleaseAlways);
    let driver = Arc::new(MemoryDriver::new());
    fs.register_driver(DeviceType::EepromFs, "mem", driver.clone())
        .unwrap();
    fs.register_file("a", DeviceType::EepromFs, "mem").unwrap();
    let h1 = fs.open("a", O_RDONLY, 0).unwrap();
    let h2 = fs.open("a", O_RDONLY, 0).unwrap();
    assert_eq!(driver.open_count(), 2);

    fs.unregister_file("a").unwrap();

    assert_eq!(driver.open_count(), 0);
    assert_eq!(fs.open_handle_count(), 0);
    assert!(matches!(fs.close(h1), Err(DeviceFsError::InvalidFileHandle(_))));
    assert!(matches!(fs.read(h2, &mut [0u8; 1]), Err(DeviceFsError::InvalidFileHandle(_))));
}

#[test]
fn test_unregister_driver_fails_while_open() {
    let fs = fs_with_policy(ReferencePolicy::FailWhileReferenced, ClosePolicy::ReleaseAlways);
    let closes = Arc::new(AtomicUsize::new(0));
    fs.register_driver(DeviceType::Pin, "gpio", Arc::new(tagged_table(b'1', closes.clone())))
        .unwrap();
    fs.register_file("pinA", DeviceType::Pin, "gpio").unwrap();
    let h = fs.open("pinA", O_RDONLY, 0).unwrap();

    let result = fs.unregister_driver(DeviceType::Pin, "gpio");
    assert!(matches!(result, Err(DeviceFsError::Invalid(_))));
    assert!(fs.get_driver(DeviceType::Pin, "gpio").is_ok());

    fs.close(h).unwrap();
    fs.unregister_driver(DeviceType::Pin, "gpio").unwrap();
    assert!(matches!(
        fs.get_driver(DeviceType::Pin, "gpio"),
        Err(DeviceFsError::NoMatchingDriver { .. })
    ));
    // The record itself survives driver removal
    assert!(fs.file_info("pinA").is_ok());
}

#[test]
fn test_unregister_driver_force_closes() {
    let fs = fs_with_policy(ReferencePolicy::ForceClose, ClosePolicy::ReleaseAlways);
    let closes = Arc::new(AtomicUsize::new(0));
    fs.register_driver(DeviceType::Pin, "gpio", Arc::new(tagged_table(b'1', closes.clone())))
        .unwrap();
    fs.register_file("pinA", DeviceType::Pin, "gpio").unwrap();
    fs.register_file("pinB", DeviceType::Pin, "gpio").unwrap();
    let ha = fs.open("pinA", O_RDONLY, 0).unwrap();
    let hb = fs.open("pinB", O_RDONLY, 0).unwrap();

    fs.unregister_driver(DeviceType::Pin, "gpio").unwrap();

    assert_eq!(closes.load(Ordering::SeqCst), 2);
    assert!(matches!(fs.read(ha, &mut [0u8; 1]), Err(DeviceFsError::InvalidFileHandle(_))));
    assert!(matches!(fs.read(hb, &mut [0u8; 1]), Err(DeviceFsError::InvalidFileHandle(_))));
    assert!(fs.file_info("pinA").unwrap().open_handles.is_empty());
}

#[test]
fn test_unregister_missing_driver() {
    let fs = DeviceFs::new();
    assert!(matches!(
        fs.unregister_driver(DeviceType::Rtc, "ds3231"),
        Err(DeviceFsError::NoMatchingDriver { .. })
    ));
}

#[test]
fn test_close_failure_release_always() {
    let fs = fs_with_policy(ReferencePolicy::FailWhileReferenced, ClosePolicy::ReleaseAlways);
    let table = DriverTable::new()
        .with_open(|_name, _flags, _mode| Ok(0))
        .with_close(|_fd| Err(DriverFault::errno(libc::EIO)));
    fs.register_driver(DeviceType::SdcardFs, "spi", Arc::new(table))
        .unwrap();
    fs.register_file("card", DeviceType::SdcardFs, "spi").unwrap();
    let h = fs.open("card", O_RDONLY, 0).unwrap();

    assert_eq!(fs.close(h), Err(DeviceFsError::Downstream(-libc::EIO)));
    assert_eq!(fs.open_handle_count(), 0);
    assert!(fs.file_info("card").unwrap().open_handles.is_empty());
    assert!(matches!(fs.close(h), Err(DeviceFsError::InvalidFileHandle(_))));
}

#[test]
fn test_close_failure_keep_on_failure() {
    let fs = fs_with_policy(ReferencePolicy::FailWhileReferenced, ClosePolicy::KeepOnFailure);
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    let table = DriverTable::new()
        .with_open(|_name, _flags, _mode| Ok(0))
        .with_close(move |_fd| {
            // First close fails, the retry succeeds
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(DriverFault::errno(libc::EAGAIN))
            } else {
                Ok(())
            }
        });
    fs.register_driver(DeviceType::SdcardFs, "spi", Arc::new(table))
        .unwrap();
    fs.register_file("card", DeviceType::SdcardFs, "spi").unwrap();
    let h = fs.open("card", O_RDONLY, 0).unwrap();

    assert_eq!(fs.close(h), Err(DeviceFsError::Downstream(-libc::EAGAIN)));
    assert_eq!(fs.file_info("card").unwrap().open_handles, vec![h]);

    fs.close(h).unwrap();
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(fs.open_handle_count(), 0);
}

#[test]
fn test_unregister_during_driver_open() {
    // The driver unregisters the file from inside its own open, which only
    // works because driver calls run without the table lock held.
    let fs = Arc::new(DeviceFs::new());
    let closes = Arc::new(AtomicUsize::new(0));
    let weak = Arc::downgrade(&fs);
    let close_counter = closes.clone();
    let table = DriverTable::new()
        .with_open(move |name, _flags, _mode| {
            if let Some(fs) = weak.upgrade() {
                fs.unregister_file(name).unwrap();
            }
            Ok(5)
        })
        .with_close(move |fd| {
            assert_eq!(fd, 5);
            close_counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
    fs.register_driver(DeviceType::Pin, "gpio", Arc::new(table))
        .unwrap();
    fs.register_file("pinA", DeviceType::Pin, "gpio").unwrap();

    let result = fs.open("pinA", O_RDONLY, 0);
    assert!(matches!(result, Err(DeviceFsError::FileNotFound(_))));
    assert_eq!(closes.load(Ordering::SeqCst), 1);
    assert_eq!(fs.open_handle_count(), 0);
}

#[test]
fn test_concurrent_open_read_close() {
    let fs = Arc::new(DeviceFs::new());
    let driver = Arc::new(MemoryDriver::new().with_content("shared", b"0123456789"));
    fs.register_driver(DeviceType::EepromFs, "mem", driver.clone())
        .unwrap();
    fs.register_file("shared", DeviceType::EepromFs, "mem").unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let fs = Arc::clone(&fs);
            thread::spawn(move || {
                let mut seen = Vec::new();
                for _ in 0..100 {
                    let h = fs.open("shared", O_RDONLY, 0).unwrap();
                    let mut buf = [0u8; 10];
                    assert_eq!(fs.read(h, &mut buf).unwrap(), 10);
                    assert_eq!(&buf, b"0123456789");
                    fs.close(h).unwrap();
                    seen.push(h);
                }
                seen
            })
        })
        .collect();

    let mut all = HashSet::new();
    for handle in handles {
        for h in handle.join().unwrap() {
            assert!(all.insert(h), "handle {} handed out twice", h);
        }
    }
    assert_eq!(all.len(), 800);
    assert_eq!(fs.open_handle_count(), 0);
    assert_eq!(driver.open_count(), 0);
    assert!(fs.file_info("shared").unwrap().open_handles.is_empty());
}

#[test]
fn test_concurrent_double_close_runs_driver_once() {
    let fs = Arc::new(DeviceFs::new());
    let closes = Arc::new(AtomicI32::new(0));
    let counter = closes.clone();
    let table = DriverTable::new()
        .with_open(|_name, _flags, _mode| Ok(0))
        .with_close(move |_fd| {
            counter.fetch_add(1, Ordering::SeqCst);
            thread::sleep(std::time::Duration::from_millis(5));
            Ok(())
        });
    fs.register_driver(DeviceType::Pin, "gpio", Arc::new(table))
        .unwrap();
    fs.register_file("pinA", DeviceType::Pin, "gpio").unwrap();

    for _ in 0..20 {
        let h = fs.open("pinA", O_RDONLY, 0).unwrap();
        let closers: Vec<_> = (0..4)
            .map(|_| {
                let fs = Arc::clone(&fs);
                thread::spawn(move || fs.close(h).is_ok())
            })
            .collect();
        let successes = closers
            .into_iter()
            .map(|t| t.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(successes, 1);
    }
    assert_eq!(closes.load(Ordering::SeqCst), 20);
}
