//! devicefs-shell: interactive shell over the VFS router
//!
//! Mounts in-memory eeprom and sdcard backends next to a device filesystem
//! populated with pin and clock files, then reads commands from stdin.

// Use jemalloc as global allocator
#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

use clap::Parser;
use devicefs::devicefs::{DeviceFs, MemoryDriver};
use devicefs::types::{DeviceType, O_RDONLY, O_WRONLY};
use devicefs::vfs::{MemoryBackend, VfsError, VfsResult, VfsRouter};
use devicefs::VfsConfig;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug, Clone)]
#[command(name = "devicefs-shell")]
#[command(about = "Interactive shell over the device filesystem router")]
struct Args {
    /// JSON configuration file
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Number of pin files to register under the device mount
    #[arg(short = 'p', long, default_value = "4")]
    pins: usize,
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => match VfsConfig::load(path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("Error: failed to load {}: {}", path.display(), err);
                return ExitCode::FAILURE;
            }
        },
        None => VfsConfig::default(),
    };

    let router = match build_router(&config, args.pins) {
        Ok(router) => router,
        Err(err) => {
            eprintln!("Error: {}", err);
            return ExitCode::FAILURE;
        }
    };
    info!(pins = args.pins, "devicefs shell ready");

    match run(&router) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {}", err);
            ExitCode::FAILURE
        }
    }
}

fn build_router(config: &VfsConfig, pins: usize) -> VfsResult<VfsRouter> {
    let devices = Arc::new(DeviceFs::with_config(config.devicefs.clone()));

    let mut gpio = MemoryDriver::character_device();
    for pin in 0..pins {
        gpio = gpio.with_content(&format!("pin{}", pin), b"0");
    }
    devices.register_driver(DeviceType::Pin, "gpio", Arc::new(gpio))?;
    for pin in 0..pins {
        devices.register_file(&format!("pin{}", pin), DeviceType::Pin, "gpio")?;
    }

    let boot_time = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let clock = MemoryDriver::character_device().with_content("clock", boot_time.to_string().as_bytes());
    devices.register_driver(DeviceType::Rtc, "sys", Arc::new(clock))?;
    devices.register_file("clock", DeviceType::Rtc, "sys")?;

    Ok(VfsRouter::new(config)
        .with_device(devices)
        .with_eeprom(Arc::new(MemoryBackend::new()))
        .with_sdcard(Arc::new(MemoryBackend::new())))
}

fn run(router: &VfsRouter) -> io::Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        write!(stdout, "{}> ", router.current_directory())?;
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            return Ok(());
        }

        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((&command, rest)) = words.split_first() else {
            continue;
        };
        if command == "exit" || command == "quit" {
            return Ok(());
        }

        if let Err(err) = execute(router, command, rest, &mut stdout) {
            writeln!(stdout, "{}: {} (errno {})", command, err, err.errno())?;
        }
    }
}

fn execute(router: &VfsRouter, command: &str, args: &[&str], out: &mut impl Write) -> VfsResult<()> {
    match (command, args) {
        ("pwd", []) => print(out, &router.current_directory()),
        ("cd", [path]) => {
            router.change_directory(path)?;
            Ok(())
        }
        ("cd", []) => {
            router.change_directory("/")?;
            Ok(())
        }
        ("ls", []) => list(router, ".", out),
        ("ls", [path]) => list(router, path, out),
        ("cat", [path]) => cat(router, path, out),
        ("write", [path, text @ ..]) => {
            let handle = router.open(path, O_WRONLY | libc::O_CREAT | libc::O_TRUNC, 0o644)?;
            let data = format!("{}\n", text.join(" "));
            let result = router.write(handle, data.as_bytes());
            router.close(handle)?;
            result.map(|_| ())
        }
        ("mv", [src, dst]) => router.rename(src, dst),
        ("stat", [path]) => {
            let stat = router.stat(path)?;
            print(
                out,
                &format!(
                    "{}: {} size={} mode={:o}",
                    path,
                    router.check_type_string(path),
                    stat.size,
                    stat.mode
                ),
            )
        }
        _ => Err(VfsError::InvalidArgument(format!(
            "usage: cd [dir] | pwd | ls [dir] | cat FILE | write FILE TEXT | mv SRC DST | stat FILE | exit (got '{}')",
            command
        ))),
    }
}

fn print(out: &mut impl Write, text: &str) -> VfsResult<()> {
    writeln!(out, "{}", text).map_err(|e| VfsError::InvalidArgument(e.to_string()))
}

fn list(router: &VfsRouter, path: &str, out: &mut impl Write) -> VfsResult<()> {
    for name in router.list_directory(path)? {
        print(out, &name)?;
    }
    Ok(())
}

fn cat(router: &VfsRouter, path: &str, out: &mut impl Write) -> VfsResult<()> {
    let handle = router.open(path, O_RDONLY, 0)?;
    let mut content = Vec::new();
    let mut buf = [0u8; 256];
    let result = loop {
        match router.read(handle, &mut buf) {
            Ok(0) => break Ok(()),
            Ok(n) => content.extend_from_slice(&buf[..n]),
            Err(err) => break Err(err),
        }
    };
    router.close(handle)?;
    result?;
    print(out, String::from_utf8_lossy(&content).trim_end())
}
