use env_logger::{Builder, WriteStyle};
use poolbridge::collectors::find_usb_devices;
use poolbridge::config::AppConfig;

struct Args {
    config: Option<String>,
    list_devices: bool,
}

fn parse_args() -> anyhow::Result<Args> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut parsed = Args {
        config: None,
        list_devices: false,
    };

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => match iter.next() {
                Some(path) => parsed.config = Some(path),
                None => anyhow::bail!("--config needs a path"),
            },
            "--list-devices" => parsed.list_devices = true,
            other => anyhow::bail!("Unknown argument: {other} (expected --config <path> or --list-devices)"),
        }
    }

    Ok(parsed)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = parse_args()?;

    // Load configuration first (without logging)
    let config = match &args.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::new().unwrap_or_else(|e| {
            eprintln!("Failed to load configuration: {:#}", e);
            // Fall back to default configuration
            AppConfig::default()
        }),
    };

    // Initialise logger with a configured log level
    Builder::new()
        .filter_level(config.get_log_level())
        .write_style(WriteStyle::Always)
        .format_timestamp_secs()
        .init();

    if args.list_devices {
        let devices = find_usb_devices(&config.serial.dev_dir);
        if devices.is_empty() {
            eprintln!("No USB serial devices found under {}", config.serial.dev_dir);
            std::process::exit(1);
        }
        for device in devices {
            println!("{device}");
        }
        return Ok(());
    }

    // `run` logs the error chain itself
    poolbridge::run(config).await
}
