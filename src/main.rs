use anyhow::{Result, bail};
use aoa_bridge::bridge::Bridge;
use aoa_bridge::config::{BridgeConfig, StringPolicy};
use aoa_bridge::identity::AccessoryIdentity;
use aoa_bridge::libusb::LibUsb;
use aoa_bridge::locator::list_devices;
use aoa_bridge::protocol::Status;
use aoa_bridge::transport::Backend;
use clap::{Args, Parser, Subcommand};
use rustyline::error::ReadlineError;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "aoa-bridge", version, about)]
struct Opt {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List attached USB devices and whether they are in accessory mode
    List {
        /// Ask devices not in accessory mode which accessory protocol version they support
        #[arg(long)]
        probe: bool,
    },

    /// Switch a device into accessory mode and show its bulk endpoints
    Connect {
        #[command(flatten)]
        conn: ConnectSpec,
    },

    /// Read one transfer from the accessory and print it as hex
    Read {
        #[command(flatten)]
        conn: ConnectSpec,

        /// Maximum number of bytes to read
        #[arg(short = 'n', long, default_value_t = 512)]
        length: usize,

        /// Milliseconds to wait for data (0 waits forever)
        #[arg(short, long, default_value_t = 1000)]
        timeout_ms: u64,
    },

    /// Write hex-encoded bytes (e.g. 0x010203) to the accessory
    Write {
        #[command(flatten)]
        conn: ConnectSpec,

        data: String,

        /// Milliseconds to wait for the device to accept the data (0 waits forever)
        #[arg(short, long, default_value_t = 1000)]
        timeout_ms: u64,
    },

    /// Send each typed line to the accessory and print what comes back; "." exits
    Chat {
        #[command(flatten)]
        conn: ConnectSpec,

        /// Milliseconds to wait for each write and reply (0 waits forever)
        #[arg(short, long, default_value_t = 1000)]
        timeout_ms: u64,
    },
}

#[derive(Args, Debug)]
struct ConnectSpec {
    /// Manufacturer string sent to the device
    #[arg(long)]
    manufacturer: Option<String>,

    /// Model string sent to the device
    #[arg(long)]
    model: Option<String>,

    /// Description string sent to the device
    #[arg(long)]
    description: Option<String>,

    /// Version string sent to the device
    #[arg(long)]
    accessory_version: Option<String>,

    /// URI the device may offer when no app handles the accessory
    #[arg(long)]
    uri: Option<String>,

    /// Serial string sent to the device
    #[arg(long)]
    serial: Option<String>,

    /// Milliseconds to wait after claiming a device before sending strings
    #[arg(long, default_value_t = 1)]
    settle_ms: u64,

    /// Milliseconds to wait for the device to re-enumerate after START
    #[arg(long, default_value_t = 3000)]
    reenumerate_ms: u64,

    /// Timeout for handshake control transfers in milliseconds (0 waits forever)
    #[arg(long, default_value_t = 0)]
    control_timeout_ms: u64,

    /// Abort the handshake if the device rejects any identity string
    #[arg(long)]
    strict_strings: bool,
}

impl ConnectSpec {
    fn identity(&self) -> AccessoryIdentity {
        AccessoryIdentity::new(
            self.manufacturer.as_deref(),
            self.model.as_deref(),
            self.description.as_deref(),
            self.accessory_version.as_deref(),
            self.uri.as_deref(),
            self.serial.as_deref(),
        )
    }

    fn config(&self) -> BridgeConfig {
        let policy = if self.strict_strings {
            StringPolicy::AbortOnFailure
        } else {
            StringPolicy::BestEffort
        };

        BridgeConfig::default()
            .settle_delay(Duration::from_millis(self.settle_ms))
            .reenumeration_delay(Duration::from_millis(self.reenumerate_ms))
            .control_timeout(Duration::from_millis(self.control_timeout_ms))
            .string_policy(policy)
    }

    fn connect(&self) -> Result<Bridge<LibUsb>> {
        let mut bridge = Bridge::new(LibUsb, self.config());
        bridge.initialize(self.identity())?;
        Ok(bridge)
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::new()
            .filter_or("AOA_BRIDGE_LOG", "info")
            .write_style("AOA_BRIDGE_LOG_STYLE"),
    )
    .init();

    match Opt::parse().command {
        Command::List { probe } => list(probe)?,
        Command::Connect { conn } => {
            let bridge = conn.connect()?;
            if let Some(endpoints) = bridge.endpoints() {
                println!("Connected: {endpoints}");
            }
        }
        Command::Read {
            conn,
            length,
            timeout_ms,
        } => {
            let bridge = conn.connect()?;
            let mut buf = vec![0u8; length];
            let len = bridge.read(&mut buf, Duration::from_millis(timeout_ms))?;
            println!("Read {len} bytes: {:02x?}", &buf[..len]);
        }
        Command::Write {
            conn,
            data,
            timeout_ms,
        } => {
            let data = parse_hex(&data)?;
            let bridge = conn.connect()?;
            let len = bridge.write(&data, Duration::from_millis(timeout_ms))?;
            println!("Wrote {len} of {} bytes", data.len());
        }
        Command::Chat { conn, timeout_ms } => {
            let bridge = conn.connect()?;
            chat(&bridge, Duration::from_millis(timeout_ms))?;
        }
    };

    Ok(())
}

fn list(probe: bool) -> Result<()> {
    let context = LibUsb.create_context()?;
    let probe = probe.then_some(Duration::from_millis(500));

    for dev in list_devices(&context, probe)? {
        let id = dev
            .id
            .map_or_else(|| "????:????".to_owned(), |id| id.to_string());
        let support = match (dev.mode.is_accessory(), dev.protocol) {
            (true, _) => format!("in {} mode", dev.mode),
            (false, Some(0)) | (false, None) if probe.is_some() => "no AOA support".to_owned(),
            (false, Some(version)) => format!("supports AOA version {version}"),
            (false, None) => "not in accessory mode".to_owned(),
        };

        println!(
            "{id} bus {:03} address {:03} [{support}]",
            dev.bus_number, dev.address
        );
    }

    Ok(())
}

fn chat(bridge: &Bridge<LibUsb>, timeout: Duration) -> Result<()> {
    let mut editor = rustyline::DefaultEditor::new()?;
    let mut response = vec![0u8; 16384];

    loop {
        let line = match editor.readline("> ") {
            Ok(line) => line,
            Err(ReadlineError::Eof | ReadlineError::Interrupted) => break,
            Err(e) => return Err(e.into()),
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        } else if line == "." {
            break;
        }
        editor.add_history_entry(line)?;

        bridge.write(line.as_bytes(), timeout)?;
        match bridge.read(&mut response, timeout) {
            Ok(len) => println!("{}", String::from_utf8_lossy(&response[..len])),
            Err(e) if e.status() == Status::Timeout => println!("(no response)"),
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}

fn parse_hex(s: &str) -> Result<Vec<u8>> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    if s.len() % 2 != 0 || !s.is_ascii() {
        bail!("hex data must be an even number of hex digits");
    }

    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(Into::into))
        .collect()
}
