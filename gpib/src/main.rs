use std::process::exit;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, bail};
use clap::{crate_authors, crate_version, App as ClapApp, Arg, ArgMatches};
use env_logger::Env;
use serde::Serialize;

use gpib::constants::*;
use gpib::{Device, DeviceOptions, Gpib, Timeout};

fn board_arg() -> Arg<'static> {
    Arg::new("board").required(true).help("Board index, e.g. 0 for gpib0.")
}

fn pad_arg() -> Arg<'static> {
    Arg::new("pad").required(true).help("Primary address of the device.")
}

fn app() -> ClapApp<'static> {
    ClapApp::new("GPIB command line")
        .author(crate_authors!())
        .version(crate_version!())
        .about("Talk to GPIB instruments through linux-gpib or NI-488.2")
        .arg(
            Arg::new("lib")
                .long("lib")
                .short('l')
                .takes_value(true)
                .help("Path of the GPIB driver library. Defaults to $GPIB_LIBRARY or the platform default."),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .short('t')
                .takes_value(true)
                .default_value("T10s")
                .help("I/O timeout code, TNONE, T10us, ..., T1000s."),
        )
        .arg(
            Arg::new("sad")
                .long("sad")
                .takes_value(true)
                .default_value("0")
                .help("Secondary address."),
        )
        .arg(Arg::new("json").long("json").short('j').help("Print results as JSON"))
        .arg(Arg::new("verbose").long("verbose").short('v').help("Log verbose output"))
        .subcommand(ClapApp::new("info").about("Show which driver library and entry points were found"))
        .subcommand(
            ClapApp::new("find")
                .about("Open a board or device by its configured name")
                .arg(Arg::new("name").required(true)),
        )
        .subcommand(
            ClapApp::new("listener")
                .about("Check whether a listener is present at an address")
                .arg(board_arg())
                .arg(pad_arg()),
        )
        .subcommand(ClapApp::new("lines").about("Show the bus control lines").arg(board_arg()))
        .subcommand(ClapApp::new("ifc").about("Pulse interface clear").arg(board_arg()))
        .subcommand(
            ClapApp::new("write")
                .about("Write a message to a device")
                .arg(board_arg())
                .arg(pad_arg())
                .arg(Arg::new("data").required(true)),
        )
        .subcommand(
            ClapApp::new("query")
                .about("Write a message to a device and read the answer")
                .arg(board_arg())
                .arg(pad_arg())
                .arg(Arg::new("data").required(true))
                .arg(
                    Arg::new("len")
                        .long("len")
                        .takes_value(true)
                        .default_value("1024")
                        .help("Maximum number of bytes to read."),
                ),
        )
        .subcommand(
            ClapApp::new("spoll")
                .about("Serial poll a device")
                .arg(board_arg())
                .arg(pad_arg()),
        )
}

fn parse<T: FromStr>(matches: &ArgMatches, name: &str) -> anyhow::Result<T> {
    let value = matches
        .value_of(name)
        .ok_or_else(|| anyhow!("Missing argument `{}`.", name))?;
    value
        .parse::<T>()
        .map_err(|_| anyhow!("Cannot parse `{}` as {}.", value, name))
}

fn print<T: Serialize>(json: bool, value: &T, text: String) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", text);
    }
    Ok(())
}

fn open(gpib: &Arc<Gpib>, matches: &ArgMatches, options: &DeviceOptions) -> anyhow::Result<Device> {
    let board = parse(matches, "board")?;
    let pad = parse(matches, "pad")?;
    Ok(Device::open(gpib.clone(), board, pad, options)?)
}

fn describe_lines(lines: u16) -> String {
    let names = [
        ("DAV", ValidDAV, BusDAV),
        ("NDAC", ValidNDAC, BusNDAC),
        ("NRFD", ValidNRFD, BusNRFD),
        ("IFC", ValidIFC, BusIFC),
        ("REN", ValidREN, BusREN),
        ("SRQ", ValidSRQ, BusSRQ),
        ("ATN", ValidATN, BusATN),
        ("EOI", ValidEOI, BusEOI),
    ];
    names
        .iter()
        .map(|(name, valid, bus)| {
            let state = if lines & valid == 0 {
                "?"
            } else if lines & bus != 0 {
                "1"
            } else {
                "0"
            };
            format!("{}={}", name, state)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn run(matches: &ArgMatches) -> anyhow::Result<()> {
    let json = matches.is_present("json");
    let gpib = match matches.value_of("lib") {
        Some(path) => Gpib::load(path)?,
        None => Gpib::search(None),
    };
    let gpib = Arc::new(gpib);
    let options = DeviceOptions {
        sad: parse(matches, "sad")?,
        timeout: parse::<Timeout>(matches, "timeout")?,
        ..Default::default()
    };

    match matches.subcommand() {
        Some(("info", _)) => {
            let info = gpib.info()?;
            let version = gpib.version()?;
            let text = format!(
                "library: {}\nversion: {}\nibfind: {}\nstatus: {:?}, error: {:?}, count: {:?}\nibspb: {}",
                info.library,
                version.as_deref().unwrap_or("unknown"),
                info.find,
                info.status,
                info.error,
                info.count,
                if info.spoll_bytes { "available" } else { "not available" },
            );
            print(json, &info, text)
        }
        Some(("find", args)) => {
            let name: String = parse(args, "name")?;
            let dev = Device::find(gpib, &name)?;
            print(json, &dev.handle(), format!("{}: handle {}", name, dev.handle()))
        }
        Some(("listener", args)) => {
            let board = parse(args, "board")?;
            let pad = parse(args, "pad")?;
            let present = gpib.listener(board, pad, options.sad)?;
            let text = if present {
                format!("Listener present at {}:{}", board, pad)
            } else {
                format!("No listener at {}:{}", board, pad)
            };
            print(json, &present, text)
        }
        Some(("lines", args)) => {
            let lines = gpib.lines(parse(args, "board")?)?;
            print(json, &lines, describe_lines(lines))
        }
        Some(("ifc", args)) => {
            let sta = gpib.interface_clear(parse(args, "board")?)?;
            print(json, &sta, sta.to_string())
        }
        Some(("write", args)) => {
            let dev = open(&gpib, args, &options)?;
            let data: String = parse(args, "data")?;
            let sta = dev.write(data.as_bytes())?;
            dev.close()?;
            print(json, &sta, sta.to_string())
        }
        Some(("query", args)) => {
            let dev = open(&gpib, args, &options)?;
            let data: String = parse(args, "data")?;
            let len = parse(args, "len")?;
            let reply = dev.query(data.as_bytes(), Some(len))?;
            dev.close()?;
            let text = String::from_utf8_lossy(&reply).trim_end().to_string();
            print(json, &reply, text)
        }
        Some(("spoll", args)) => {
            let dev = open(&gpib, args, &options)?;
            let stb = dev.serial_poll()?;
            let text = format!(
                "0x{:02x}{}",
                stb,
                if stb & IbStbRQS != 0 { " (RQS)" } else { "" }
            );
            print(json, &stb, text)
        }
        _ => bail!("No command given, see --help."),
    }
}

fn main() {
    let matches = app().get_matches();

    let verbose = matches.is_present("verbose");
    if verbose {
        env_logger::Builder::from_env(Env::default().default_filter_or("gpib=debug")).init();
    } else {
        env_logger::init();
    }

    if let Err(err) = run(&matches) {
        eprintln!("{}", err);
        exit(1);
    }
}
