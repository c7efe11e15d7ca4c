use carbus::codec::{FrameDescription, System};
use carbus::protocol::{
    BusRequest, BusResponse, RequestEnvelope, ResponseBody, ResponseStatus, ServerMessage,
};
use carbus::vehicle::store::{Control, Light, TurnSignal};
use carbus::vehicle::{AudioSource, DoorPosition};
use carbus::{GearSelector, Ignition, VehicleCommand, VehicleState};
use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use colored::*;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: &str = "8080";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = App::new("carbus")
        .version("0.1.0")
        .about("🚗 Vehicle CAN Bus Simulator client")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("host")
                .short("H")
                .long("host")
                .value_name("HOST")
                .help("Simulator host address")
                .takes_value(true)
                .default_value(DEFAULT_HOST)
                .global(true),
        )
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .value_name("PORT")
                .help("Simulator port")
                .takes_value(true)
                .default_value(DEFAULT_PORT)
                .global(true),
        )
        .arg(
            Arg::with_name("format")
                .short("f")
                .long("format")
                .value_name("FORMAT")
                .help("Output format")
                .takes_value(true)
                .possible_values(&["json", "table"])
                .default_value("table")
                .global(true),
        )
        .subcommand(SubCommand::with_name("ping").about("🏓 Test connection to the simulator"))
        .subcommand(SubCommand::with_name("state").about("📊 Show the current vehicle state"))
        .subcommand(SubCommand::with_name("stats").about("📈 Show runtime counters"))
        .subcommand(
            SubCommand::with_name("ignition")
                .about("🔑 Turn the ignition key")
                .arg(
                    Arg::with_name("mode")
                        .required(true)
                        .possible_values(&["off", "acc", "on", "start"]),
                ),
        )
        .subcommand(
            SubCommand::with_name("engine")
                .about("Start or stop the engine directly")
                .arg(
                    Arg::with_name("action")
                        .required(true)
                        .possible_values(&["start", "stop"]),
                ),
        )
        .subcommand(
            SubCommand::with_name("gear")
                .about("Move the gear selector")
                .arg(
                    Arg::with_name("selector")
                        .required(true)
                        .possible_values(&["p", "r", "n", "d"]),
                ),
        )
        .subcommand(
            SubCommand::with_name("throttle")
                .about("Set the accelerator pedal (0-100%, clamped)")
                .setting(AppSettings::AllowNegativeNumbers)
                .arg(percent_arg()),
        )
        .subcommand(
            SubCommand::with_name("brake")
                .about("Set the brake pedal (0-100%, clamped)")
                .setting(AppSettings::AllowNegativeNumbers)
                .arg(percent_arg()),
        )
        .subcommand(
            SubCommand::with_name("light")
                .about("💡 Toggle a light")
                .arg(
                    Arg::with_name("light")
                        .required(true)
                        .possible_values(&["headlights", "high-beams"]),
                ),
        )
        .subcommand(
            SubCommand::with_name("turn")
                .about("Operate the turn signal stalk")
                .arg(
                    Arg::with_name("signal")
                        .required(true)
                        .possible_values(&["left", "right", "hazards", "off"]),
                ),
        )
        .subcommand(
            SubCommand::with_name("door")
                .about("🚪 Open or close a door")
                .arg(
                    Arg::with_name("door")
                        .required(true)
                        .possible_values(&["fl", "fr", "rl", "rr"]),
                ),
        )
        .subcommand(
            SubCommand::with_name("volume")
                .about("🔊 Set infotainment volume (0-30, clamped)")
                .setting(AppSettings::AllowNegativeNumbers)
                .arg(
                    Arg::with_name("level")
                        .required(true)
                        .validator(integer_value),
                ),
        )
        .subcommand(
            SubCommand::with_name("source")
                .about("📻 Select the audio source")
                .arg(
                    Arg::with_name("source")
                        .required(true)
                        .possible_values(&["fm", "bt", "aux"]),
                ),
        )
        .subcommand(
            SubCommand::with_name("sim-speed")
                .about("⏩ Set the simulation speed factor (0.1-2.0)")
                .arg(
                    Arg::with_name("factor")
                        .required(true)
                        .validator(|v| match v.parse::<f64>() {
                            Ok(factor) if factor.is_finite() => Ok(()),
                            _ => Err("Factor must be a number".into()),
                        }),
                ),
        )
        .subcommand(
            SubCommand::with_name("log")
                .about("📜 Inspect and control the frame log")
                .setting(AppSettings::SubcommandRequiredElseHelp)
                .subcommand(SubCommand::with_name("pause").about("Stop recording frames"))
                .subcommand(SubCommand::with_name("resume").about("Resume recording frames"))
                .subcommand(SubCommand::with_name("clear").about("Empty the frame log"))
                .subcommand(
                    SubCommand::with_name("show")
                        .about("Print the most recent frames")
                        .arg(
                            Arg::with_name("limit")
                                .short("n")
                                .long("limit")
                                .takes_value(true)
                                .default_value("20"),
                        ),
                ),
        )
        .subcommand(SubCommand::with_name("monitor").about("📡 Stream decoded frames live"))
        .get_matches();

    let host = matches.value_of("host").unwrap_or(DEFAULT_HOST);
    let port = matches.value_of("port").unwrap_or(DEFAULT_PORT).parse::<u16>()?;
    let format = matches.value_of("format").unwrap_or("table");

    match matches.subcommand() {
        ("ping", _) => {
            let (raw, response) = send_request(host, port, BusRequest::Ping).await?;
            match format {
                "json" => println!("{}", raw),
                _ if response.status == ResponseStatus::Success => {
                    println!("{} {}", "✅".green(), "Simulator is responsive".bright_green());
                }
                _ => println!("{} {}", "❌".red(), "Ping failed".bright_red()),
            }
        }
        ("state", _) => {
            let (raw, response) = send_request(host, port, BusRequest::GetState).await?;
            match (format, response.body) {
                ("json", _) => println!("{}", raw),
                (
                    _,
                    Some(ResponseBody::State {
                        state,
                        check_engine,
                    }),
                ) => print_state(&state, check_engine),
                _ => println!("{} {}", "❌".red(), "State unavailable".bright_red()),
            }
        }
        ("stats", _) => {
            let (raw, response) = send_request(host, port, BusRequest::GetStats).await?;
            match (format, response.body) {
                ("json", _) => println!("{}", raw),
                (_, Some(ResponseBody::Stats { store, log, uptime_ms })) => {
                    println!("{}", "📈 Runtime Counters".bright_blue().bold());
                    println!("Uptime:            {:.1} s", uptime_ms as f64 / 1000.0);
                    println!("Commands applied:  {}", store.commands_applied);
                    println!("Commands ignored:  {}", store.commands_ignored);
                    println!("Dynamics commits:  {}", store.dynamics_commits);
                    println!("Engine starts:     {}", store.engine_starts);
                    println!("Frames logged:     {}", log.appended);
                    println!("Frames evicted:    {}", log.evicted);
                    println!("Dropped (paused):  {}", log.discarded_while_paused);
                }
                _ => println!("{} {}", "❌".red(), "Stats unavailable".bright_red()),
            }
        }
        ("log", Some(sub_matches)) => handle_log(sub_matches, host, port, format).await?,
        ("monitor", _) => monitor(host, port, format).await?,
        (name, Some(sub_matches)) => {
            let (action, command) = vehicle_command(name, sub_matches)?;
            let (raw, response) = send_request(host, port, BusRequest::Vehicle(command)).await?;
            print_command_result(&action, &raw, &response, format);
        }
        _ => {
            println!("{}", "No command specified. Use --help for usage information.".yellow());
        }
    }

    Ok(())
}

fn percent_arg() -> Arg<'static, 'static> {
    Arg::with_name("percent")
        .required(true)
        .validator(integer_value)
}

// Range is left to the simulator, which clamps
fn integer_value(value: String) -> Result<(), String> {
    value
        .parse::<i32>()
        .map(|_| ())
        .map_err(|_| format!("'{}' is not a whole number", value))
}

/// Maps a vehicle subcommand to a display label and the command to send.
fn vehicle_command(
    name: &str,
    matches: &ArgMatches<'_>,
) -> Result<(String, VehicleCommand), Box<dyn std::error::Error>> {
    let arg_name = match name {
        "ignition" => "mode",
        "engine" => "action",
        "gear" => "selector",
        "throttle" | "brake" => "percent",
        "light" => "light",
        "turn" => "signal",
        "door" => "door",
        "volume" => "level",
        "source" => "source",
        "sim-speed" => "factor",
        other => return Err(format!("unknown command '{}'", other).into()),
    };
    let value = matches.value_of(arg_name).unwrap_or_default();

    let command = match name {
        "ignition" => VehicleCommand::SetIgnition {
            mode: match value {
                "acc" => Ignition::Acc,
                "on" => Ignition::On,
                "start" => Ignition::Start,
                _ => Ignition::Off,
            },
        },
        "engine" if value == "start" => VehicleCommand::StartEngine,
        "engine" => VehicleCommand::StopEngine,
        "gear" => VehicleCommand::SetGearSelector {
            gear: match value {
                "r" => GearSelector::R,
                "n" => GearSelector::N,
                "d" => GearSelector::D,
                _ => GearSelector::P,
            },
        },
        "throttle" => VehicleCommand::SetControl {
            control: Control::Accelerator,
            value: value.parse()?,
        },
        "brake" => VehicleCommand::SetControl {
            control: Control::Brake,
            value: value.parse()?,
        },
        "light" => VehicleCommand::ToggleLight {
            light: match value {
                "high-beams" => Light::HighBeams,
                _ => Light::Headlights,
            },
        },
        "turn" => VehicleCommand::SetTurnSignal {
            signal: match value {
                "left" => TurnSignal::Left,
                "right" => TurnSignal::Right,
                "hazards" => TurnSignal::Hazards,
                _ => TurnSignal::Off,
            },
        },
        "door" => VehicleCommand::ToggleDoor {
            door: match value {
                "fr" => DoorPosition::Fr,
                "rl" => DoorPosition::Rl,
                "rr" => DoorPosition::Rr,
                _ => DoorPosition::Fl,
            },
        },
        "volume" => VehicleCommand::SetInfotainment {
            volume: Some(value.parse()?),
            source: None,
        },
        "source" => VehicleCommand::SetInfotainment {
            volume: None,
            source: Some(match value {
                "bt" => AudioSource::Bt,
                "aux" => AudioSource::Aux,
                _ => AudioSource::Fm,
            }),
        },
        _ => VehicleCommand::SetSimulationSpeed {
            factor: value.parse()?,
        },
    };

    Ok((format!("{} {}", name, value.to_uppercase()), command))
}

async fn handle_log(
    matches: &ArgMatches<'_>,
    host: &str,
    port: u16,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let request = match matches.subcommand() {
        ("pause", _) => BusRequest::PauseLog,
        ("resume", _) => BusRequest::ResumeLog,
        ("clear", _) => BusRequest::ClearLog,
        ("show", Some(sub_matches)) => BusRequest::GetLog {
            limit: Some(sub_matches.value_of("limit").unwrap_or("20").parse()?),
        },
        _ => {
            println!("{}", "Log subcommand required. Use 'carbus log --help' for options.".yellow());
            return Ok(());
        }
    };

    let (raw, response) = send_request(host, port, request).await?;
    match (format, &response.body) {
        ("json", _) => println!("{}", raw),
        (
            _,
            Some(ResponseBody::Log {
                paused,
                message_count,
                frames,
            }),
        ) => {
            let state = if *paused { "PAUSED".bright_yellow() } else { "LIVE".bright_green() };
            println!("{} {} ({} messages)", "📜 Frame Log".bright_blue().bold(), state, message_count);
            print_frame_header();
            for frame in frames {
                print_frame_row(frame);
            }
        }
        _ => print_command_result("Frame log", &raw, &response, format),
    }
    Ok(())
}

async fn monitor(host: &str, port: u16, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", "📡 Monitoring bus traffic (Press Ctrl+C to stop)...".bright_blue().bold());

    let stream = TcpStream::connect((host, port)).await?;
    let (reader, mut writer) = stream.into_split();
    let envelope = RequestEnvelope {
        id: 1,
        request: BusRequest::Subscribe,
    };
    writer.write_all(serde_json::to_string(&envelope)?.as_bytes()).await?;
    writer.write_all(b"\n").await?;

    if format != "json" {
        print_frame_header();
    }

    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        match (format, serde_json::from_str::<ServerMessage>(&line)) {
            (_, Ok(ServerMessage::Response(_))) => {}
            ("json", Ok(ServerMessage::Frame(_))) => println!("{}", line),
            (_, Ok(ServerMessage::Frame(frame))) => print_frame_row(&frame),
            (_, Err(e)) => eprintln!("{} Unreadable line from simulator: {}", "⚠️".yellow(), e),
        }
    }

    Ok(())
}

/// Sends one request and waits for its response, skipping any frame events.
async fn send_request(
    host: &str,
    port: u16,
    request: BusRequest,
) -> Result<(String, BusResponse), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", host, port);
    let stream = match TcpStream::connect(&addr).await {
        Ok(stream) => stream,
        Err(e) => {
            eprintln!("{} Failed to connect to simulator at {}", "❌".red(), addr.bright_white());
            if e.kind() == std::io::ErrorKind::ConnectionRefused {
                eprintln!("{} Server is not running. Start it with:", "💡".yellow());
                eprintln!("   {}", "cargo run --bin carbus-simulator".bright_cyan());
            }
            return Err(e.into());
        }
    };

    let envelope = RequestEnvelope { id: 1, request };
    let line = serde_json::to_string(&envelope)?;

    match tokio::time::timeout(REQUEST_TIMEOUT, exchange(stream, &line, envelope.id)).await {
        Ok(result) => result,
        Err(_) => {
            eprintln!("{} Request timed out after 5 seconds", "⏰".yellow());
            Err("Request timeout".into())
        }
    }
}

async fn exchange(
    stream: TcpStream,
    line: &str,
    id: u32,
) -> Result<(String, BusResponse), Box<dyn std::error::Error>> {
    let (reader, mut writer) = stream.into_split();
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;

    let mut lines = BufReader::new(reader).lines();
    while let Some(reply) = lines.next_line().await? {
        if let Ok(ServerMessage::Response(response)) = serde_json::from_str(&reply) {
            if response.id == id {
                let raw = serde_json::to_string_pretty(&response)?;
                return Ok((raw, response));
            }
        }
    }
    Err("Server closed connection".into())
}

fn print_command_result(action: &str, raw: &str, response: &BusResponse, format: &str) {
    if format == "json" {
        println!("{}", raw);
        return;
    }

    let message = match &response.body {
        Some(ResponseBody::Message { message }) => message.as_str(),
        _ => "",
    };
    match response.status {
        ResponseStatus::Success => match &response.body {
            Some(ResponseBody::EngineStartScheduled { delay_ms }) => println!(
                "{} {} (engine cranking, {} ms)",
                "✅".green(),
                action.bright_white(),
                delay_ms
            ),
            _ => println!("{} {}", "✅".green(), action.bright_white()),
        },
        ResponseStatus::Ignored => {
            println!("{} {} ignored: {}", "⚠️".yellow(), action.bright_white(), message.yellow());
        }
        ResponseStatus::Error => {
            println!("{} {} failed: {}", "❌".red(), action.bright_white(), message.bright_red());
        }
    }
}

fn print_state(state: &VehicleState, check_engine: bool) {
    let on_off = |flag: bool| if flag { "ON".bright_green() } else { "off".dimmed() };

    println!("{}", "🚗 Vehicle State".bright_blue().bold());
    println!("{}", "═══════════════".bright_blue());
    println!("Ignition:       {:?}", state.ignition);
    println!(
        "Engine:         {}",
        if state.engine_running { "RUNNING".bright_green() } else { "STOPPED".bright_red() }
    );
    println!("RPM:            {:.0}", state.rpm);
    println!("Speed:          {:.1} km/h", state.speed_kmh);
    println!("Gear:           {} ({})", state.gear_selector.as_str(), state.active_gear);
    println!("Throttle/Brake: {}% / {}%", state.accelerator, state.brake);
    println!("Sim speed:      {:.1}x", state.simulation_speed);
    println!(
        "Lights:         head {} | high {}",
        on_off(state.lights.headlights),
        on_off(state.lights.high_beams)
    );
    println!(
        "Signals:        left {} | right {} | hazards {}",
        on_off(state.lights.left_turn),
        on_off(state.lights.right_turn),
        on_off(state.lights.hazards)
    );
    let open: Vec<&str> = state.doors.open_doors().map(DoorPosition::label).collect();
    println!(
        "Doors open:     {}",
        if open.is_empty() { "None".normal() } else { open.join(", ").bright_red() }
    );
    println!(
        "Infotainment:   Vol {} | Src {}",
        state.infotainment.volume,
        state.infotainment.source.as_str()
    );
    if check_engine {
        println!("{}", "⚠️  CHECK ENGINE".bright_yellow().bold());
    }
}

fn print_frame_header() {
    println!(
        "{}",
        format!(
            "{:>9} │ {:>5} │ {:<20} │ {:<23} │ {}",
            "TIME(ms)", "ID", "NAME", "DATA", "DETAIL"
        )
        .bright_white()
    );
}

fn print_frame_row(frame: &FrameDescription) {
    let name = format!("{:<20}", frame.name);
    let name = match frame.system {
        System::Powertrain => name.red(),
        System::Chassis => name.blue(),
        System::Body => name.green(),
        System::Infotainment => name.purple(),
        System::Adas => name.yellow(),
    };
    println!(
        "{:>9} │ {:>5} │ {} │ {:<23} │ {}",
        frame.timestamp_ms,
        frame.id.to_string(),
        name,
        frame.data,
        frame.detail.as_deref().unwrap_or("").dimmed()
    );
}
