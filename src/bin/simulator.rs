use carbus::bus::BusHandle;
use carbus::codec::describe;
use carbus::config::SimulationConfig;
use carbus::protocol::{
    handle_request, recover_request_id, BusRequest, BusResponse, ProtocolError, ProtocolHandler,
    ServerMessage,
};
use carbus::VehicleBus;
use clap::{App, Arg};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "CARBUS_LOG";

type SharedWriter = Arc<Mutex<OwnedWriteHalf>>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = App::new("carbus-simulator")
        .version("0.1.0")
        .about("Vehicle CAN bus simulator daemon")
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .value_name("PORT")
                .help("TCP port to listen on (overrides the config file)")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("JSON simulation config")
                .takes_value(true),
        )
        .get_matches();

    init_tracing();

    let mut config = match matches.value_of("config") {
        Some(path) => SimulationConfig::from_json_file(path)?,
        None => SimulationConfig::default(),
    };
    if let Some(port) = matches.value_of("port") {
        config.tcp_port = port.parse()?;
    }

    println!("🚗 Vehicle CAN Bus Simulator");
    println!("============================");

    let port = config.tcp_port;
    let bus = VehicleBus::start(config)?;

    let tcp_bus = bus.handle();
    let tcp_server = tokio::spawn(async move {
        if let Err(e) = start_tcp_server(tcp_bus, port).await {
            error!("TCP server error: {}", e);
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");

    tcp_server.abort();
    bus.shutdown().await;
    println!("🛑 Vehicle CAN Bus Simulator stopped");

    Ok(())
}

fn init_tracing() {
    // CARBUS_LOG first, then RUST_LOG, then info
    let filter = match std::env::var(LOG_ENV) {
        Ok(directive) => EnvFilter::try_new(&directive).unwrap_or_else(|err| {
            eprintln!("invalid {} directive ({}); defaulting to info", LOG_ENV, err);
            EnvFilter::new("info")
        }),
        Err(_) => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn start_tcp_server(bus: BusHandle, port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    info!("🌐 TCP server listening on port {}", port);

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("🔗 New client connected: {}", addr);
                let client_bus = bus.clone();

                tokio::spawn(async move {
                    if let Err(e) = handle_client(stream, client_bus).await {
                        warn!("Client {} error: {}", addr, e);
                    }
                    info!("🔌 Client {} disconnected", addr);
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

async fn handle_client(stream: TcpStream, bus: BusHandle) -> Result<(), Box<dyn std::error::Error>> {
    let (reader, writer) = stream.into_split();
    let mut buf_reader = BufReader::new(reader);
    let writer: SharedWriter = Arc::new(Mutex::new(writer));

    let mut protocol = ProtocolHandler::new();
    let mut frame_stream: Option<JoinHandle<()>> = None;

    let mut line = String::new();
    loop {
        line.clear();
        if buf_reader.read_line(&mut line).await? == 0 {
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let mut subscribe = false;
        let response = match protocol.parse_request(trimmed) {
            Ok(envelope) => {
                debug!(id = envelope.id, request = ?envelope.request, "request received");
                subscribe = envelope.request == BusRequest::Subscribe;
                handle_request(&bus, envelope).await
            }
            Err(e) => {
                warn!("Failed to parse request: {}", e);
                let reason = match e {
                    ProtocolError::MessageTooLarge => "request exceeds size limit",
                    _ => "unrecognized request",
                };
                BusResponse::ignored(recover_request_id(trimmed), bus.uptime_ms(), reason)
            }
        };

        let message = ServerMessage::Response(response);
        match protocol.serialize(&message) {
            Ok(json) => write_line(&writer, json).await?,
            Err(e) => error!("Failed to serialize response: {}", e),
        }

        // Frames only start flowing once the acknowledgement is on the wire
        if subscribe && frame_stream.is_none() {
            frame_stream = Some(spawn_frame_stream(&bus, Arc::clone(&writer)));
        }
    }

    if let Some(task) = frame_stream {
        task.abort();
    }
    debug!(stats = ?protocol.stats(), "client session closed");
    Ok(())
}

/// Forwards every logged frame to the client as a decoded event line.
fn spawn_frame_stream(bus: &BusHandle, writer: SharedWriter) -> JoinHandle<()> {
    let mut frames = bus.subscribe_frames();

    tokio::spawn(async move {
        let mut protocol = ProtocolHandler::new();
        loop {
            let frame = match frames.recv().await {
                Ok(frame) => frame,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Frame stream lagging, skipped {} frames", skipped);
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            let message = ServerMessage::Frame(describe(&frame));
            let json = match protocol.serialize(&message) {
                Ok(json) => json,
                Err(e) => {
                    warn!("Failed to serialize frame: {}", e);
                    continue;
                }
            };
            if let Err(e) = write_line(&writer, json).await {
                warn!("Failed to send frame: {}", e);
                break;
            }
        }
    })
}

async fn write_line(writer: &SharedWriter, line: &str) -> std::io::Result<()> {
    let mut writer_guard = writer.lock().await;
    writer_guard.write_all(line.as_bytes()).await?;
    writer_guard.write_all(b"\n").await
}
