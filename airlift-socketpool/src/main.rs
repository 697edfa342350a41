//! Entry point for `airlift-demo`.
//!
//! Drives the socket pool against the loopback [`Emulator`] over a simulated
//! SPI bus, so the whole stack (framing, handshake, socket state machine)
//! runs without hardware.  Set `RUST_LOG=debug` to watch the command
//! traffic.

use std::cell::RefCell;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::rc::Rc;

use airlift_link::simulator::{SimulatedBus, SimulatorConfig};
use airlift_link::{Bus, LinkConfig, Platform, Radio, StdPlatform};
use airlift_socketpool::{
    proto, AddressFamily, Emulator, PollConfig, Socket, SocketPool, SocketType, Timeout,
};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

type DemoPool = SocketPool<SimulatedBus<Emulator>, StdPlatform>;

const DEMO_NETWORK: &str = "airlift-lab";
const DEMO_PASSPHRASE: &str = "correct horse";
const ECHO_HOST: &str = "echo.airlift.test";

/// Socket pool demo on an emulated AirLift co-processor.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Socket timeout in milliseconds (0 = non-blocking).
    #[arg(long, global = true, default_value_t = 2000)]
    timeout_ms: u32,

    /// Pause between polls of a blocking socket call.
    #[arg(long, global = true, default_value_t = 50)]
    poll_interval_ms: u32,

    /// Seed for the simulated co-processor's processing jitter.
    #[arg(long, global = true, default_value_t = 1)]
    seed: u64,

    /// Share of commands that keep the co-processor busy for a while.
    #[arg(long, global = true, default_value_t = 0.1)]
    busy_rate: f64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the access points the co-processor can see.
    Scan,
    /// Resolve a hostname through the co-processor.
    Resolve {
        #[arg(default_value = ECHO_HOST)]
        host: String,
    },
    /// Send a message to an echo peer and print the reply.
    Echo {
        #[arg(default_value = ECHO_HOST)]
        host: String,
        #[arg(default_value_t = 7)]
        port: u16,
        #[arg(default_value = "hello from airlift")]
        message: String,
        /// Use a datagram socket.
        #[arg(long, conflicts_with = "tls")]
        udp: bool,
        /// Let the co-processor wrap the stream in TLS.
        #[arg(long)]
        tls: bool,
    },
    /// Listen, accept one emulated client, and echo what it sent.
    Serve {
        #[arg(default_value_t = 8080)]
        port: u16,
        /// Payload the emulated client sends after connecting.
        #[arg(long, default_value = "GET / HTTP/1.0\r\n\r\n")]
        payload: String,
    },
}

fn main() -> Result<()> {
    // RUST_LOG controls verbosity.
    env_logger::init();

    let cli = Cli::parse();
    let pool = build_pool(&cli)?;

    match &cli.command {
        Command::Scan => scan(&pool),
        Command::Resolve { host } => resolve(&pool, host),
        Command::Echo {
            host,
            port,
            message,
            udp,
            tls,
        } => echo(&pool, &cli, host, *port, message, *udp, *tls),
        Command::Serve { port, payload } => serve(&pool, &cli, *port, payload),
    }
}

fn build_pool(cli: &Cli) -> Result<DemoPool> {
    if !(0.0..=1.0).contains(&cli.busy_rate) {
        bail!("--busy-rate must be between 0 and 1");
    }
    let emulator = Emulator::new()
        .with_host(ECHO_HOST, Ipv4Addr::new(10, 0, 0, 7))
        .with_network(DEMO_NETWORK, DEMO_PASSPHRASE);
    let mut bus = SimulatedBus::with_config(
        emulator,
        SimulatorConfig {
            busy_rate: cli.busy_rate,
            max_busy_polls: 8,
            lock_contention: 0,
            seed: cli.seed,
        },
    );
    // Nothing here inspects past traffic.
    bus.set_history_limit(0);

    let mut radio = Radio::new(bus, StdPlatform::new(), LinkConfig::default());
    log::info!("firmware {}", radio.firmware_version().context("reading firmware version")?);
    radio
        .connect(DEMO_NETWORK, DEMO_PASSPHRASE, 0)
        .with_context(|| format!("joining {DEMO_NETWORK}"))?;
    let address = radio.ipv4_address()?;
    log::info!("joined {} as {} ({})", DEMO_NETWORK, address, radio.hostname()?);

    let poll = PollConfig {
        interval_ms: cli.poll_interval_ms,
        default_timeout: Timeout::from_millis(cli.timeout_ms),
    };
    Ok(SocketPool::new(Rc::new(RefCell::new(radio)), poll))
}

fn scan(pool: &DemoPool) -> Result<()> {
    let networks = pool.radio().borrow_mut().scan_networks().context("scanning")?;
    for network in networks {
        let rssi = network.rssi.map_or("?".to_string(), |r| format!("{r} dBm"));
        let channel = network.channel.map_or("?".to_string(), |c| c.to_string());
        let auth = network.auth_mode.map_or("?".to_string(), |a| format!("{a:?}"));
        println!("{:<32} ch {:>2}  {:>8}  {}", network.ssid, channel, rssi, auth);
    }
    Ok(())
}

fn resolve(pool: &DemoPool, host: &str) -> Result<()> {
    for info in pool.getaddrinfo(host, 0).with_context(|| format!("resolving {host}"))? {
        println!("{host} -> {}", info.addr.ip());
    }
    Ok(())
}

fn echo(pool: &DemoPool, cli: &Cli, host: &str, port: u16, message: &str, udp: bool, tls: bool) -> Result<()> {
    let mut buf = vec![0u8; message.len().max(1)];

    if udp {
        let mut sock = pool.socket(AddressFamily::Inet, SocketType::Dgram, proto::IPPROTO_UDP)?;
        sock.set_timeout_ms(cli.timeout_ms);
        sock.sendto(message.as_bytes(), host, port)
            .with_context(|| format!("sending to {host}:{port}"))?;
        let (n, from) = sock.recvfrom_into(&mut buf).context("waiting for the echo")?;
        println!("{} bytes from {}: {}", n, from, String::from_utf8_lossy(&buf[..n]));
        sock.close()?;
        return Ok(());
    }

    let mut sock = pool.socket(AddressFamily::Inet, SocketType::Stream, proto::IPPROTO_TCP)?;
    sock.set_timeout_ms(cli.timeout_ms);
    let connected = if tls {
        sock.connect_tls(host, port)
    } else {
        sock.connect(host, port)
    };
    connected.with_context(|| format!("connecting to {host}:{port}"))?;

    send_all(&mut sock, message.as_bytes())?;
    let n = sock.recv_into(&mut buf).context("waiting for the echo")?;
    if n == 0 {
        bail!("no reply from {host}:{port} within {} ms", cli.timeout_ms);
    }
    println!("{}", String::from_utf8_lossy(&buf[..n]));
    println!("connected: {}", sock.is_connected()?);
    sock.close()?;
    Ok(())
}

fn serve(pool: &DemoPool, cli: &Cli, port: u16, payload: &str) -> Result<()> {
    let mut server = pool.socket(AddressFamily::Inet, SocketType::Stream, proto::IPPROTO_TCP)?;
    server.set_timeout_ms(cli.timeout_ms);
    server.bind("0.0.0.0", port)?;
    server.listen(1)?;
    println!("listening on port {port}");

    let peer = SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 42), 49152);
    pool.radio()
        .borrow_mut()
        .bus_mut()
        .responder_mut()
        .inject_connection(port, peer, payload.as_bytes())
        .context("emulated client could not connect")?;

    let mut conn = server.accept().context("accepting")?;
    let mut buf = vec![0u8; payload.len().max(1)];
    let n = conn.recv_into(&mut buf)?;
    println!("#{} from {}: {:?}", conn.num(), peer, String::from_utf8_lossy(&buf[..n]));
    let sent = conn.send(&buf[..n])?;
    println!("echoed {sent} bytes");
    conn.close()?;
    Ok(())
}

/// Send all of `data` on a stream socket, failing if the peer stops taking
/// bytes.
fn send_all<B: Bus, P: Platform>(sock: &mut Socket<B, P>, data: &[u8]) -> Result<()> {
    let mut sent = 0;
    while sent < data.len() {
        let n = sock.send(&data[sent..])?;
        if n == 0 {
            bail!("send stalled with {} of {} bytes written", sent, data.len());
        }
        sent += n;
    }
    Ok(())
}
