//! Route broker daemon.
//!
//! Sits between a route producer (a routing stack speaking FPM) and its
//! consumers: accepts one FPM connection, publishes every route into the
//! broker at the right priority, and serves dataplanes that attach through
//! the control socket. Optionally runs a kernel-style echo consumer.

use std::net::{SocketAddr, TcpListener};

use clap::Parser;
use log::{debug, error, info, LevelFilter};
use route_broker::{BrokerConfig, RouteBroker};

mod dataplane;
mod error;
mod fpm;
mod kernel;
mod netlink;

use dataplane::{DataplaneConfig, DataplaneCtrl};
use fpm::{FpmReader, FPM_DEFAULT_PORT};
use kernel::KernelClient;

/// Route broker daemon command line arguments.
#[derive(Parser, Debug)]
#[command(name = "route-brokerd")]
#[command(about = "Brokers routes from an FPM stream to dataplane consumers")]
struct Args {
    /// Address to accept the FPM connection on
    #[arg(long, default_value_t = fpm_default_addr())]
    fpm_addr: SocketAddr,

    /// Dataplane control socket address
    #[arg(long, default_value = "127.0.0.1:5907")]
    ctrl_addr: SocketAddr,

    /// Base address for per-dataplane data sockets (port is ephemeral)
    #[arg(long, default_value = "127.0.0.1:0")]
    data_addr: SocketAddr,

    /// Payload format tag announced to dataplanes
    #[arg(long, default_value_t = 0)]
    data_format: u32,

    /// Echo every brokered route through a kernel-style consumer
    #[arg(long)]
    kernel_echo: bool,

    /// Debug logging, including a broker dump after each FPM batch
    #[arg(short, long)]
    debug: bool,
}

fn fpm_default_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], FPM_DEFAULT_PORT))
}

fn main() -> std::process::ExitCode {
    let args = Args::parse();

    env_logger::Builder::from_default_env()
        .filter_level(if args.debug {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        })
        .init();

    match run(args) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            std::process::ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let broker = RouteBroker::new(BrokerConfig::default())?;

    let dataplane = DataplaneCtrl::spawn(
        DataplaneConfig {
            ctrl_addr: args.ctrl_addr,
            data_addr: args.data_addr,
            data_format: args.data_format,
        },
        broker.clone(),
    )?;
    info!("dataplane control ready on {}", dataplane.local_addr());

    let kernel = if args.kernel_echo {
        Some(KernelClient::spawn(&broker, |notice| {
            debug!(
                "kernel echo: {} {} bytes",
                if notice.is_delete() { "del" } else { "add" },
                notice.payload().len()
            );
            Ok(())
        })?)
    } else {
        None
    };

    let result = fpm_loop(&broker, &args);

    // stop consumers so their broker clients unregister cleanly
    if let Some(kernel) = kernel {
        kernel.shutdown();
    }
    dataplane.shutdown();
    result
}

fn fpm_loop(
    broker: &RouteBroker<netlink::NlRouteMessage>,
    args: &Args,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind(args.fpm_addr)?;
    info!("listening for FPM connection on {}", listener.local_addr()?);

    loop {
        let (stream, peer) = listener.accept()?;
        info!("connected to FPM at {peer}");

        let mut reader = FpmReader::new(stream);
        loop {
            match reader.read_message() {
                Ok(Some(payload)) => {
                    fpm::publish_netlink_batch(broker, &payload);
                    if args.debug {
                        let mut out = String::new();
                        if broker.show(&mut out).is_ok() {
                            debug!("broker state:\n{out}");
                        }
                    }
                }
                Ok(None) => {
                    info!("FPM connection closed");
                    break;
                }
                Err(err) => {
                    error!("FPM stream error: {err}");
                    break;
                }
            }
        }
        // wait for the routing stack to reconnect and replay its table
    }
}
