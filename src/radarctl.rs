// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use clap::Parser;
use log::{debug, info, warn};
use radarwire::{
    command::{Command, Dispatcher, Request},
    session::Session,
    settings::{save_info, RadarSettings},
    transport::{
        EnetConfig, TcpTransport, Transport, UdpTransport, DEFAULT_IP, DEFAULT_TCP_PORT,
        DEFAULT_UDP_HOST_PORT, DEFAULT_UDP_PORT,
    },
};
use std::{net::Ipv4Addr, path::PathBuf, time::Duration};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Radar IP address
    #[arg(long, env = "RADAR_HOST", default_value_t = DEFAULT_IP)]
    host: Ipv4Addr,

    /// Radar port, defaults to the factory port of the selected transport
    #[arg(long, env = "RADAR_PORT")]
    port: Option<u16>,

    /// Use UDP instead of TCP
    #[arg(long)]
    udp: bool,

    /// Local UDP port
    #[arg(long, default_value_t = DEFAULT_UDP_HOST_PORT)]
    own_port: u16,

    /// Seal requests and verify responses with CRC16
    #[arg(long)]
    crc: bool,

    /// Connect, read and write timeout in seconds
    #[arg(long, default_value = "30")]
    timeout: f64,

    /// Command to run, by name or code (e.g. get_radar_params or 0x000A)
    #[arg(short, long, value_parser = Command::parse_arg)]
    command: Option<Command>,

    /// Print the device information
    #[arg(short, long)]
    info: bool,

    /// Print the radar and frontend parameters
    #[arg(short, long)]
    params: bool,

    /// Apply radar settings from a JSON file
    #[arg(long)]
    load: Option<PathBuf>,

    /// Save the current radar settings to a JSON file
    #[arg(long)]
    save: Option<PathBuf>,
}

async fn run<T: Transport>(transport: T, args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = Session::new(transport, args.crc);
    session.open().await?;
    let mut dispatcher = Dispatcher::new(session);

    if args.info {
        println!("{}", dispatcher.info().await?);
    }

    if let Some(path) = &args.load {
        let settings = RadarSettings::load(path)?;
        debug!("{}", settings.configuration()?);

        dispatcher
            .set_radar_params(settings.radar_processing.clone())
            .await?;
        if !dispatcher.params_accepted() {
            warn!("radar parameters not accepted");
        }

        dispatcher.set_frontend_params(settings.frontend).await?;
        if !dispatcher.params_accepted() {
            warn!("frontend parameters not accepted");
        }
        info!("applied settings from {}", path.display());
    }

    if args.params {
        let radar = dispatcher.radar_params().await?;
        let frontend = dispatcher.frontend_params().await?;
        println!("{}", radar);
        println!("{}", frontend.summary(&radar));
    }

    if let Some(command) = args.command {
        let response = dispatcher.execute(Request::from(command)).await?;
        println!("{}: {}", command, response);
    }

    if let Some(path) = &args.save {
        let radar = dispatcher.radar_params().await?;
        let frontend = dispatcher.frontend_params().await?;
        RadarSettings::new(radar, frontend).save(path)?;
        if args.info {
            let info_path = path.with_file_name("radar_info.json");
            save_info(&info_path, &dispatcher.state().info)?;
        }
        info!("saved settings to {}", path.display());
    }

    if dispatcher.has_radar_error() {
        warn!("device reports an outstanding error, see get_errors");
    }

    dispatcher.session_mut().close();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let default_port = match args.udp {
        true => DEFAULT_UDP_PORT,
        false => DEFAULT_TCP_PORT,
    };
    let config = EnetConfig {
        ip: args.host,
        port: args.port.unwrap_or(default_port),
        own_port: args.own_port,
        timeout: Duration::from_secs_f64(args.timeout),
    };
    debug!("connecting to {}", config.device_addr());

    match args.udp {
        true => run(UdpTransport::new(config), &args).await,
        false => run(TcpTransport::new(config), &args).await,
    }
}
