// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Command catalog and dispatcher.
//!
//! Every exchange follows the same sequence: the request buffer is cleared
//! and seeded with the command code, the handler appends its request fields
//! and performs the round trip, then the returned status word is validated.
//! Parameter blocks read from or written to the device are only committed to
//! the [`DeviceParameterState`] once all of that has succeeded.

use crate::{
    error::Error,
    params::{FrontendParameters, InfoParameters, RadarParameters, RadarResolution, StreamConfig},
    session::{check_status, status, Session},
    transport::Transport,
};
use log::debug;
use std::{fmt, str::FromStr, time::SystemTime};

/// Commands understood by the device.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Command {
    /// Read the current error masks.
    GetErrors = 0xE000,
    /// Read the logged error masks.
    GetErrorLogs = 0xE001,
    ResetErrorLogs = 0xE002,
    /// Read the time-stamped error log table.
    GetErrorLogTable = 0xE003,
    ResetErrorLogTable = 0xE004,
    /// Device number, frontend and firmware identification.
    Info = 0x0001,
    GetSysTime = 0x0003,
    GetRadarParams = 0x000A,
    /// Apply radar parameters without storing them in EEPROM.
    SetRadarParamsNoEep = 0x800B,
    GetRadarResolution = 0x000D,
    GetFrontendParams = 0x0010,
    /// Apply frontend parameters without storing them in EEPROM.
    SetFrontendParamsNoEep = 0x8011,
    GetStream = 0x0023,
    StartEthernetStream = 0x0024,
    StopEthernetStream = 0x0025,
    GetMultiDataStream = 0x0027,
    ConfigureStream = 0x0028,
    TriggerStream = 0x0029,
}

impl Command {
    pub const ALL: [Command; 18] = [
        Command::GetErrors,
        Command::GetErrorLogs,
        Command::ResetErrorLogs,
        Command::GetErrorLogTable,
        Command::ResetErrorLogTable,
        Command::Info,
        Command::GetSysTime,
        Command::GetRadarParams,
        Command::SetRadarParamsNoEep,
        Command::GetRadarResolution,
        Command::GetFrontendParams,
        Command::SetFrontendParamsNoEep,
        Command::GetStream,
        Command::StartEthernetStream,
        Command::StopEthernetStream,
        Command::GetMultiDataStream,
        Command::ConfigureStream,
        Command::TriggerStream,
    ];

    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn name(self) -> &'static str {
        match self {
            Command::GetErrors => "get_errors",
            Command::GetErrorLogs => "get_error_logs",
            Command::ResetErrorLogs => "reset_error_logs",
            Command::GetErrorLogTable => "get_error_log_table",
            Command::ResetErrorLogTable => "reset_error_log_table",
            Command::Info => "info",
            Command::GetSysTime => "get_sys_time",
            Command::GetRadarParams => "get_radar_params",
            Command::SetRadarParamsNoEep => "set_radar_params_no_eep",
            Command::GetRadarResolution => "get_radar_resolution",
            Command::GetFrontendParams => "get_frontend_params",
            Command::SetFrontendParamsNoEep => "set_frontend_params_no_eep",
            Command::GetStream => "get_stream",
            Command::StartEthernetStream => "start_ethernet_stream",
            Command::StopEthernetStream => "stop_ethernet_stream",
            Command::GetMultiDataStream => "get_multi_data_stream",
            Command::ConfigureStream => "configure_stream",
            Command::TriggerStream => "trigger_stream",
        }
    }

    pub fn from_code(code: u16) -> Option<Command> {
        Command::ALL.into_iter().find(|cmd| cmd.code() == code)
    }

    /// Case-insensitive lookup, the `cmd_` prefix is optional.
    pub fn from_name(name: &str) -> Option<Command> {
        let name = name.to_ascii_lowercase();
        let name = name.strip_prefix("cmd_").unwrap_or(&name);
        Command::ALL.into_iter().find(|cmd| cmd.name() == name)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Accepts a command name or its numeric code, either `0x` prefixed hex or
/// decimal.
impl FromStr for Command {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let code = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => u16::from_str_radix(hex, 16).ok(),
            None => s.parse::<u16>().ok(),
        };

        match code {
            Some(code) => Command::from_code(code),
            None => Command::from_name(s),
        }
        .ok_or_else(|| Error::UnknownCommand(s.to_string()))
    }
}

impl clap::ValueEnum for Command {
    fn value_variants<'a>() -> &'a [Self] {
        &Command::ALL
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(clap::builder::PossibleValue::new(self.name()))
    }
}

impl Command {
    /// Command line value: a catalog name through [`clap::ValueEnum`], or a
    /// numeric code.
    pub fn parse_arg(arg: &str) -> Result<Command, Error> {
        <Command as clap::ValueEnum>::from_str(arg, true).or_else(|_| arg.parse())
    }
}

/// A command together with its request fields.
#[derive(Clone, Debug, PartialEq)]
pub enum Request {
    GetErrors,
    GetErrorLogs,
    ResetErrorLogs { mask: u16 },
    GetErrorLogTable,
    ResetErrorLogTable,
    Info,
    GetSysTime,
    GetRadarParams,
    /// `None` resends the cached parameters.
    SetRadarParams(Option<RadarParameters>),
    GetRadarResolution,
    GetFrontendParams,
    /// `None` resends the cached parameters.
    SetFrontendParams(Option<FrontendParameters>),
    GetStream {
        mask: u16,
        opt: u16,
    },
    StartEthernetStream(StreamConfig),
    StopEthernetStream {
        port_type: u16,
        port: u16,
    },
    GetMultiDataStream {
        mask: u16,
        data_mask: u16,
        chirp: u16,
        range_bin: u16,
        doppler_format: u16,
    },
    ConfigureStream(StreamConfig),
    TriggerStream {
        /// Milliseconds since the epoch, `None` for now.
        time_ms: Option<u64>,
        time_mode: u16,
        delay_index: u16,
    },
}

impl Request {
    pub fn command(&self) -> Command {
        match self {
            Request::GetErrors => Command::GetErrors,
            Request::GetErrorLogs => Command::GetErrorLogs,
            Request::ResetErrorLogs { .. } => Command::ResetErrorLogs,
            Request::GetErrorLogTable => Command::GetErrorLogTable,
            Request::ResetErrorLogTable => Command::ResetErrorLogTable,
            Request::Info => Command::Info,
            Request::GetSysTime => Command::GetSysTime,
            Request::GetRadarParams => Command::GetRadarParams,
            Request::SetRadarParams(_) => Command::SetRadarParamsNoEep,
            Request::GetRadarResolution => Command::GetRadarResolution,
            Request::GetFrontendParams => Command::GetFrontendParams,
            Request::SetFrontendParams(_) => Command::SetFrontendParamsNoEep,
            Request::GetStream { .. } => Command::GetStream,
            Request::StartEthernetStream(_) => Command::StartEthernetStream,
            Request::StopEthernetStream { .. } => Command::StopEthernetStream,
            Request::GetMultiDataStream { .. } => Command::GetMultiDataStream,
            Request::ConfigureStream(_) => Command::ConfigureStream,
            Request::TriggerStream { .. } => Command::TriggerStream,
        }
    }
}

/// Request with default arguments for the command.
impl From<Command> for Request {
    fn from(command: Command) -> Request {
        match command {
            Command::GetErrors => Request::GetErrors,
            Command::GetErrorLogs => Request::GetErrorLogs,
            Command::ResetErrorLogs => Request::ResetErrorLogs { mask: 0xFFFF },
            Command::GetErrorLogTable => Request::GetErrorLogTable,
            Command::ResetErrorLogTable => Request::ResetErrorLogTable,
            Command::Info => Request::Info,
            Command::GetSysTime => Request::GetSysTime,
            Command::GetRadarParams => Request::GetRadarParams,
            Command::SetRadarParamsNoEep => Request::SetRadarParams(None),
            Command::GetRadarResolution => Request::GetRadarResolution,
            Command::GetFrontendParams => Request::GetFrontendParams,
            Command::SetFrontendParamsNoEep => Request::SetFrontendParams(None),
            Command::GetStream => Request::GetStream { mask: 0, opt: 0 },
            Command::StartEthernetStream => Request::StartEthernetStream(StreamConfig::default()),
            Command::StopEthernetStream => Request::StopEthernetStream {
                port_type: 3,
                port: 0,
            },
            Command::GetMultiDataStream => Request::GetMultiDataStream {
                mask: 0,
                data_mask: 0,
                chirp: 0,
                range_bin: 0,
                doppler_format: 0,
            },
            Command::ConfigureStream => Request::ConfigureStream(StreamConfig::default()),
            Command::TriggerStream => Request::TriggerStream {
                time_ms: None,
                time_mode: 0,
                delay_index: 0,
            },
        }
    }
}

/// Global error mask followed by the 16 per-group masks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ErrorMasks {
    pub global: u16,
    pub masks: [u16; 16],
}

/// One row of the device error log table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ErrorLogEntry {
    /// Device time [ms].
    pub time_ms: u64,
    pub error: u16,
}

/// Decoded command response.
#[derive(Clone, Debug, PartialEq)]
pub enum Response {
    /// The command returns no payload.
    Done,
    ErrorMasks(ErrorMasks),
    ErrorLog(Vec<ErrorLogEntry>),
    Info(InfoParameters),
    SysTime(u64),
    RadarParams(RadarParameters),
    Resolution(RadarResolution),
    FrontendParams(FrontendParameters),
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Response::Done => write!(f, "ok"),
            Response::ErrorMasks(masks) => {
                write!(f, "global: 0x{:04X} masks:", masks.global)?;
                for mask in masks.masks {
                    write!(f, " 0x{:04X}", mask)?;
                }
                Ok(())
            }
            Response::ErrorLog(entries) => {
                write!(f, "{} entries", entries.len())?;
                for entry in entries {
                    write!(f, "\n{} ms: 0x{:04X}", entry.time_ms, entry.error)?;
                }
                Ok(())
            }
            Response::Info(info) => write!(f, "{}", info),
            Response::SysTime(time) => write!(f, "{}", time),
            Response::RadarParams(params) => write!(f, "{}", params),
            Response::Resolution(res) => write!(
                f,
                "If: {} Range: {} Doppler: {} Speed: {}",
                res.intermediate_frequency, res.range, res.doppler, res.speed
            ),
            Response::FrontendParams(params) => write!(f, "{}", params),
        }
    }
}

/// Cached copies of the device parameter blocks.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeviceParameterState {
    pub info: InfoParameters,
    pub radar: RadarParameters,
    pub frontend: FrontendParameters,
}

/// Parameter block waiting for the exchange to succeed.
enum Staged {
    Nothing,
    Info(InfoParameters),
    Radar(RadarParameters),
    Frontend(FrontendParameters),
}

/// Largest error log table the device returns.
const ERROR_LOG_TABLE_SIZE: usize = 100 * (8 + 2) + 2;

/// Runs catalog commands over a [`Session`] and keeps the cached parameter
/// state in sync with the device.
pub struct Dispatcher<T: Transport> {
    session: Session<T>,
    state: DeviceParameterState,
}

impl<T: Transport> Dispatcher<T> {
    pub fn new(session: Session<T>) -> Dispatcher<T> {
        Dispatcher {
            session,
            state: DeviceParameterState::default(),
        }
    }

    pub fn with_state(session: Session<T>, state: DeviceParameterState) -> Dispatcher<T> {
        Dispatcher { session, state }
    }

    pub fn session(&self) -> &Session<T> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session<T> {
        &mut self.session
    }

    pub fn state(&self) -> &DeviceParameterState {
        &self.state
    }

    pub fn into_parts(self) -> (Session<T>, DeviceParameterState) {
        (self.session, self.state)
    }

    /// Whether the device accepted the parameters of the last command.
    pub fn params_accepted(&self) -> bool {
        self.session.status() & status::WRONG_RX_DATA == 0
    }

    /// Whether an acute or logged global error is pending on the device.
    pub fn has_radar_error(&self) -> bool {
        self.session.status() & (status::ACUTE_GLOBAL_ERROR | status::GLOBAL_ERROR_LOGGED) != 0
    }

    /// Runs a command given by name or code with its default arguments.
    pub async fn execute_cmd(&mut self, command: &str) -> Result<Response, Error> {
        let command = command.parse::<Command>()?;
        self.execute(Request::from(command)).await
    }

    pub async fn execute(&mut self, request: Request) -> Result<Response, Error> {
        let command = request.command();
        debug!("execute {} (0x{:04X})", command, command.code());

        self.session.begin(command.code());
        let (response, staged) = self.handle(request).await?;
        check_status(command.code(), self.session.status())?;

        match staged {
            Staged::Nothing => (),
            Staged::Info(info) => self.state.info = info,
            Staged::Radar(radar) => self.state.radar = radar,
            Staged::Frontend(frontend) => self.state.frontend = frontend,
        }

        Ok(response)
    }

    async fn handle(&mut self, request: Request) -> Result<(Response, Staged), Error> {
        let session = &mut self.session;

        match request {
            Request::GetErrors | Request::GetErrorLogs => {
                session.transceive(34, false).await?;
                let global = session.rx_u16()?;
                let mut masks = [0; 16];
                for mask in masks.iter_mut() {
                    *mask = session.rx_u16()?;
                }
                Ok((Response::ErrorMasks(ErrorMasks { global, masks }), Staged::Nothing))
            }
            Request::ResetErrorLogs { mask } => {
                session.tx_u16(mask);
                session.transceive(0, false).await?;
                Ok((Response::Done, Staged::Nothing))
            }
            Request::GetErrorLogTable => {
                let n = session.transceive(ERROR_LOG_TABLE_SIZE, true).await?;
                if n < 2 {
                    return Err(Error::ShortRead {
                        expected: 2,
                        received: n,
                    });
                }
                let count = session.rx_u16()?;
                let mut entries = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    entries.push(ErrorLogEntry {
                        time_ms: session.rx_u64()?,
                        error: session.rx_u16()?,
                    });
                }
                Ok((Response::ErrorLog(entries), Staged::Nothing))
            }
            Request::ResetErrorLogTable => {
                session.transceive(0, false).await?;
                Ok((Response::Done, Staged::Nothing))
            }
            Request::Info => {
                session.transceive(InfoParameters::SIZE, false).await?;
                let info = session.rx_with(InfoParameters::read)?;
                Ok((Response::Info(info.clone()), Staged::Info(info)))
            }
            Request::GetSysTime => {
                session.transceive(8, false).await?;
                Ok((Response::SysTime(session.rx_u64()?), Staged::Nothing))
            }
            Request::GetRadarParams => {
                session.transceive(RadarParameters::SIZE, false).await?;
                let params = session.rx_with(RadarParameters::read)?;
                Ok((Response::RadarParams(params.clone()), Staged::Radar(params)))
            }
            Request::SetRadarParams(params) => {
                let mut buf = Vec::with_capacity(RadarParameters::SIZE);
                params.as_ref().unwrap_or(&self.state.radar).write(&mut buf);
                session.tx_bytes(&buf);
                session.transceive(0, false).await?;
                Ok((Response::Done, params.map_or(Staged::Nothing, Staged::Radar)))
            }
            Request::GetRadarResolution => {
                session.transceive(RadarResolution::SIZE, false).await?;
                let res = session.rx_with(RadarResolution::read)?;
                Ok((Response::Resolution(res), Staged::Nothing))
            }
            Request::GetFrontendParams => {
                session.transceive(FrontendParameters::SIZE, false).await?;
                let params = session.rx_with(FrontendParameters::read)?;
                Ok((
                    Response::FrontendParams(params.clone()),
                    Staged::Frontend(params),
                ))
            }
            Request::SetFrontendParams(params) => {
                let mut buf = Vec::with_capacity(FrontendParameters::SIZE);
                params.as_ref().unwrap_or(&self.state.frontend).write(&mut buf);
                session.tx_bytes(&buf);
                session.transceive(0, false).await?;
                Ok((Response::Done, params.map_or(Staged::Nothing, Staged::Frontend)))
            }
            Request::GetStream { mask, opt } => {
                session.tx_u16(mask);
                session.tx_u16(opt);
                session.transceive(0, false).await?;
                Ok((Response::Done, Staged::Nothing))
            }
            Request::StartEthernetStream(config) => {
                session.tx_u16(config.mask);
                session.tx_u16(config.start_option(self.state.radar.processing));
                session.tx_u16(config.enet_type);
                session.tx_u16(config.port);
                session.tx_bytes(&config.ip.octets());
                session.tx_u16(config.own_port);
                session.transceive(0, false).await?;
                Ok((Response::Done, Staged::Nothing))
            }
            Request::StopEthernetStream { port_type, port } => {
                session.tx_u16(port_type);
                session.tx_u16(port);
                session.transceive(0, false).await?;
                Ok((Response::Done, Staged::Nothing))
            }
            Request::GetMultiDataStream {
                mask,
                data_mask,
                chirp,
                range_bin,
                doppler_format,
            } => {
                session.tx_u16(mask);
                session.tx_u16(data_mask);
                session.tx_u16(chirp);
                session.tx_u16(range_bin);
                session.tx_u16(doppler_format);
                session.transceive(0, false).await?;
                Ok((Response::Done, Staged::Nothing))
            }
            Request::ConfigureStream(config) => {
                session.tx_u16(config.data_mode);
                session.tx_u16(config.meas_mode);
                for delay in config.delays {
                    session.tx_u32(delay);
                }
                session.tx_u16(config.mask);
                session.tx_u16(config.data_mask);
                session.tx_u16(config.chirp_range);
                session.tx_u16(config.range_bin);
                session.tx_u16(config.doppler_format);
                session.transceive(0, false).await?;
                Ok((Response::Done, Staged::Nothing))
            }
            Request::TriggerStream {
                time_ms,
                time_mode,
                delay_index,
            } => {
                let time_ms = time_ms.unwrap_or_else(|| {
                    SystemTime::now()
                        .duration_since(SystemTime::UNIX_EPOCH)
                        .map(|d| d.as_millis() as u64)
                        .unwrap_or_default()
                });
                session.tx_u64(time_ms);
                session.tx_u16(time_mode);
                session.tx_u16(delay_index);
                session.transceive(0, false).await?;
                Ok((Response::Done, Staged::Nothing))
            }
        }
    }

    pub async fn info(&mut self) -> Result<InfoParameters, Error> {
        self.execute(Request::Info).await?;
        Ok(self.state.info.clone())
    }

    pub async fn radar_params(&mut self) -> Result<RadarParameters, Error> {
        self.execute(Request::GetRadarParams).await?;
        Ok(self.state.radar.clone())
    }

    pub async fn set_radar_params(&mut self, params: RadarParameters) -> Result<(), Error> {
        self.execute(Request::SetRadarParams(Some(params))).await?;
        Ok(())
    }

    pub async fn frontend_params(&mut self) -> Result<FrontendParameters, Error> {
        self.execute(Request::GetFrontendParams).await?;
        Ok(self.state.frontend.clone())
    }

    pub async fn set_frontend_params(&mut self, params: FrontendParameters) -> Result<(), Error> {
        self.execute(Request::SetFrontendParams(Some(params))).await?;
        Ok(())
    }
}
