// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Device parameter blocks exchanged by the get/set commands.
//!
//! Field names and order follow the device's wire layout, every block is
//! encoded big-endian with the widths listed on each field.

use crate::{cursor::ByteReader, error::Error};
use serde::{Deserialize, Serialize};
use std::{fmt, net::Ipv4Addr};

/// Speed of light [m/s].
pub const C0: f64 = 299_792_458.0;

/// Maximum number of receive channels.
pub const MAX_RX_CHAN: u32 = 4;
/// Maximum number of receive channels in TD-MIMO mode.
pub const MAX_RX_CHAN_MIMO: u32 = 12;

/// Frontend code reported when no frontend is connected.
pub const FE_CODE_NO_FE: u32 = 0xFE00_0000;
/// Frontend code of the AWR1243 frontend.
pub const FE_CODE_AWR1243: u32 = 0xFE77_0001;

/// Processing steps performed by the radar core.
pub mod processing {
    pub const NO_PROCESSING: u16 = 0;
    pub const RANGE_FFT: u16 = 1;
    pub const DOPPLER_FFT: u16 = 2;
    pub const COMBINING: u16 = 3;
    pub const PEAK_DET: u16 = 4;
    pub const CFAR: u16 = 5;
    pub const DETECTIONS: u16 = 6;
    pub const TRACKING: u16 = 7;
}

/// FFT window functions.
pub mod window {
    pub const NONE: u16 = 0;
    pub const BLACKMAN: u16 = 1;
    pub const HAMMING: u16 = 2;
    pub const HANN: u16 = 3;
    pub const NUTTAL: u16 = 4;
}

/// Radar system speed estimation modes.
pub mod speed_estimation {
    pub const OFF: u16 = 0;
    pub const SPEED_ONLY: u16 = 1;
    pub const FILTER_ALL: u16 = 2;
    pub const FILTER_TRACKS: u16 = 3;
}

/// Transmit signal modulations.
pub mod signal_type {
    pub const CW_MIN_FREQUENCY: u16 = 1;
    pub const CW_MAX_FREQUENCY: u16 = 2;
    pub const FMCW_UP_RAMP: u16 = 3;
    pub const FMCW_DOWN_RAMP: u16 = 4;
    pub const FMCW_UP_DOWN_RAMP: u16 = 5;
    pub const FMCW_DOWN_UP_RAMP: u16 = 6;
}

/// Number of cube shapes the device supports.
pub const CUBE_COUNT: u16 = 21;
/// Index of the first TD-MIMO (3 TX × 4 RX) cube.
pub const CUBE_FIRST_MIMO: u16 = 15;
/// 512 samples per chirp, 128 chirps.
pub const CUBE_DEFAULT: u16 = 11;

/// Data cube dimensions selected by the `RadarCube` parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CubeShape {
    /// ADC samples per chirp.
    pub samples: u32,
    pub range_bins: u32,
    pub doppler_bins: u32,
}

const CUBES: [(u32, u32, u32); CUBE_COUNT as usize] = [
    (256, 256, 1),
    (512, 512, 1),
    (1024, 1024, 1),
    (2048, 2048, 1),
    (128, 64, 64),
    (128, 64, 128),
    (128, 64, 256),
    (256, 128, 64),
    (256, 128, 128),
    (256, 128, 256),
    (512, 256, 64),
    (512, 256, 128),
    (512, 256, 256),
    (1024, 512, 64),
    (1024, 512, 128),
    (256, 128, 64),
    (256, 128, 128),
    (256, 128, 256),
    (512, 256, 64),
    (512, 256, 128),
    (1024, 512, 64),
];

impl CubeShape {
    /// Looks up a cube index, `None` when out of range.
    pub fn from_index(cube: u16) -> Option<CubeShape> {
        CUBES
            .get(cube as usize)
            .map(|&(samples, range_bins, doppler_bins)| CubeShape {
                samples,
                range_bins,
                doppler_bins,
            })
    }
}

pub fn is_mimo_cube(cube: u16) -> bool {
    cube >= CUBE_FIRST_MIMO
}

/// Radar processing parameters (60 bytes on the wire).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RadarParameters {
    /// Data cube dimension, u16.
    pub radar_cube: u16,
    /// 0 or 1, u8.
    pub continuous_meas: u8,
    /// Timer interval [ms] (0 - 10000), u16.
    pub meas_interval: u16,
    pub processing: u16,
    pub range_win_func: u16,
    pub doppler_win_func: u16,
    /// Shift Doppler data when sending the cube, u8.
    pub doppler_fft_shift: u8,
    pub min_range_bin: u16,
    pub max_range_bin: u16,
    pub min_doppler_bin: i16,
    pub max_doppler_bin: i16,
    pub cfar_window_size: u16,
    pub cfar_guard_int: u16,
    pub range_cfar_thresh: u16,
    /// Threshold for the trigger pin, i16.
    pub trigger_thresh: i16,
    pub peak_search_thresh: u16,
    /// 0 off, 1 delete zero Doppler, 2 also delete its neighbors.
    pub suppress_static_targets: u16,
    pub max_targets: u16,
    /// At most `max_targets`.
    pub max_tracks: u16,
    /// [m/s]
    pub max_hor_speed: u16,
    /// [m/s]
    pub max_ver_speed: u16,
    /// [m/s²]
    pub max_accel: u16,
    /// [m/10]
    pub max_range_error: u16,
    pub min_confirm: u16,
    /// [m/10]
    pub target_size: u16,
    pub merge_limit: u16,
    /// u8.
    pub sector_filtering: u8,
    pub speed_estimation: u16,
    /// u8.
    pub dsp_doppler_proc: u8,
    /// Bitmask of channels sent in data read commands.
    pub rx_channels: u16,
    /// Bitmask: 0x1 range CFAR, 0x2 Doppler CFAR.
    pub cfar_select: u16,
    pub doppler_cfar_thresh: u16,
}

impl Default for RadarParameters {
    fn default() -> Self {
        RadarParameters {
            radar_cube: CUBE_DEFAULT,
            continuous_meas: 0,
            meas_interval: 0,
            processing: processing::RANGE_FFT,
            range_win_func: window::BLACKMAN,
            doppler_win_func: window::BLACKMAN,
            doppler_fft_shift: 1,
            min_range_bin: 0,
            max_range_bin: 255,
            min_doppler_bin: -64,
            max_doppler_bin: 63,
            cfar_window_size: 10,
            cfar_guard_int: 2,
            range_cfar_thresh: 8,
            trigger_thresh: 10,
            peak_search_thresh: 6,
            suppress_static_targets: 0,
            max_targets: 30,
            max_tracks: 10,
            max_hor_speed: 5,
            max_ver_speed: 1,
            max_accel: 10,
            max_range_error: 20,
            min_confirm: 2,
            target_size: 5,
            merge_limit: 15,
            sector_filtering: 0,
            speed_estimation: speed_estimation::OFF,
            dsp_doppler_proc: 0,
            rx_channels: 0xF,
            cfar_select: 1,
            doppler_cfar_thresh: 10,
        }
    }
}

impl RadarParameters {
    pub const SIZE: usize = 60;

    pub fn read(reader: &mut ByteReader) -> Result<RadarParameters, Error> {
        reader.section("radar parameters");
        Ok(RadarParameters {
            radar_cube: reader.u16()?,
            continuous_meas: reader.u8()?,
            meas_interval: reader.u16()?,
            processing: reader.u16()?,
            range_win_func: reader.u16()?,
            doppler_win_func: reader.u16()?,
            doppler_fft_shift: reader.u8()?,
            min_range_bin: reader.u16()?,
            max_range_bin: reader.u16()?,
            min_doppler_bin: reader.i16()?,
            max_doppler_bin: reader.i16()?,
            cfar_window_size: reader.u16()?,
            cfar_guard_int: reader.u16()?,
            range_cfar_thresh: reader.u16()?,
            trigger_thresh: reader.i16()?,
            peak_search_thresh: reader.u16()?,
            suppress_static_targets: reader.u16()?,
            max_targets: reader.u16()?,
            max_tracks: reader.u16()?,
            max_hor_speed: reader.u16()?,
            max_ver_speed: reader.u16()?,
            max_accel: reader.u16()?,
            max_range_error: reader.u16()?,
            min_confirm: reader.u16()?,
            target_size: reader.u16()?,
            merge_limit: reader.u16()?,
            sector_filtering: reader.u8()?,
            speed_estimation: reader.u16()?,
            dsp_doppler_proc: reader.u8()?,
            rx_channels: reader.u16()?,
            cfar_select: reader.u16()?,
            doppler_cfar_thresh: reader.u16()?,
        })
    }

    pub fn write(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.radar_cube.to_be_bytes());
        buf.push(self.continuous_meas);
        buf.extend_from_slice(&self.meas_interval.to_be_bytes());
        buf.extend_from_slice(&self.processing.to_be_bytes());
        buf.extend_from_slice(&self.range_win_func.to_be_bytes());
        buf.extend_from_slice(&self.doppler_win_func.to_be_bytes());
        buf.push(self.doppler_fft_shift);
        buf.extend_from_slice(&self.min_range_bin.to_be_bytes());
        buf.extend_from_slice(&self.max_range_bin.to_be_bytes());
        buf.extend_from_slice(&self.min_doppler_bin.to_be_bytes());
        buf.extend_from_slice(&self.max_doppler_bin.to_be_bytes());
        buf.extend_from_slice(&self.cfar_window_size.to_be_bytes());
        buf.extend_from_slice(&self.cfar_guard_int.to_be_bytes());
        buf.extend_from_slice(&self.range_cfar_thresh.to_be_bytes());
        buf.extend_from_slice(&self.trigger_thresh.to_be_bytes());
        buf.extend_from_slice(&self.peak_search_thresh.to_be_bytes());
        buf.extend_from_slice(&self.suppress_static_targets.to_be_bytes());
        buf.extend_from_slice(&self.max_targets.to_be_bytes());
        buf.extend_from_slice(&self.max_tracks.to_be_bytes());
        buf.extend_from_slice(&self.max_hor_speed.to_be_bytes());
        buf.extend_from_slice(&self.max_ver_speed.to_be_bytes());
        buf.extend_from_slice(&self.max_accel.to_be_bytes());
        buf.extend_from_slice(&self.max_range_error.to_be_bytes());
        buf.extend_from_slice(&self.min_confirm.to_be_bytes());
        buf.extend_from_slice(&self.target_size.to_be_bytes());
        buf.extend_from_slice(&self.merge_limit.to_be_bytes());
        buf.push(self.sector_filtering);
        buf.extend_from_slice(&self.speed_estimation.to_be_bytes());
        buf.push(self.dsp_doppler_proc);
        buf.extend_from_slice(&self.rx_channels.to_be_bytes());
        buf.extend_from_slice(&self.cfar_select.to_be_bytes());
        buf.extend_from_slice(&self.doppler_cfar_thresh.to_be_bytes());
    }

    pub fn cube_shape(&self) -> Option<CubeShape> {
        CubeShape::from_index(self.radar_cube)
    }

    pub fn is_mimo(&self) -> bool {
        is_mimo_cube(self.radar_cube)
    }

    pub fn max_rx_channels(&self) -> u32 {
        if self.is_mimo() {
            MAX_RX_CHAN_MIMO
        } else {
            MAX_RX_CHAN
        }
    }

    pub fn active_rx_channels(&self) -> u32 {
        if self.is_mimo() {
            (self.rx_channels & 0xFFF).count_ones()
        } else {
            (self.rx_channels & 0xF).count_ones()
        }
    }

    /// Number of range bins in the trimmed window, may be zero or negative
    /// for an invalid window.
    pub fn active_range_bins(&self) -> i32 {
        self.max_range_bin as i32 - self.min_range_bin as i32 + 1
    }

    pub fn active_doppler_bins(&self) -> i32 {
        self.max_doppler_bin as i32 - self.min_doppler_bin as i32 + 1
    }
}

impl fmt::Display for RadarParameters {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "RadarCube: {}", self.radar_cube)?;
        writeln!(f, "ContinuousMeas: {}", self.continuous_meas)?;
        writeln!(f, "MeasInterval: {}", self.meas_interval)?;
        writeln!(f, "Processing: {}", self.processing)?;
        writeln!(f, "RangeWinFunc: {}", self.range_win_func)?;
        writeln!(f, "DopplerWinFunc: {}", self.doppler_win_func)?;
        writeln!(f, "DopplerFftShift: {}", self.doppler_fft_shift)?;
        writeln!(f, "MinRangeBin: {}", self.min_range_bin)?;
        writeln!(f, "MaxRangeBin: {}", self.max_range_bin)?;
        writeln!(f, "MinDopplerBin: {}", self.min_doppler_bin)?;
        writeln!(f, "MaxDopplerBin: {}", self.max_doppler_bin)?;
        writeln!(f, "CfarWindowSize: {}", self.cfar_window_size)?;
        writeln!(f, "CfarGuardInt: {}", self.cfar_guard_int)?;
        writeln!(f, "RangeCfarThresh: {}", self.range_cfar_thresh)?;
        writeln!(f, "TriggerThresh: {}", self.trigger_thresh)?;
        writeln!(f, "PeakSearchThresh: {}", self.peak_search_thresh)?;
        writeln!(f, "SuppressStaticTargets: {}", self.suppress_static_targets)?;
        writeln!(f, "MaxTargets: {}", self.max_targets)?;
        writeln!(f, "MaxTracks: {}", self.max_tracks)?;
        writeln!(f, "MaxHorSpeed: {}", self.max_hor_speed)?;
        writeln!(f, "MaxVerSpeed: {}", self.max_ver_speed)?;
        writeln!(f, "MaxAccel: {}", self.max_accel)?;
        writeln!(f, "MaxRangeError: {}", self.max_range_error)?;
        writeln!(f, "MinConfirm: {}", self.min_confirm)?;
        writeln!(f, "TargetSize: {}", self.target_size)?;
        writeln!(f, "MergeLimit: {}", self.merge_limit)?;
        writeln!(f, "SectorFiltering: {}", self.sector_filtering)?;
        writeln!(f, "SpeedEstimation: {}", self.speed_estimation)?;
        writeln!(f, "DspDopplerProc: {}", self.dsp_doppler_proc)?;
        writeln!(f, "RxChannels: 0x{:X}", self.rx_channels)?;
        writeln!(f, "CfarSelect: {}", self.cfar_select)?;
        writeln!(f, "DopplerCfarThresh: {}", self.doppler_cfar_thresh)?;
        if let Some(cube) = self.cube_shape() {
            writeln!(f, "ADC samples per chirp: {}", cube.samples)?;
            writeln!(f, "Range bins: {}", cube.range_bins)?;
            writeln!(f, "Doppler bins: {}", cube.doppler_bins)?;
        }
        writeln!(f, "Active range bins: {}", self.active_range_bins())?;
        write!(f, "Active doppler bins: {}", self.active_doppler_bins())
    }
}

/// RF frontend parameters (42 bytes on the wire).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FrontendParameters {
    /// Start frequency [kHz], u32.
    pub min_frequency: u32,
    /// Stop frequency [kHz], u32.
    pub max_frequency: u32,
    pub signal_type: u16,
    pub tx_channel_selection: u16,
    pub rx_channel_selection: u16,
    pub tx_power_setting: i16,
    pub rx_power_setting: i16,
    /// [ns], u32.
    pub ramp_init: u32,
    /// [ns], u32.
    pub ramp_time: u32,
    /// [ns], u32.
    pub ramp_reset: u32,
    /// [ns], u32.
    pub ramp_delay: u32,
    pub power_saving: i16,
    pub adc_frequency: i16,
    /// DC peak suppression [dB].
    pub dc_suppression: i16,
    pub range_offset: i16,
}

impl Default for FrontendParameters {
    fn default() -> Self {
        FrontendParameters {
            min_frequency: 0,
            max_frequency: 1,
            signal_type: 0,
            tx_channel_selection: 0,
            rx_channel_selection: 0,
            tx_power_setting: 0,
            rx_power_setting: 0,
            ramp_init: 0,
            ramp_time: 0,
            ramp_reset: 0,
            ramp_delay: 0,
            power_saving: 0,
            adc_frequency: 0,
            dc_suppression: 0,
            range_offset: 0,
        }
    }
}

impl FrontendParameters {
    pub const SIZE: usize = 42;

    /// Factory settings of the AWR1243 frontend: lower VCO band, one TX and
    /// four RX channels, 70 µs up-ramp.
    pub fn awr1243() -> FrontendParameters {
        FrontendParameters {
            min_frequency: 76_000_000,
            max_frequency: 77_000_000,
            signal_type: signal_type::FMCW_UP_RAMP,
            rx_channel_selection: 0xF,
            tx_channel_selection: 0x1,
            tx_power_setting: 0,
            rx_power_setting: 10,
            ramp_init: 0,
            ramp_time: 70_000,
            ramp_reset: 0,
            ramp_delay: 0,
            power_saving: 1,
            adc_frequency: 0,
            dc_suppression: 60,
            range_offset: 0,
        }
    }

    pub fn read(reader: &mut ByteReader) -> Result<FrontendParameters, Error> {
        reader.section("frontend parameters");
        Ok(FrontendParameters {
            min_frequency: reader.u32()?,
            max_frequency: reader.u32()?,
            signal_type: reader.u16()?,
            tx_channel_selection: reader.u16()?,
            rx_channel_selection: reader.u16()?,
            tx_power_setting: reader.i16()?,
            rx_power_setting: reader.i16()?,
            ramp_init: reader.u32()?,
            ramp_time: reader.u32()?,
            ramp_reset: reader.u32()?,
            ramp_delay: reader.u32()?,
            power_saving: reader.i16()?,
            adc_frequency: reader.i16()?,
            dc_suppression: reader.i16()?,
            range_offset: reader.i16()?,
        })
    }

    pub fn write(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.min_frequency.to_be_bytes());
        buf.extend_from_slice(&self.max_frequency.to_be_bytes());
        buf.extend_from_slice(&self.signal_type.to_be_bytes());
        buf.extend_from_slice(&self.tx_channel_selection.to_be_bytes());
        buf.extend_from_slice(&self.rx_channel_selection.to_be_bytes());
        buf.extend_from_slice(&self.tx_power_setting.to_be_bytes());
        buf.extend_from_slice(&self.rx_power_setting.to_be_bytes());
        buf.extend_from_slice(&self.ramp_init.to_be_bytes());
        buf.extend_from_slice(&self.ramp_time.to_be_bytes());
        buf.extend_from_slice(&self.ramp_reset.to_be_bytes());
        buf.extend_from_slice(&self.ramp_delay.to_be_bytes());
        buf.extend_from_slice(&self.power_saving.to_be_bytes());
        buf.extend_from_slice(&self.adc_frequency.to_be_bytes());
        buf.extend_from_slice(&self.dc_suppression.to_be_bytes());
        buf.extend_from_slice(&self.range_offset.to_be_bytes());
    }

    /// Duration of one chirp [s].
    pub fn chirp_time(&self) -> f64 {
        (self.ramp_init as f64 + self.ramp_time as f64 + self.ramp_reset as f64 + self.ramp_delay as f64)
            * 1e-9
    }

    /// Range resolution [m].
    pub fn range_resolution(&self) -> f64 {
        let div = 2.0 * (self.max_frequency as f64 - self.min_frequency as f64) * 1e3;
        if div == 0.0 {
            return 1.0;
        }
        C0 / div
    }

    /// Doppler resolution [Hz] over `chirps` chirps.
    pub fn doppler_resolution(&self, chirps: u32) -> f64 {
        let div = self.chirp_time() * chirps as f64;
        if div == 0.0 {
            return 1.0;
        }
        1.0 / div
    }

    /// Speed resolution [m/s] over `chirps` chirps.
    pub fn speed_resolution(&self, chirps: u32) -> f64 {
        let f0 = (self.min_frequency as f64 + self.max_frequency as f64) / 2.0 * 1e3;
        let div = 2.0 * f0 * self.chirp_time() * chirps as f64;
        if div == 0.0 {
            return 1.0;
        }
        C0 / div
    }

    /// IF resolution [Hz].
    pub fn if_resolution(&self) -> f64 {
        let chirp_time = self.chirp_time();
        if chirp_time == 0.0 {
            return 1.0;
        }
        1.0 / chirp_time
    }
}

impl fmt::Display for FrontendParameters {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Start frequency [kHz]: {}", self.min_frequency)?;
        writeln!(f, "Stop frequency [kHz]: {}", self.max_frequency)?;
        writeln!(f, "SignalType: {}", self.signal_type)?;
        writeln!(f, "RxChannelSelection: 0x{:X}", self.rx_channel_selection)?;
        writeln!(f, "TxChannelSelection: 0x{:X}", self.tx_channel_selection)?;
        writeln!(f, "TxPowerSetting: {}", self.tx_power_setting)?;
        writeln!(f, "RxPowerSetting: {}", self.rx_power_setting)?;
        writeln!(f, "RampInit: {}", self.ramp_init)?;
        writeln!(f, "RampTime: {}", self.ramp_time)?;
        writeln!(f, "RampReset: {}", self.ramp_reset)?;
        writeln!(f, "RampDelay: {}", self.ramp_delay)?;
        writeln!(f, "PowerSaving: {}", self.power_saving)?;
        writeln!(f, "AdcFrequency: {}", self.adc_frequency)?;
        writeln!(f, "DcSuppression: {}", self.dc_suppression)?;
        writeln!(f, "RangeOffset: {}", self.range_offset)?;
        writeln!(f, "Time of one chirp [us]: {:.3}", self.chirp_time() * 1e6)?;
        write!(f, "Range resolution [m]: {:.3}", self.range_resolution())
    }
}

/// Frontend block shown together with the speed resolution of the Doppler
/// bins the radar block selects.
pub struct FrontendSummary<'a> {
    frontend: &'a FrontendParameters,
    doppler_bins: Option<u32>,
}

impl FrontendParameters {
    pub fn summary<'a>(&'a self, radar: &RadarParameters) -> FrontendSummary<'a> {
        FrontendSummary {
            frontend: self,
            doppler_bins: radar.cube_shape().map(|shape| shape.doppler_bins),
        }
    }
}

impl fmt::Display for FrontendSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.frontend)?;
        if let Some(chirps) = self.doppler_bins {
            write!(
                f,
                "\nSpeed resolution [m/s]: {:.3}",
                self.frontend.speed_resolution(chirps)
            )?;
        }
        Ok(())
    }
}

/// Device identification returned by the info command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InfoParameters {
    pub device_number: u32,
    pub frontend_connected: u32,
    pub fw_version: u32,
    pub fw_revision: u32,
    pub fw_date: u32,
}

impl Default for InfoParameters {
    fn default() -> Self {
        InfoParameters {
            device_number: 0,
            frontend_connected: FE_CODE_NO_FE,
            fw_version: 0,
            fw_revision: 0,
            fw_date: 0,
        }
    }
}

impl InfoParameters {
    pub const SIZE: usize = 20;

    pub fn read(reader: &mut ByteReader) -> Result<InfoParameters, Error> {
        reader.section("info");
        Ok(InfoParameters {
            device_number: reader.u32()?,
            frontend_connected: reader.u32()?,
            fw_version: reader.u32()?,
            fw_revision: reader.u32()?,
            fw_date: reader.u32()?,
        })
    }

    /// `major.minor.patch`
    pub fn fw_version_string(&self) -> String {
        format!(
            "{}.{}.{}",
            (self.fw_version >> 16) & 0xFF,
            (self.fw_version >> 8) & 0xFF,
            self.fw_version & 0xFF
        )
    }

    /// `day.month.year`
    pub fn fw_date_string(&self) -> String {
        format!(
            "{}.{}.{}",
            (self.fw_date >> 24) & 0xFF,
            (self.fw_date >> 16) & 0xFF,
            self.fw_date & 0xFFFF
        )
    }

    pub fn frontend_name(&self) -> &'static str {
        match self.frontend_connected {
            FE_CODE_NO_FE => "none",
            FE_CODE_AWR1243 => "AWR1243",
            _ => "unknown",
        }
    }

    /// Summary in the persisted JSON shape.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "DeviceNumber": self.device_number,
            "FrontendConnected": self.frontend_connected,
            "FwVersion": self.fw_version_string(),
            "FwRevision": self.fw_revision,
            "FwDate": self.fw_date_string(),
        })
    }
}

impl fmt::Display for InfoParameters {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Device Number: {}", self.device_number)?;
        writeln!(
            f,
            "Frontend Code: 0x{:08X} ({})",
            self.frontend_connected,
            self.frontend_name()
        )?;
        writeln!(f, "Firmware Version: {}", self.fw_version_string())?;
        writeln!(f, "Firmware Revision: {}", self.fw_revision)?;
        write!(f, "Firmware Date: {}", self.fw_date_string())
    }
}

/// Resolutions reported by the device.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RadarResolution {
    /// [Hz]
    pub intermediate_frequency: f32,
    /// [m]
    pub range: f32,
    /// [Hz]
    pub doppler: f32,
    /// [m/s]
    pub speed: f32,
}

impl RadarResolution {
    pub const SIZE: usize = 16;

    pub fn read(reader: &mut ByteReader) -> Result<RadarResolution, Error> {
        reader.section("resolution");
        Ok(RadarResolution {
            intermediate_frequency: reader.f32()?,
            range: reader.f32()?,
            doppler: reader.f32()?,
            speed: reader.f32()?,
        })
    }
}

/// Ethernet stream type.
pub mod enet_type {
    pub const TCP: u16 = 1;
    pub const UDP: u16 = 2;
}

pub mod data_mode {
    pub const SINGLE: u16 = 0;
    pub const MULTIPLE: u16 = 1;
}

pub mod meas_mode {
    pub const CONTINUOUS: u16 = 0;
    pub const TRIGGERED_START: u16 = 1;
    pub const TRIGGERED_MEAS: u16 = 2;
}

/// Settings used to configure and start an Ethernet data stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamConfig {
    /// Destination of the stream.
    pub ip: Ipv4Addr,
    pub port: u16,
    pub own_port: u16,
    pub enet_type: u16,
    pub data_mode: u16,
    pub meas_mode: u16,
    pub delays: [u32; 4],
    /// Stream data mask.
    pub mask: u16,
    pub data_mask: u16,
    pub chirp_raw: u16,
    pub chirp_range: u16,
    pub range_bin: u16,
    pub doppler_format: u16,
}

impl Default for StreamConfig {
    fn default() -> Self {
        StreamConfig {
            ip: Ipv4Addr::UNSPECIFIED,
            port: 0,
            own_port: 0,
            enet_type: enet_type::UDP,
            data_mode: data_mode::SINGLE,
            meas_mode: meas_mode::CONTINUOUS,
            delays: [0; 4],
            mask: 0,
            data_mask: 0,
            chirp_raw: 0,
            chirp_range: 0,
            range_bin: 0,
            doppler_format: 0,
        }
    }
}

impl StreamConfig {
    /// Stream option matching the processing mode the device runs.
    pub fn start_option(&self, mode: u16) -> u16 {
        match mode {
            processing::NO_PROCESSING => self.chirp_raw,
            processing::RANGE_FFT => self.chirp_range,
            processing::DOPPLER_FFT => self.range_bin,
            processing::TRACKING => self.doppler_format,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cubes() {
        assert_eq!(CubeShape::from_index(0).unwrap().range_bins, 256);
        assert_eq!(
            CubeShape::from_index(CUBE_DEFAULT),
            Some(CubeShape {
                samples: 512,
                range_bins: 256,
                doppler_bins: 128,
            })
        );
        assert_eq!(
            CubeShape::from_index(20),
            Some(CubeShape {
                samples: 1024,
                range_bins: 512,
                doppler_bins: 64,
            })
        );
        assert_eq!(CubeShape::from_index(CUBE_COUNT), None);
        assert!(!is_mimo_cube(14));
        assert!(is_mimo_cube(15));
    }

    #[test]
    fn test_radar_params_layout() {
        let params = RadarParameters::default();
        let mut buf = Vec::new();
        params.write(&mut buf);
        assert_eq!(buf.len(), RadarParameters::SIZE);

        // cube, continuous, interval, processing
        assert_eq!(&buf[..7], &[0x00, 0x0B, 0x00, 0x00, 0x00, 0x00, 0x01]);
        // min doppler bin -64 as i16 at offset 16
        assert_eq!(&buf[16..18], &[0xFF, 0xC0]);
        // rx channels at offset 54
        assert_eq!(&buf[54..56], &[0x00, 0x0F]);

        let decoded = RadarParameters::read(&mut ByteReader::new(&buf)).unwrap();
        assert_eq!(decoded, params);
    }

    #[test]
    fn test_radar_params_truncated() {
        let mut buf = Vec::new();
        RadarParameters::default().write(&mut buf);
        buf.truncate(59);
        match RadarParameters::read(&mut ByteReader::new(&buf)) {
            Err(Error::Truncated {
                section, offset, ..
            }) => {
                assert_eq!(section, "radar parameters");
                assert_eq!(offset, 58);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_rx_channels() {
        let mut params = RadarParameters {
            rx_channels: 0xFFF,
            ..Default::default()
        };
        assert_eq!(params.max_rx_channels(), 4);
        assert_eq!(params.active_rx_channels(), 4);

        params.radar_cube = 16;
        assert_eq!(params.max_rx_channels(), 12);
        assert_eq!(params.active_rx_channels(), 12);
    }

    #[test]
    fn test_active_bins() {
        let params = RadarParameters::default();
        assert_eq!(params.active_range_bins(), 256);
        assert_eq!(params.active_doppler_bins(), 128);

        let params = RadarParameters {
            min_range_bin: 10,
            max_range_bin: 9,
            ..Default::default()
        };
        assert_eq!(params.active_range_bins(), 0);
    }

    #[test]
    fn test_frontend_layout() {
        let params = FrontendParameters::awr1243();
        let mut buf = Vec::new();
        params.write(&mut buf);
        assert_eq!(buf.len(), FrontendParameters::SIZE);
        assert_eq!(&buf[..4], &76_000_000u32.to_be_bytes());

        let decoded = FrontendParameters::read(&mut ByteReader::new(&buf)).unwrap();
        assert_eq!(decoded, params);
    }

    #[test]
    fn test_frontend_resolution() {
        let params = FrontendParameters::awr1243();
        assert!((params.chirp_time() - 70e-6).abs() < 1e-12);
        // 1 GHz bandwidth
        assert!((params.range_resolution() - 0.149896229).abs() < 1e-6);
        assert!((params.if_resolution() - 1.0 / 70e-6).abs() < 1e-3);
        assert!((params.doppler_resolution(128) - 1.0 / (70e-6 * 128.0)).abs() < 1e-6);

        let f0 = 76.5e9;
        let expected = C0 / (2.0 * f0 * 70e-6 * 128.0);
        assert!((params.speed_resolution(128) - expected).abs() < 1e-9);

        let empty = FrontendParameters {
            max_frequency: 0,
            ..Default::default()
        };
        assert_eq!(empty.range_resolution(), 1.0);
        assert_eq!(empty.doppler_resolution(128), 1.0);
        assert_eq!(empty.speed_resolution(128), 1.0);
        assert_eq!(empty.if_resolution(), 1.0);
    }

    #[test]
    fn test_frontend_summary() {
        let frontend = FrontendParameters::awr1243();
        let radar = RadarParameters::default();

        let summary = frontend.summary(&radar).to_string();
        assert!(summary.starts_with(&frontend.to_string()));
        // c / (2 * 76.5 GHz * 70 us * 128 chirps)
        assert!(summary.ends_with("\nSpeed resolution [m/s]: 0.219"));

        let unknown = RadarParameters {
            radar_cube: 99,
            ..Default::default()
        };
        assert_eq!(frontend.summary(&unknown).to_string(), frontend.to_string());
    }

    #[test]
    fn test_info_strings() {
        let info = InfoParameters {
            device_number: 42,
            frontend_connected: FE_CODE_AWR1243,
            fw_version: 0x0001_0203,
            fw_revision: 7,
            fw_date: 0x0F0C_07E7,
        };
        assert_eq!(info.fw_version_string(), "1.2.3");
        assert_eq!(info.fw_date_string(), "15.12.2023");
        assert_eq!(info.frontend_name(), "AWR1243");

        let json = info.to_json();
        assert_eq!(json["FwVersion"], "1.2.3");
        assert_eq!(json["FwDate"], "15.12.2023");
        assert_eq!(json["DeviceNumber"], 42);
    }

    #[test]
    fn test_start_option() {
        let config = StreamConfig {
            chirp_raw: 1,
            chirp_range: 2,
            range_bin: 3,
            doppler_format: 4,
            ..Default::default()
        };
        assert_eq!(config.start_option(processing::NO_PROCESSING), 1);
        assert_eq!(config.start_option(processing::RANGE_FFT), 2);
        assert_eq!(config.start_option(processing::DOPPLER_FFT), 3);
        assert_eq!(config.start_option(processing::TRACKING), 4);
        assert_eq!(config.start_option(processing::CFAR), 0);
    }
}
