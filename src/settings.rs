// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Persisted radar settings.
//!
//! Settings are stored as JSON with one object per parameter block, keys
//! named after the block fields:
//!
//! ```json
//! {
//!     "RadarProcessing": { "RadarCube": 11, ... },
//!     "Frontend": { "MinFrequency": 76000000, ... }
//! }
//! ```

use crate::{
    config::{self, RadarConfiguration},
    params::{FrontendParameters, InfoParameters, RadarParameters},
};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    fs::File,
    io::{self, BufReader, Write},
    path::Path,
};

pub const SETTINGS_FILE_NAME: &str = "radar_configuration.json";

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    Json(serde_json::Error),
    Config(config::Error),
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Error {
        Error::Json(err)
    }
}

impl From<config::Error> for Error {
    fn from(err: config::Error) -> Error {
        Error::Config(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "io error: {}", err),
            Error::Json(err) => write!(f, "json error: {}", err),
            Error::Config(err) => write!(f, "configuration error: {}", err),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RadarSettings {
    #[serde(rename = "RadarProcessing")]
    pub radar_processing: RadarParameters,
    #[serde(rename = "Frontend")]
    pub frontend: FrontendParameters,
}

impl RadarSettings {
    pub fn new(radar_processing: RadarParameters, frontend: FrontendParameters) -> RadarSettings {
        RadarSettings {
            radar_processing,
            frontend,
        }
    }

    pub fn load(path: &Path) -> Result<RadarSettings, Error> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), Error> {
        let mut file = File::create(path)?;
        file.write_all(self.to_json_string()?.as_bytes())?;
        Ok(())
    }

    pub fn from_json_str(json: &str) -> Result<RadarSettings, Error> {
        Ok(serde_json::from_str(json)?)
    }

    /// Pretty JSON with 4-space indentation.
    pub fn to_json_string(&self) -> Result<String, Error> {
        to_pretty_string(self)
    }

    /// Shape of the magnitude data the radar block produces.
    pub fn configuration(&self) -> Result<RadarConfiguration, Error> {
        Ok(RadarConfiguration::from_params(&self.radar_processing)?)
    }

    /// Active (range, doppler) bin counts.
    pub fn active_bins(&self) -> Result<(usize, usize), Error> {
        let config = self.configuration()?;
        Ok((config.active_range_bins(), config.active_doppler_bins()))
    }
}

/// Writes the device summary next to the settings.
pub fn save_info(path: &Path, info: &InfoParameters) -> Result<(), Error> {
    let mut file = File::create(path)?;
    file.write_all(to_pretty_string(&info.to_json())?.as_bytes())?;
    Ok(())
}

fn to_pretty_string<T: Serialize>(value: &T) -> Result<String, Error> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut serializer)?;
    // serde_json only emits valid UTF-8.
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let mut settings = RadarSettings::new(RadarParameters::default(), FrontendParameters::awr1243());
        settings.radar_processing.min_doppler_bin = -16;
        settings.radar_processing.max_doppler_bin = 15;

        let json = settings.to_json_string().unwrap();
        assert!(json.starts_with("{\n    \"RadarProcessing\": {\n        \"RadarCube\": 11,"));
        assert!(json.contains("\"Frontend\": {"));
        assert!(json.contains("\"MinDopplerBin\": -16"));

        let loaded = RadarSettings::from_json_str(&json).unwrap();
        assert_eq!(loaded, settings);
        assert_eq!(loaded.to_json_string().unwrap(), json);
        assert_eq!(loaded.active_bins().unwrap(), (256, 32));
    }

    #[test]
    fn test_missing_key() {
        let settings = RadarSettings::default();
        let mut value = serde_json::to_value(&settings).unwrap();
        value["Frontend"]
            .as_object_mut()
            .unwrap()
            .remove("RampTime");

        let json = value.to_string();
        assert!(matches!(
            RadarSettings::from_json_str(&json),
            Err(Error::Json(_))
        ));
    }

    #[test]
    fn test_invalid_configuration() {
        let mut settings = RadarSettings::default();
        settings.radar_processing.radar_cube = 40;
        assert!(matches!(
            settings.configuration(),
            Err(Error::Config(config::Error::InvalidCube(40)))
        ));
    }

    #[test]
    fn test_save_load() {
        let dir = std::env::temp_dir().join(format!("radarwire-settings-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(SETTINGS_FILE_NAME);

        let settings = RadarSettings::default();
        settings.save(&path).unwrap();
        assert_eq!(RadarSettings::load(&path).unwrap(), settings);

        let info = InfoParameters {
            device_number: 17,
            frontend_connected: 0,
            fw_version: 0x0001_0203,
            fw_revision: 4,
            fw_date: 0x1503_07E9,
        };
        let info_path = dir.join("radar_info.json");
        save_info(&info_path, &info).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&info_path).unwrap()).unwrap();
        assert_eq!(value["DeviceNumber"], 17);
        assert_eq!(value["FwVersion"], "1.2.3");

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
