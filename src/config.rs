// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::{
    params::{CubeShape, RadarParameters},
    record::{HEADER_SIZE, TIMESTAMP_SIZE},
};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Cube index outside the supported enumeration.
    InvalidCube(u16),
    /// Trim bounds select no bins on `axis`.
    EmptyBinWindow {
        axis: &'static str,
        min: i32,
        max: i32,
    },
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::InvalidCube(cube) => write!(f, "invalid radar cube: {}", cube),
            Error::EmptyBinWindow { axis, min, max } => {
                write!(f, "empty {} bin window: {}..={}", axis, min, max)
            }
        }
    }
}

/// Shape of the magnitude data a device sends: the cube it runs plus the
/// trimmed range and Doppler windows.
///
/// A configuration is immutable.  The `with_*` setters return a new one with
/// the derived bin counts and Doppler indices recomputed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RadarConfiguration {
    cube: u16,
    shape: CubeShape,
    min_range_bin: u16,
    max_range_bin: u16,
    min_doppler_bin: i16,
    max_doppler_bin: i16,
    doppler_fft_shift: bool,
    active_range_bins: usize,
    active_doppler_bins: usize,
    doppler_indices: Vec<i32>,
}

impl Default for RadarConfiguration {
    fn default() -> Self {
        let params = RadarParameters::default();
        let shape = CubeShape::from_index(params.radar_cube).unwrap_or(CubeShape {
            samples: 512,
            range_bins: 256,
            doppler_bins: 128,
        });
        RadarConfiguration {
            cube: params.radar_cube,
            shape,
            min_range_bin: params.min_range_bin,
            max_range_bin: params.max_range_bin,
            min_doppler_bin: params.min_doppler_bin,
            max_doppler_bin: params.max_doppler_bin,
            doppler_fft_shift: true,
            active_range_bins: 256,
            active_doppler_bins: 128,
            doppler_indices: (0..128).collect(),
        }
    }
}

impl RadarConfiguration {
    pub fn new(
        cube: u16,
        range_bins: (u16, u16),
        doppler_bins: (i16, i16),
        doppler_fft_shift: bool,
    ) -> Result<RadarConfiguration, Error> {
        let shape = CubeShape::from_index(cube).ok_or(Error::InvalidCube(cube))?;

        let (min_range_bin, max_range_bin) = range_bins;
        let active_range_bins = max_range_bin as i32 - min_range_bin as i32 + 1;
        if active_range_bins <= 0 {
            return Err(Error::EmptyBinWindow {
                axis: "range",
                min: min_range_bin as i32,
                max: max_range_bin as i32,
            });
        }

        let (min_doppler_bin, max_doppler_bin) = doppler_bins;
        let active_doppler_bins = max_doppler_bin as i32 - min_doppler_bin as i32 + 1;
        if active_doppler_bins <= 0 {
            return Err(Error::EmptyBinWindow {
                axis: "doppler",
                min: min_doppler_bin as i32,
                max: max_doppler_bin as i32,
            });
        }

        let doppler_indices = doppler_indices(
            shape.doppler_bins as i32,
            min_doppler_bin as i32,
            max_doppler_bin as i32,
            doppler_fft_shift,
        );

        Ok(RadarConfiguration {
            cube,
            shape,
            min_range_bin,
            max_range_bin,
            min_doppler_bin,
            max_doppler_bin,
            doppler_fft_shift,
            active_range_bins: active_range_bins as usize,
            active_doppler_bins: active_doppler_bins as usize,
            doppler_indices,
        })
    }

    pub fn from_params(params: &RadarParameters) -> Result<RadarConfiguration, Error> {
        Self::new(
            params.radar_cube,
            (params.min_range_bin, params.max_range_bin),
            (params.min_doppler_bin, params.max_doppler_bin),
            params.doppler_fft_shift != 0,
        )
    }

    /// Writes the cube, trims and shift flag back into a parameter block.
    pub fn apply_to(&self, params: &mut RadarParameters) {
        params.radar_cube = self.cube;
        params.min_range_bin = self.min_range_bin;
        params.max_range_bin = self.max_range_bin;
        params.min_doppler_bin = self.min_doppler_bin;
        params.max_doppler_bin = self.max_doppler_bin;
        params.doppler_fft_shift = self.doppler_fft_shift as u8;
    }

    pub fn with_cube(&self, cube: u16) -> Result<RadarConfiguration, Error> {
        Self::new(
            cube,
            self.range_window(),
            self.doppler_window(),
            self.doppler_fft_shift,
        )
    }

    pub fn with_range_bins(&self, min: u16, max: u16) -> Result<RadarConfiguration, Error> {
        Self::new(
            self.cube,
            (min, max),
            self.doppler_window(),
            self.doppler_fft_shift,
        )
    }

    pub fn with_doppler_bins(&self, min: i16, max: i16) -> Result<RadarConfiguration, Error> {
        Self::new(
            self.cube,
            self.range_window(),
            (min, max),
            self.doppler_fft_shift,
        )
    }

    pub fn with_doppler_fft_shift(&self, shift: bool) -> Result<RadarConfiguration, Error> {
        Self::new(self.cube, self.range_window(), self.doppler_window(), shift)
    }

    pub fn cube(&self) -> u16 {
        self.cube
    }

    pub fn shape(&self) -> CubeShape {
        self.shape
    }

    pub fn range_window(&self) -> (u16, u16) {
        (self.min_range_bin, self.max_range_bin)
    }

    pub fn doppler_window(&self) -> (i16, i16) {
        (self.min_doppler_bin, self.max_doppler_bin)
    }

    pub fn doppler_fft_shift(&self) -> bool {
        self.doppler_fft_shift
    }

    pub fn active_range_bins(&self) -> usize {
        self.active_range_bins
    }

    pub fn active_doppler_bins(&self) -> usize {
        self.active_doppler_bins
    }

    /// Number of u16 samples in a full magnitude grid.
    pub fn grid_len(&self) -> usize {
        self.active_range_bins * self.active_doppler_bins
    }

    /// Bytes of a full magnitude grid.
    pub fn magnitude_bytes(&self) -> usize {
        self.grid_len() * 2
    }

    /// Size of a record carrying only a full magnitude grid.
    pub fn frame_stride(&self) -> usize {
        HEADER_SIZE + self.magnitude_bytes() + TIMESTAMP_SIZE
    }

    /// Device-internal Doppler FFT bin of every transmitted Doppler bin, in
    /// transmission order.
    pub fn doppler_indices(&self) -> &[i32] {
        &self.doppler_indices
    }
}

impl fmt::Display for RadarConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "cube {} ({}x{}x{}) range {}..={} doppler {}..={} shift {} active {}x{}",
            self.cube,
            self.shape.samples,
            self.shape.range_bins,
            self.shape.doppler_bins,
            self.min_range_bin,
            self.max_range_bin,
            self.min_doppler_bin,
            self.max_doppler_bin,
            self.doppler_fft_shift,
            self.active_range_bins,
            self.active_doppler_bins
        )
    }
}

/// Splits the Doppler window into the negative and positive FFT intervals,
/// moves both by half the bin count when the spectrum is shifted and lists
/// the resulting indices, negative first when shifted.
fn doppler_indices(doppler_bins: i32, min: i32, max: i32, shift: bool) -> Vec<i32> {
    let (mut negative, mut positive) = if min < 0 && max >= 0 {
        (Some((doppler_bins + min, doppler_bins - 1)), Some((0, max)))
    } else if min >= 0 {
        (None, Some((min, max)))
    } else {
        (Some((doppler_bins + min, doppler_bins + max)), None)
    };

    if shift {
        let half = doppler_bins / 2;
        negative = negative.map(|(low, high)| (low - half, high - half));
        positive = positive.map(|(low, high)| (low + half, high + half));
    }

    let negative = negative.into_iter().flat_map(|(low, high)| low..=high);
    let positive = positive.into_iter().flat_map(|(low, high)| low..=high);

    if shift {
        negative.chain(positive).collect()
    } else {
        positive.chain(negative).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default() {
        let config = RadarConfiguration::from_params(&RadarParameters::default()).unwrap();
        assert_eq!(config, RadarConfiguration::default());
        assert_eq!(config.active_range_bins(), 256);
        assert_eq!(config.active_doppler_bins(), 128);
        assert_eq!(config.grid_len(), 256 * 128);
        assert_eq!(config.doppler_indices(), (0..128).collect::<Vec<_>>().as_slice());
    }

    #[test]
    fn test_frame_stride() {
        let config = RadarConfiguration::new(11, (0, 167), (-64, 63), true).unwrap();
        assert_eq!(config.frame_stride(), 168 * 128 * 2 + 24 + 8);
        assert_eq!(config.frame_stride(), 43040);
    }

    #[test]
    fn test_invalid() {
        assert_eq!(
            RadarConfiguration::new(21, (0, 10), (-1, 1), true),
            Err(Error::InvalidCube(21))
        );
        assert_eq!(
            RadarConfiguration::new(11, (10, 9), (-1, 1), true),
            Err(Error::EmptyBinWindow {
                axis: "range",
                min: 10,
                max: 9
            })
        );
        assert_eq!(
            RadarConfiguration::new(11, (0, 9), (2, 1), true),
            Err(Error::EmptyBinWindow {
                axis: "doppler",
                min: 2,
                max: 1
            })
        );
    }

    #[test]
    fn test_trim_recomputes() {
        let config = RadarConfiguration::default();
        let trimmed = config.with_doppler_bins(-4, 3).unwrap();
        assert_eq!(trimmed.active_doppler_bins(), 8);
        // shifted: negative 124..=127 -> 60..=63, positive 0..=3 -> 64..=67
        assert_eq!(trimmed.doppler_indices(), &[60, 61, 62, 63, 64, 65, 66, 67]);

        let unshifted = trimmed.with_doppler_fft_shift(false).unwrap();
        assert_eq!(unshifted.doppler_indices(), &[0, 1, 2, 3, 124, 125, 126, 127]);

        let ranged = trimmed.with_range_bins(10, 19).unwrap();
        assert_eq!(ranged.active_range_bins(), 10);
        assert_eq!(ranged.doppler_indices(), trimmed.doppler_indices());

        assert!(config.with_range_bins(5, 4).is_err());
        // Setters leave the receiver unchanged.
        assert_eq!(config.active_range_bins(), 256);
    }

    #[test]
    fn test_one_sided_windows() {
        let config = RadarConfiguration::new(8, (0, 127), (2, 5), false).unwrap();
        assert_eq!(config.doppler_indices(), &[2, 3, 4, 5]);

        let config = RadarConfiguration::new(8, (0, 127), (-5, -2), false).unwrap();
        assert_eq!(config.doppler_indices(), &[123, 124, 125, 126]);

        let config = RadarConfiguration::new(8, (0, 127), (-5, -2), true).unwrap();
        assert_eq!(config.doppler_indices(), &[59, 60, 61, 62]);
    }

    #[test]
    fn test_apply_to() {
        let config = RadarConfiguration::new(16, (4, 99), (-8, 7), false).unwrap();
        let mut params = RadarParameters::default();
        config.apply_to(&mut params);
        assert_eq!(params.radar_cube, 16);
        assert_eq!(params.max_range_bin, 99);
        assert_eq!(params.min_doppler_bin, -8);
        assert_eq!(params.doppler_fft_shift, 0);
        assert_eq!(RadarConfiguration::from_params(&params).unwrap(), config);
    }
}
