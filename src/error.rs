// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use std::{fmt, io};

/// Fault bits reported in the device status word that abort a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The device rejected the request checksum.
    Crc,
    /// The measurement took too long or was not performed by the radar core.
    MeasurementTimeout,
    /// Error while uploading a firmware update.
    FirmwareUpdate,
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Fault::Crc => write!(f, "CRC error"),
            Fault::MeasurementTimeout => write!(f, "measurement timeout"),
            Fault::FirmwareUpdate => write!(f, "firmware update error"),
        }
    }
}

/// Protocol error types shared by the live command path and the record
/// decoder.
#[derive(Debug)]
pub enum Error {
    /// Fewer bytes than a record header remain at `offset`.
    TruncatedHeader { offset: usize, available: usize },
    /// A section or response field runs past the end of its buffer.
    Truncated {
        section: &'static str,
        offset: usize,
        needed: usize,
        available: usize,
    },
    /// The record sync word did not match the magic constant.
    SyncMismatch { offset: usize, found: u32 },
    /// Command not in the catalog, or the device echoed the unknown-command
    /// sentinel.
    UnknownCommand(String),
    /// The device echoed a different command code than the one sent.
    AckMismatch { sent: u16, received: u16 },
    /// Non-zero checksum residue over a received buffer.
    ChecksumMismatch(u16),
    /// Fewer bytes were received than the exchange requires.
    ShortRead { expected: usize, received: usize },
    /// The device status word carries a fatal fault bit.
    DeviceFault { code: u16, fault: Fault },
    /// Connecting or binding the transport failed.
    TransportOpenFailed(String),
    /// I/O error from the underlying socket.
    Io(io::Error),
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::TruncatedHeader { offset, available } => write!(
                f,
                "truncated record header at offset {}: {} bytes available",
                offset, available
            ),
            Error::Truncated {
                section,
                offset,
                needed,
                available,
            } => write!(
                f,
                "truncated {} at offset {}: needed {} bytes, {} available",
                section, offset, needed, available
            ),
            Error::SyncMismatch { offset, found } => {
                write!(f, "sync word mismatch at offset {}: 0x{:08X}", offset, found)
            }
            Error::UnknownCommand(cmd) => write!(f, "unknown command: {}", cmd),
            Error::AckMismatch { sent, received } => write!(
                f,
                "command returned wrong id: sent 0x{:04X}, received 0x{:04X}",
                sent, received
            ),
            Error::ChecksumMismatch(residue) => {
                write!(f, "checksum mismatch: residue 0x{:04X}", residue)
            }
            Error::ShortRead { expected, received } => {
                write!(f, "short read: expected {} bytes, received {}", expected, received)
            }
            Error::DeviceFault { code, fault } => {
                write!(f, "{} in command 0x{:04X}", fault, code)
            }
            Error::TransportOpenFailed(err) => write!(f, "transport open failed: {}", err),
            Error::Io(err) => write!(f, "io error: {}", err),
        }
    }
}
