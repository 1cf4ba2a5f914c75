// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Request/response envelope on top of a [`Transport`].
//!
//! A request is built up in the outbound buffer with the `tx_*` accessors and
//! sent as one write by [`Session::transmit`], optionally followed by a
//! big-endian CRC16 trailer.  The response is read in one go by
//! [`Session::receive`] which strips and checks the ack header and trailer,
//! after which the payload fields are consumed in order with the `rx_*`
//! accessors.
//!
//! ```text
//! request:  | code u16 | fields ... | crc u16 (optional) |
//! response: | echo u16 | status u16 | payload ... | crc u16 (optional) |
//! ```

use crate::{
    crc::Crc16,
    cursor::ByteReader,
    error::{Error, Fault},
    transport::{ErrorState, Transport},
};
use log::{trace, warn};
use std::io;

/// Size of the command echo plus the status word.
pub const ACK_SIZE: usize = 4;
/// Size of the CRC16 trailer.
pub const CRC_SIZE: usize = 2;
/// Echo code the device sends back for commands it does not know.
pub const UNKNOWN_CMD_ID: u16 = 0xE0F0;

/// Device status word bits.
pub mod status {
    pub const OK: u16 = 0x0000;
    /// The device rejected the request checksum.
    pub const CRC_ERROR: u16 = 0x0001;
    /// Received parameters were rejected.
    pub const WRONG_RX_DATA: u16 = 0x0002;
    pub const MEAS_TIMEOUT: u16 = 0x0004;
    pub const FE_ERROR: u16 = 0x0008;
    pub const FE_TEMP_ERROR: u16 = 0x0010;
    pub const ACUTE_GLOBAL_ERROR: u16 = 0x0100;
    pub const GLOBAL_ERROR_LOGGED: u16 = 0x0200;
    pub const FW_UPDATE_ERROR: u16 = 0x1000;
}

/// Raises the fatal faults carried by a status word, checked in the order
/// checksum, measurement timeout, firmware update.
pub fn check_status(code: u16, state: u16) -> Result<(), Error> {
    let fault = if state & status::CRC_ERROR != 0 {
        Fault::Crc
    } else if state & status::MEAS_TIMEOUT != 0 {
        Fault::MeasurementTimeout
    } else if state & status::FW_UPDATE_ERROR != 0 {
        Fault::FirmwareUpdate
    } else {
        return Ok(());
    };

    warn!("command 0x{:04X} status 0x{:04X}: {}", code, state, fault);
    Err(Error::DeviceFault { code, fault })
}

/// Envelope options for [`Session::receive`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Receive {
    /// The response starts with the command echo and status word.
    pub with_ack: bool,
    /// The response ends with a CRC trailer when CRC is enabled.
    pub with_crc: bool,
    /// Verify the trailer when CRC is enabled.
    pub check_crc: bool,
    /// Accept fewer bytes than requested.
    pub allow_short: bool,
}

impl Default for Receive {
    fn default() -> Self {
        Receive {
            with_ack: true,
            with_crc: true,
            check_crc: true,
            allow_short: false,
        }
    }
}

/// One command channel to the device.  Every exchange takes `&mut self`, so a
/// session never has more than one request in flight.
pub struct Session<T: Transport> {
    transport: T,
    use_crc: bool,
    crc: Crc16,
    tx: Vec<u8>,
    rx: Vec<u8>,
    rx_pos: usize,
    /// End of the fields readable by the `rx_*` accessors, excluding the
    /// CRC trailer.
    rx_end: usize,
    code: u16,
    state: u16,
}

impl<T: Transport> Session<T> {
    pub fn new(transport: T, use_crc: bool) -> Session<T> {
        Session {
            transport,
            use_crc,
            crc: Crc16::new(),
            tx: Vec::with_capacity(64),
            rx: Vec::new(),
            rx_pos: 0,
            rx_end: 0,
            code: 0,
            state: status::OK,
        }
    }

    /// Opens the transport, dropping any buffered exchange.
    pub async fn open(&mut self) -> Result<(), Error> {
        self.clear_buffer();
        if self.transport.open().await {
            Ok(())
        } else {
            Err(Error::TransportOpenFailed(
                self.transport.error_state().message.clone(),
            ))
        }
    }

    pub fn close(&mut self) {
        self.transport.close();
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_open()
    }

    pub fn error_state(&self) -> &ErrorState {
        self.transport.error_state()
    }

    /// Clears buffers and the sticky transport error.
    pub fn reset(&mut self) {
        self.clear_buffer();
        self.transport.reset_errors();
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn use_crc(&self) -> bool {
        self.use_crc
    }

    pub fn set_use_crc(&mut self, use_crc: bool) {
        self.use_crc = use_crc;
    }

    /// Code of the command currently being exchanged.
    pub fn code(&self) -> u16 {
        self.code
    }

    /// Status word of the most recent acknowledged response.
    pub fn status(&self) -> u16 {
        self.state
    }

    /// Raw bytes of the most recent response, ack and CRC trailer included.
    pub fn rx_buffer(&self) -> &[u8] {
        &self.rx
    }

    pub fn tx_buffer(&self) -> &[u8] {
        &self.tx
    }

    pub fn clear_buffer(&mut self) {
        self.tx.clear();
        self.rx.clear();
        self.rx_pos = 0;
        self.rx_end = 0;
    }

    /// Starts a new request with the command code.
    pub fn begin(&mut self, code: u16) {
        self.clear_buffer();
        self.code = code;
        self.state = status::OK;
        self.tx_u16(code);
    }

    pub fn tx_u8(&mut self, value: u8) {
        self.tx.push(value);
    }

    pub fn tx_u16(&mut self, value: u16) {
        self.tx.extend_from_slice(&value.to_be_bytes());
    }

    pub fn tx_i16(&mut self, value: i16) {
        self.tx.extend_from_slice(&value.to_be_bytes());
    }

    pub fn tx_u32(&mut self, value: u32) {
        self.tx.extend_from_slice(&value.to_be_bytes());
    }

    pub fn tx_u64(&mut self, value: u64) {
        self.tx.extend_from_slice(&value.to_be_bytes());
    }

    pub fn tx_f32(&mut self, value: f32) {
        self.tx.extend_from_slice(&value.to_be_bytes());
    }

    pub fn tx_bytes(&mut self, bytes: &[u8]) {
        self.tx.extend_from_slice(bytes);
    }

    /// Decodes the next response fields with `read`, advancing the cursor
    /// only if it succeeds.
    pub fn rx_with<V>(
        &mut self,
        read: impl FnOnce(&mut ByteReader<'_>) -> Result<V, Error>,
    ) -> Result<V, Error> {
        let mut reader = ByteReader::at(&self.rx[..self.rx_end], self.rx_pos);
        reader.section("response");
        let value = read(&mut reader)?;
        self.rx_pos = reader.offset();
        Ok(value)
    }

    pub fn rx_u8(&mut self) -> Result<u8, Error> {
        self.rx_with(|r| r.u8())
    }

    pub fn rx_u16(&mut self) -> Result<u16, Error> {
        self.rx_with(|r| r.u16())
    }

    pub fn rx_i16(&mut self) -> Result<i16, Error> {
        self.rx_with(|r| r.i16())
    }

    pub fn rx_u32(&mut self) -> Result<u32, Error> {
        self.rx_with(|r| r.u32())
    }

    pub fn rx_u64(&mut self) -> Result<u64, Error> {
        self.rx_with(|r| r.u64())
    }

    pub fn rx_f32(&mut self) -> Result<f32, Error> {
        self.rx_with(|r| r.f32())
    }

    /// Sends the outbound buffer as a single write, sealing it with the CRC
    /// trailer first when CRC is enabled.
    pub async fn transmit(&mut self) -> Result<(), Error> {
        if self.use_crc {
            self.crc.reset();
            self.crc.process(&self.tx);
            let trailer = self.crc.value_as_bytes();
            self.tx.extend_from_slice(&trailer);
        }

        trace!("tx: {:02X?}", self.tx);
        let n = self.transport.write(&self.tx).await?;
        if n != self.tx.len() {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("wrote {} of {} bytes", n, self.tx.len()),
            )));
        }
        Ok(())
    }

    /// Reads one response expecting `rx_len` payload bytes and returns the
    /// number of payload bytes actually available to the `rx_*` accessors.
    pub async fn receive(&mut self, rx_len: usize, opts: Receive) -> Result<usize, Error> {
        let with_crc = self.use_crc && opts.with_crc;
        let mut overhead = 0;
        if opts.with_ack {
            overhead += ACK_SIZE;
        }
        if with_crc {
            overhead += CRC_SIZE;
        }
        let expected = rx_len + overhead;

        self.rx = match self.transport.read(expected).await {
            Ok(data) => data,
            Err(Error::Io(err)) if err.kind() == io::ErrorKind::TimedOut => {
                warn!("command 0x{:04X}: {}", self.code, err);
                return Err(Error::DeviceFault {
                    code: self.code,
                    fault: Fault::MeasurementTimeout,
                });
            }
            Err(err) => return Err(err),
        };
        self.rx_pos = 0;
        trace!("rx: {:02X?}", self.rx);

        let received = self.rx.len();
        self.rx_end = match with_crc {
            true => received.saturating_sub(CRC_SIZE),
            false => received,
        };
        if !opts.allow_short && received < expected {
            // A bare acknowledgment usually carries the reason in its status.
            if opts.with_ack && received == overhead {
                self.rx_u16()?;
                self.state = self.rx_u16()?;
                check_status(self.code, self.state)?;
            }
            return Err(Error::ShortRead { expected, received });
        }
        if received < overhead {
            return Err(Error::ShortRead { expected, received });
        }

        if self.use_crc {
            if opts.with_ack {
                self.crc.reset();
            }
            if opts.check_crc {
                self.crc.process(&self.rx);
                let residue = self.crc.value();
                if residue != 0 {
                    return Err(Error::ChecksumMismatch(residue));
                }
            }
        }

        let mut payload = received;
        if opts.with_ack {
            let echo = self.rx_u16()?;
            self.state = self.rx_u16()?;
            payload -= ACK_SIZE;

            if echo != self.code {
                if echo == UNKNOWN_CMD_ID {
                    return Err(Error::UnknownCommand(format!("0x{:04X}", self.code)));
                }
                return Err(Error::AckMismatch {
                    sent: self.code,
                    received: echo,
                });
            }
        }
        if with_crc {
            payload = payload.saturating_sub(CRC_SIZE);
        }

        Ok(payload)
    }

    /// [`Session::transmit`] followed by a [`Session::receive`] with ack and
    /// CRC handling enabled.
    pub async fn transceive(&mut self, rx_len: usize, allow_short: bool) -> Result<usize, Error> {
        self.transmit().await?;
        self.receive(
            rx_len,
            Receive {
                allow_short,
                ..Default::default()
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{crc::checksum, transport::mock::MockTransport};

    fn seal(mut frame: Vec<u8>) -> Vec<u8> {
        let crc = checksum(&frame);
        frame.extend_from_slice(&crc.to_be_bytes());
        frame
    }

    #[tokio::test]
    async fn test_transmit_plain() {
        let mut session = Session::new(MockTransport::new(), false);
        session.begin(0x0028);
        session.tx_u8(0x01);
        session.tx_i16(-2);
        session.tx_u32(0x01020304);
        session.tx_u64(5);
        session.tx_f32(1.0);
        session.transmit().await.unwrap();

        assert_eq!(
            session.transport().written[0],
            vec![
                0x00, 0x28, 0x01, 0xFF, 0xFE, 0x01, 0x02, 0x03, 0x04, 0x00, 0x00, 0x00, 0x00,
                0x00, 0x00, 0x00, 0x05, 0x3F, 0x80, 0x00, 0x00
            ]
        );
    }

    #[tokio::test]
    async fn test_transmit_crc() {
        let mut session = Session::new(MockTransport::new(), true);
        session.begin(0x0001);
        session.transmit().await.unwrap();

        let written = &session.transport().written[0];
        assert_eq!(written.len(), 4);
        assert_eq!(&written[..2], &[0x00, 0x01]);
        assert_eq!(checksum(written), 0);
    }

    #[tokio::test]
    async fn test_receive_payload() {
        let mut transport = MockTransport::new();
        transport.respond(seal(vec![0x00, 0x03, 0x00, 0x00, 0, 0, 0, 0, 0, 0, 0x12, 0x34]));

        let mut session = Session::new(transport, true);
        session.begin(0x0003);
        let n = session.transceive(8, false).await.unwrap();
        assert_eq!(n, 8);
        assert_eq!(session.status(), status::OK);
        assert_eq!(session.rx_u64().unwrap(), 0x1234);

        // The trailer is not part of the payload.
        match session.rx_u16() {
            Err(Error::Truncated {
                section,
                offset,
                needed,
                available,
            }) => {
                assert_eq!(section, "response");
                assert_eq!(offset, 12);
                assert_eq!(needed, 2);
                assert_eq!(available, 0);
            }
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!(session.rx_buffer().len(), 14);
    }

    #[tokio::test]
    async fn test_receive_checksum_mismatch() {
        let mut transport = MockTransport::new();
        let mut frame = seal(vec![0x00, 0x03, 0x00, 0x00, 0, 0, 0, 0, 0, 0, 0, 1]);
        frame[6] ^= 0x10;
        transport.respond(frame);

        let mut session = Session::new(transport, true);
        session.begin(0x0003);
        assert!(matches!(
            session.transceive(8, false).await,
            Err(Error::ChecksumMismatch(residue)) if residue != 0
        ));
    }

    #[tokio::test]
    async fn test_receive_ack_mismatch() {
        let mut transport = MockTransport::new();
        transport.respond(vec![0x00, 0x0A, 0x00, 0x00]);

        let mut session = Session::new(transport, false);
        session.begin(0x0003);
        match session.transceive(0, false).await {
            Err(Error::AckMismatch { sent, received }) => {
                assert_eq!(sent, 0x0003);
                assert_eq!(received, 0x000A);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_receive_unknown_command() {
        let mut transport = MockTransport::new();
        transport.respond(vec![0xE0, 0xF0, 0x00, 0x00]);

        let mut session = Session::new(transport, false);
        session.begin(0x0BAD);
        match session.transceive(0, false).await {
            Err(Error::UnknownCommand(cmd)) => assert_eq!(cmd, "0x0BAD"),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_receive_short() {
        let mut transport = MockTransport::new();
        transport.respond(vec![0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00]);

        let mut session = Session::new(transport, false);
        session.begin(0x0001);
        match session.transceive(20, false).await {
            Err(Error::ShortRead { expected, received }) => {
                assert_eq!(expected, 24);
                assert_eq!(received, 7);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_receive_short_allowed() {
        let mut transport = MockTransport::new();
        transport.respond(seal(vec![0x00, 0x03, 0x00, 0x00, 0x00, 0x00]));

        let mut session = Session::new(transport, true);
        session.begin(0x0003);
        let n = session.transceive(1002, true).await.unwrap();
        assert_eq!(n, 2);
        assert_eq!(session.rx_u16().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_receive_short_allowed_without_ack() {
        let mut transport = MockTransport::new();
        transport.respond(vec![]);
        transport.respond(seal(vec![0x00, 0x03]));

        let mut session = Session::new(transport, true);
        session.begin(0x0003);
        match session.transceive(1002, true).await {
            Err(Error::ShortRead { expected, received }) => {
                assert_eq!(expected, 1008);
                assert_eq!(received, 0);
            }
            other => panic!("unexpected result {:?}", other),
        }

        session.begin(0x0003);
        assert!(matches!(
            session.transceive(1002, true).await,
            Err(Error::ShortRead {
                expected: 1008,
                received: 4
            })
        ));
    }

    #[tokio::test]
    async fn test_bare_ack_reports_status() {
        let mut transport = MockTransport::new();
        transport.respond(seal(vec![0x00, 0x0A, 0x00, 0x04]));

        let mut session = Session::new(transport, true);
        session.begin(0x000A);
        match session.transceive(60, false).await {
            Err(Error::DeviceFault { code, fault }) => {
                assert_eq!(code, 0x000A);
                assert_eq!(fault, Fault::MeasurementTimeout);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_read_timeout_is_measurement_timeout() {
        let mut session = Session::new(MockTransport::new(), false);
        session.begin(0x0001);
        match session.transceive(20, false).await {
            Err(Error::DeviceFault { code, fault }) => {
                assert_eq!(code, 0x0001);
                assert_eq!(fault, Fault::MeasurementTimeout);
            }
            other => panic!("unexpected result {:?}", other),
        }
        assert!(session.error_state().is_set());

        session.reset();
        assert!(!session.error_state().is_set());
    }

    #[test]
    fn test_check_status_order() {
        assert!(check_status(1, status::OK).is_ok());
        assert!(check_status(1, status::WRONG_RX_DATA | status::FE_ERROR).is_ok());

        let fault = |state| match check_status(0x800B, state) {
            Err(Error::DeviceFault { code, fault }) => {
                assert_eq!(code, 0x800B);
                fault
            }
            other => panic!("unexpected result {:?}", other),
        };
        assert_eq!(fault(status::FW_UPDATE_ERROR), Fault::FirmwareUpdate);
        assert_eq!(
            fault(status::FW_UPDATE_ERROR | status::MEAS_TIMEOUT),
            Fault::MeasurementTimeout
        );
        assert_eq!(
            fault(status::FW_UPDATE_ERROR | status::MEAS_TIMEOUT | status::CRC_ERROR),
            Fault::Crc
        );
    }
}
