use crc::{Crc, CRC_16_ARC};
use std::fmt;
use thiserror::Error;

/// Thermostat bus address. The thermostat is the authoritative controller;
/// everything we write is subject to its acceptance.
pub const DEV_TSTAT: u16 = 0x2001;

/// The bus identity this engine assumes (a System Access Module).
pub const DEV_SAM: u16 = 0x9201;

/// The bus checksum is CRC-16 with polynomial 0x8005, reflected input and
/// output, zero initial value and zero final xor, i.e. CRC-16/ARC.
pub(crate) const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_ARC);

/// Minimum encoded frame size: 4 address bytes, length, two reserved bytes,
/// opcode, and the trailing CRC.
pub const FRAME_OVERHEAD: usize = 10;

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("frame payload too large: {0} bytes")]
    PayloadTooLarge(usize),
}

/// Bus operation codes. Only the first four are used actively; the rest are
/// decoded for diagnostics when other devices talk among themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Ack02,
    /// The "response" op: every successful read and every
    /// thermostat-originated write yields one of these.
    Ack06,
    ReadTableBlock,
    WriteTableBlock,
    ChangeTableName,
    Nack,
    AlarmPacket,
    ReadObjectData,
    ReadVariable,
    ForceVariable,
    AutoVariable,
    ReadList,
    Unknown(u8),
}

impl From<u8> for Op {
    fn from(raw: u8) -> Self {
        match raw {
            0x02 => Op::Ack02,
            0x06 => Op::Ack06,
            0x0b => Op::ReadTableBlock,
            0x0c => Op::WriteTableBlock,
            0x10 => Op::ChangeTableName,
            0x15 => Op::Nack,
            0x1e => Op::AlarmPacket,
            0x22 => Op::ReadObjectData,
            0x62 => Op::ReadVariable,
            0x63 => Op::ForceVariable,
            0x64 => Op::AutoVariable,
            0x75 => Op::ReadList,
            other => Op::Unknown(other),
        }
    }
}

impl Op {
    pub fn raw(&self) -> u8 {
        match self {
            Op::Ack02 => 0x02,
            Op::Ack06 => 0x06,
            Op::ReadTableBlock => 0x0b,
            Op::WriteTableBlock => 0x0c,
            Op::ChangeTableName => 0x10,
            Op::Nack => 0x15,
            Op::AlarmPacket => 0x1e,
            Op::ReadObjectData => 0x22,
            Op::ReadVariable => 0x62,
            Op::ForceVariable => 0x63,
            Op::AutoVariable => 0x64,
            Op::ReadList => 0x75,
            Op::Unknown(raw) => *raw,
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Ack02 => write!(f, "ACK02"),
            Op::Ack06 => write!(f, "ACK06"),
            Op::ReadTableBlock => write!(f, "READ"),
            Op::WriteTableBlock => write!(f, "WRITE"),
            Op::ChangeTableName => write!(f, "CHGTBN"),
            Op::Nack => write!(f, "NACK"),
            Op::AlarmPacket => write!(f, "ALARM"),
            Op::ReadObjectData => write!(f, "OBJRD"),
            Op::ReadVariable => write!(f, "RDVAR"),
            Op::ForceVariable => write!(f, "FORCE"),
            Op::AutoVariable => write!(f, "AUTO"),
            Op::ReadList => write!(f, "LIST"),
            Op::Unknown(raw) => write!(f, "UNKNOWN({raw:x})"),
        }
    }
}

/// A single bus frame. Immutable once constructed; the wire form is
/// `dst(BE16) src(BE16) len(u8) 00 00 op(u8) data crc(LE16)`.
///
/// Bytes 5 and 6 are of unknown purpose. They are always written as zero and
/// ignored on receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub dst: u16,
    pub src: u16,
    pub op: Op,
    pub data: Vec<u8>,
}

/// The canned acknowledgement the thermostat expects for writes it directs
/// at us.
pub(crate) fn write_ack() -> Frame {
    Frame {
        src: DEV_SAM,
        dst: DEV_TSTAT,
        op: Op::Ack06,
        data: vec![0x00],
    }
}

impl Frame {
    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        if self.data.len() > 255 {
            return Err(FrameError::PayloadTooLarge(self.data.len()));
        }

        let mut buf = Vec::with_capacity(FRAME_OVERHEAD + self.data.len());
        buf.extend_from_slice(&self.dst.to_be_bytes());
        buf.extend_from_slice(&self.src.to_be_bytes());
        buf.push(self.data.len() as u8);
        buf.push(0);
        buf.push(0);
        buf.push(self.op.raw());
        buf.extend_from_slice(&self.data);
        let cksum = CRC16.checksum(&buf);
        buf.extend_from_slice(&cksum.to_le_bytes());

        Ok(buf)
    }

    /// Attempt to decode one frame from a window of exactly
    /// `10 + window[4]` bytes. Fails on an all-zero window (the bus idles
    /// at zero) or on checksum mismatch; the caller is expected to shift
    /// the window one byte and retry.
    pub fn decode(window: &[u8]) -> Option<Frame> {
        if window.len() < FRAME_OVERHEAD {
            return None;
        }
        if window.iter().all(|&b| b == 0) {
            return None;
        }

        let body = window.len() - 2;
        let cksum = CRC16.checksum(&window[..body]);
        if cksum.to_le_bytes() != window[body..] {
            return None;
        }

        Some(Frame {
            dst: u16::from_be_bytes([window[0], window[1]]),
            src: u16::from_be_bytes([window[2], window[3]]),
            op: Op::from(window[7]),
            data: window[8..body].to_vec(),
        })
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:x} -> {:x}: {:8} {}",
            self.src,
            self.dst,
            self.op.to_string(),
            self.data
                .iter()
                .map(|b| format!("{b:02x}"))
                .collect::<String>()
        )
    }
}
