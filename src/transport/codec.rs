//! Modbus RTU frame codec.
//!
//! Wire format (register and value big-endian, CRC little-endian):
//! ```text
//! write  req/resp : │ slave │ 0x06    │ reg hi │ reg lo │ val hi │ val lo │ crc lo │ crc hi │
//! read   request  : │ slave │ 0x03    │ reg hi │ reg lo │ 0x00   │ 0x01   │ crc lo │ crc hi │
//! read   response : │ slave │ 0x03    │ 0x02   │ val hi │ val lo │ crc lo │ crc hi │
//! exception       : │ slave │ fn|0x80 │ code   │ crc lo │ crc hi │
//! ```
//!
//! The decoder accumulates incoming bytes and yields one complete response.
//! A single `Link::read` may return part of a frame or all of it.

/// Read holding registers.
pub const FN_READ_HOLDING: u8 = 0x03;
/// Write single register.
pub const FN_WRITE_SINGLE: u8 = 0x06;

const EXCEPTION_BIT: u8 = 0x80;

/// Every request we send is eight bytes.
pub const REQUEST_LEN: usize = 8;

/// Largest response we accept (the write echo).
const MAX_RESPONSE: usize = 8;

const HEADER_LEN: usize = 2;
const CRC_LEN: usize = 2;

/// Byte count of a single-register read reply.
const READ_BYTE_COUNT: u8 = 2;

// ── Angle scaling ──────────────────────────────────────────────

/// Degrees to the device's fixed-point representation (tenths, rounded).
pub fn angle_to_register(angle_deg: f32) -> u16 {
    (angle_deg * 10.0).round().clamp(0.0, f32::from(u16::MAX)) as u16
}

/// Device fixed-point tenths back to degrees.
pub fn register_to_angle(raw: u16) -> f32 {
    f32::from(raw) / 10.0
}

// ── CRC ────────────────────────────────────────────────────────

/// CRC-16/MODBUS (poly 0xA001 reflected, init 0xFFFF).
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= u16::from(byte);
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

fn seal(frame: &mut [u8; REQUEST_LEN]) {
    let crc = crc16(&frame[..REQUEST_LEN - CRC_LEN]);
    frame[REQUEST_LEN - CRC_LEN..].copy_from_slice(&crc.to_le_bytes());
}

// ── Encoding ───────────────────────────────────────────────────

/// Build a write-single-register request.
pub fn encode_write(slave: u8, register: u16, value: u16) -> [u8; REQUEST_LEN] {
    let [reg_hi, reg_lo] = register.to_be_bytes();
    let [val_hi, val_lo] = value.to_be_bytes();
    let mut frame = [slave, FN_WRITE_SINGLE, reg_hi, reg_lo, val_hi, val_lo, 0, 0];
    seal(&mut frame);
    frame
}

/// Build a read-holding-registers request for one register.
pub fn encode_read(slave: u8, register: u16) -> [u8; REQUEST_LEN] {
    let [reg_hi, reg_lo] = register.to_be_bytes();
    let mut frame = [slave, FN_READ_HOLDING, reg_hi, reg_lo, 0x00, 0x01, 0, 0];
    seal(&mut frame);
    frame
}

// ── Decoding ───────────────────────────────────────────────────

/// A validated response frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    /// Echo of a write-single-register request.
    Written { slave: u8, register: u16, value: u16 },
    /// Value of the single register that was read.
    Read { slave: u8, value: u16 },
    /// Modbus exception for `function`.
    Exception { slave: u8, function: u8, code: u8 },
}

impl Response {
    pub fn slave(&self) -> u8 {
        match *self {
            Self::Written { slave, .. } | Self::Read { slave, .. } | Self::Exception { slave, .. } => {
                slave
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// CRC did not match the frame body.
    Crc,
    /// Unknown function code or impossible byte count.
    Malformed,
}

/// Decoder state machine.
enum DecoderState {
    /// Waiting for slave id and function code.
    Header,
    /// Read reply: waiting for the byte-count field.
    ByteCount,
    /// Length known, collecting the rest of the frame.
    Body { expected: usize },
}

/// Streaming response decoder.
pub struct ResponseDecoder {
    state: DecoderState,
    buf: [u8; MAX_RESPONSE],
    len: usize,
}

impl ResponseDecoder {
    pub fn new() -> Self {
        Self {
            state: DecoderState::Header,
            buf: [0; MAX_RESPONSE],
            len: 0,
        }
    }

    /// Feed bytes into the decoder.
    ///
    /// Returns `Some` once a complete frame has been collected; any bytes
    /// after the frame in `data` are discarded since a master only ever
    /// waits on one reply. Returns `None` while more bytes are needed.
    pub fn feed(&mut self, data: &[u8]) -> Option<Result<Response, DecodeError>> {
        for &byte in data {
            self.buf[self.len] = byte;
            self.len += 1;

            match self.state {
                DecoderState::Header => {
                    if self.len < HEADER_LEN {
                        continue;
                    }
                    let function = self.buf[1];
                    self.state = if function & EXCEPTION_BIT != 0 {
                        DecoderState::Body {
                            expected: HEADER_LEN + 1 + CRC_LEN,
                        }
                    } else if function == FN_WRITE_SINGLE {
                        DecoderState::Body {
                            expected: REQUEST_LEN,
                        }
                    } else if function == FN_READ_HOLDING {
                        DecoderState::ByteCount
                    } else {
                        self.reset();
                        return Some(Err(DecodeError::Malformed));
                    };
                }

                DecoderState::ByteCount => {
                    if byte != READ_BYTE_COUNT {
                        self.reset();
                        return Some(Err(DecodeError::Malformed));
                    }
                    self.state = DecoderState::Body {
                        expected: HEADER_LEN + 1 + usize::from(byte) + CRC_LEN,
                    };
                }

                DecoderState::Body { expected } => {
                    if self.len == expected {
                        let result = Self::parse(&self.buf[..expected]);
                        self.reset();
                        return Some(result);
                    }
                }
            }
        }

        None // Frame incomplete.
    }

    /// Discard partial input (before every new request).
    pub fn reset(&mut self) {
        self.state = DecoderState::Header;
        self.len = 0;
    }

    fn parse(frame: &[u8]) -> Result<Response, DecodeError> {
        let (body, crc_bytes) = frame.split_at(frame.len() - CRC_LEN);
        let received = u16::from_le_bytes([crc_bytes[0], crc_bytes[1]]);
        if crc16(body) != received {
            return Err(DecodeError::Crc);
        }

        let slave = body[0];
        let function = body[1];
        if function & EXCEPTION_BIT != 0 {
            return Ok(Response::Exception {
                slave,
                function: function & !EXCEPTION_BIT,
                code: body[2],
            });
        }
        match function {
            FN_WRITE_SINGLE => Ok(Response::Written {
                slave,
                register: u16::from_be_bytes([body[2], body[3]]),
                value: u16::from_be_bytes([body[4], body[5]]),
            }),
            FN_READ_HOLDING => Ok(Response::Read {
                slave,
                value: u16::from_be_bytes([body[3], body[4]]),
            }),
            _ => Err(DecodeError::Malformed),
        }
    }
}

impl Default for ResponseDecoder {
    fn default() -> Self {
        Self::new()
    }
}
