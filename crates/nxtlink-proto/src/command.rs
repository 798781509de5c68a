use std::fmt;

use bytes::Bytes;

use crate::error::{ProtoError, Result};
use crate::{opcode, CLASS_NO_REPLY, CLASS_REPLY};

/// Ultrasonic sensors are LOWSPEED_9V inputs.
const SENSOR_TYPE_LOWSPEED_9V: u8 = 0x0B;
const SENSOR_MODE_RAW: u8 = 0x00;

/// I²C address of the ultrasonic sensor.
const ULTRASONIC_ADDRESS: u8 = 0x02;
const ULTRASONIC_REG_COMMAND: u8 = 0x41;
const ULTRASONIC_REG_DISTANCE: u8 = 0x42;
const ULTRASONIC_CONTINUOUS: u8 = 0x02;

const MODE_MOTORON: u8 = 0x01;
const REGULATION_SPEED: u8 = 0x01;
const RUN_STATE_RUNNING: u8 = 0x20;
const RUN_STATE_IDLE: u8 = 0x00;

/// Output port value addressing every motor at once.
const ALL_OUTPUTS: u8 = 0xFF;

/// A motor output, `0..=2` (A, B, C).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Motor(u8);

impl Motor {
    pub const A: Motor = Motor(0);
    pub const B: Motor = Motor(1);
    pub const C: Motor = Motor(2);

    pub fn index(self) -> u8 {
        self.0
    }
}

impl TryFrom<i32> for Motor {
    type Error = ProtoError;

    fn try_from(value: i32) -> Result<Self> {
        match u8::try_from(value) {
            Ok(v @ 0..=2) => Ok(Motor(v)),
            _ => Err(ProtoError::MotorOutOfRange(value)),
        }
    }
}

/// Motor power in percent, `-100..=100`; negative runs backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Power(i8);

impl Power {
    pub const STOP: Power = Power(0);
    pub const FULL_FORWARD: Power = Power(100);
    pub const FULL_REVERSE: Power = Power(-100);

    pub fn percent(self) -> i8 {
        self.0
    }
}

impl TryFrom<i32> for Power {
    type Error = ProtoError;

    fn try_from(value: i32) -> Result<Self> {
        match i8::try_from(value) {
            Ok(v @ -100..=100) => Ok(Power(v)),
            _ => Err(ProtoError::PowerOutOfRange(value)),
        }
    }
}

/// A sensor input port, `0..=3` (ports 1-4 on the brick).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SensorPort(u8);

impl SensorPort {
    pub fn index(self) -> u8 {
        self.0
    }
}

impl TryFrom<i32> for SensorPort {
    type Error = ProtoError;

    fn try_from(value: i32) -> Result<Self> {
        match u8::try_from(value) {
            Ok(v @ 0..=3) => Ok(SensorPort(v)),
            _ => Err(ProtoError::PortOutOfRange(value)),
        }
    }
}

impl fmt::Display for SensorPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The command set understood by the brick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Probe a freshly opened link.
    Connect,
    SetMotor { motor: Motor, power: Power },
    /// Switch a port to low-speed 9V and put the sensor in continuous mode.
    ConfigureUltrasonicSensor { port: SensorPort },
    /// Request one distance byte and fetch it.
    ReadUltrasonicSensor { port: SensorPort },
    /// Stop every motor before the link goes away.
    Shutdown,
}

impl Command {
    /// Short name for logs and error context.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Connect => "connect",
            Command::SetMotor { .. } => "set_motor",
            Command::ConfigureUltrasonicSensor { .. } => "configure_ultrasonic_sensor",
            Command::ReadUltrasonicSensor { .. } => "read_ultrasonic_sensor",
            Command::Shutdown => "shutdown",
        }
    }

    /// Telegrams to send, in order. Each is written as exactly one frame.
    pub fn telegrams(&self) -> Vec<Telegram> {
        match *self {
            Command::Connect => vec![Telegram::new([CLASS_NO_REPLY, opcode::KEEP_ALIVE])],
            Command::SetMotor { motor, power } => vec![set_output_state(
                motor.0,
                power.0,
                MODE_MOTORON,
                REGULATION_SPEED,
                RUN_STATE_RUNNING,
            )],
            Command::ConfigureUltrasonicSensor { port } => vec![
                Telegram::new([
                    CLASS_NO_REPLY,
                    opcode::SET_INPUT_MODE,
                    port.0,
                    SENSOR_TYPE_LOWSPEED_9V,
                    SENSOR_MODE_RAW,
                ]),
                Telegram::new([
                    CLASS_NO_REPLY,
                    opcode::LS_WRITE,
                    port.0,
                    0x03,
                    0x00,
                    ULTRASONIC_ADDRESS,
                    ULTRASONIC_REG_COMMAND,
                    ULTRASONIC_CONTINUOUS,
                ]),
            ],
            Command::ReadUltrasonicSensor { port } => vec![
                Telegram::new([
                    CLASS_NO_REPLY,
                    opcode::LS_WRITE,
                    port.0,
                    0x02,
                    0x01,
                    ULTRASONIC_ADDRESS,
                    ULTRASONIC_REG_DISTANCE,
                    0x00,
                ]),
                Telegram::new([CLASS_REPLY, opcode::LS_READ, port.0]),
            ],
            Command::Shutdown => vec![set_output_state(ALL_OUTPUTS, 0, 0x00, 0x00, RUN_STATE_IDLE)],
        }
    }
}

fn set_output_state(port: u8, power: i8, mode: u8, regulation: u8, run_state: u8) -> Telegram {
    let [power] = power.to_le_bytes();
    Telegram::new([
        CLASS_NO_REPLY,
        opcode::SET_OUTPUT_STATE,
        port,
        power,
        mode,
        regulation,
        0x00, // turn ratio
        run_state,
        0x00, // tacho limit, 4 bytes LE
        0x00,
        0x00,
        0x00,
        0x00,
    ])
}

/// One encoded direct command: the payload of a single frame.
#[derive(Clone, PartialEq, Eq)]
pub struct Telegram(Bytes);

impl Telegram {
    fn new<const N: usize>(bytes: [u8; N]) -> Self {
        Self(Bytes::copy_from_slice(&bytes))
    }

    /// Wrap bytes received from the wire.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    /// True when the brick answers this telegram with a reply telegram.
    pub fn expects_reply(&self) -> bool {
        self.0.first() == Some(&CLASS_REPLY)
    }

    pub fn opcode(&self) -> Option<u8> {
        self.0.get(1).copied()
    }

    /// Decode the telegram's fixed-position fields.
    pub fn parse(&self) -> Result<Request> {
        Request::parse(&self.0)
    }
}

impl fmt::Debug for Telegram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Telegram(")?;
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{b:02X}")?;
        }
        write!(f, ")")
    }
}

/// A request telegram decoded field by field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    KeepAlive,
    SetOutputState {
        port: u8,
        power: i8,
        mode: u8,
        run_state: u8,
    },
    SetInputMode {
        port: u8,
        sensor_type: u8,
        sensor_mode: u8,
    },
    LsWrite {
        port: u8,
        rx_len: u8,
        data: Vec<u8>,
    },
    LsRead {
        port: u8,
    },
}

impl Request {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let (class, op) = match bytes {
            [class, op, ..] => (*class, *op),
            _ => {
                return Err(ProtoError::TooShort {
                    opcode: bytes.get(1).copied().unwrap_or(0),
                    len: bytes.len(),
                    need: 2,
                })
            }
        };
        if class != CLASS_REPLY && class != CLASS_NO_REPLY {
            return Err(ProtoError::UnknownCommand { class, opcode: op });
        }
        let need = |n: usize| {
            if bytes.len() < n {
                Err(ProtoError::TooShort {
                    opcode: op,
                    len: bytes.len(),
                    need: n,
                })
            } else {
                Ok(())
            }
        };

        match op {
            opcode::KEEP_ALIVE => Ok(Request::KeepAlive),
            opcode::SET_OUTPUT_STATE => {
                need(8)?;
                Ok(Request::SetOutputState {
                    port: bytes[2],
                    power: i8::from_le_bytes([bytes[3]]),
                    mode: bytes[4],
                    run_state: bytes[7],
                })
            }
            opcode::SET_INPUT_MODE => {
                need(5)?;
                Ok(Request::SetInputMode {
                    port: bytes[2],
                    sensor_type: bytes[3],
                    sensor_mode: bytes[4],
                })
            }
            opcode::LS_WRITE => {
                need(5)?;
                let tx_len = usize::from(bytes[3]);
                need(5 + tx_len)?;
                Ok(Request::LsWrite {
                    port: bytes[2],
                    rx_len: bytes[4],
                    data: bytes[5..5 + tx_len].to_vec(),
                })
            }
            opcode::LS_READ => {
                need(3)?;
                Ok(Request::LsRead { port: bytes[2] })
            }
            _ => Err(ProtoError::UnknownCommand { class, opcode: op }),
        }
    }
}
